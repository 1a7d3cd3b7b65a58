//! Benchmarks for region requests
//!
//! Run with: cargo bench

use ambit::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// checkerboard -> box_blur -> invert, optionally with a parallel branch composited back in.
fn pipeline(branches: bool) -> (ProcessingGraph, NodeId) {
    let mut graph = ProcessingGraph::new();
    let board = graph.add_operation(Box::new(Checkerboard::default()));
    let blur = graph.add_operation(Box::new(BoxBlur::new(3.0)));
    let invert = graph.add_operation(Box::new(Invert));
    graph.connect(board, "output", blur, "input").unwrap();
    graph.connect(blur, "output", invert, "input").unwrap();

    if !branches {
        return (graph, invert);
    }
    let shifted = graph.add_operation(Box::new(Translate::new(7.0, 3.0)));
    let faded = graph.add_operation(Box::new(Opacity { value: 0.5 }));
    let over = graph.add_operation(Box::new(Over));
    graph.connect(board, "output", shifted, "input").unwrap();
    graph.connect(shifted, "output", faded, "input").unwrap();
    graph.connect(invert, "output", over, "input").unwrap();
    graph.connect(faded, "output", over, "aux").unwrap();
    (graph, over)
}

fn bench_plan(c: &mut Criterion) {
    let (graph, root) = pipeline(true);
    let engine = ExecutionEngine::new();

    c.bench_function("plan_request", |b| {
        b.iter(|| {
            engine
                .plan_request(&graph, root, "output", black_box(&Rectangle::new(0, 0, 256, 256)))
                .unwrap()
        });
    });
}

fn bench_request_region(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_region");
    let (graph, root) = pipeline(false);
    let engine = ExecutionEngine::new();

    for size in [64, 256, 512].iter() {
        let rect = Rectangle::new(0, 0, *size, *size);
        group.throughput(Throughput::Elements(rect.area()));
        group.bench_with_input(BenchmarkId::new("chain", size), &rect, |b, rect| {
            b.iter(|| engine.request_region(&graph, root, "output", black_box(rect)).unwrap());
        });
    }

    group.finish();
}

fn bench_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let (graph, root) = pipeline(true);
    let rect = Rectangle::new(0, 0, 256, 256);

    for parallel in [false, true] {
        let engine = ExecutionEngine::new().with_default_options(ExecutionOptions::new().with_parallel(parallel));
        let name = if parallel { "parallel" } else { "sequential" };
        group.bench_function(name, |b| {
            b.iter(|| engine.request_region(&graph, root, "output", black_box(&rect)).unwrap());
        });
    }

    group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
    let (mut graph, root) = pipeline(false);
    graph.set_cache(root, true).unwrap();
    let engine = ExecutionEngine::new();
    let rect = Rectangle::new(0, 0, 256, 256);
    engine.request_region(&graph, root, "output", &rect).unwrap();

    c.bench_function("cache_hit", |b| {
        b.iter(|| {
            engine
                .request_region(&graph, root, "output", black_box(&Rectangle::new(16, 16, 128, 128)))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_plan, bench_request_region, bench_parallel, bench_cache_hit);
criterion_main!(benches);
