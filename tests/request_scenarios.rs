//! End-to-end region requests through the public API.

use ambit::execution::CacheKey;
use ambit::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;

/// Records the rectangle of every `process` call.
#[derive(Clone, Default)]
struct Recorder {
    bbox: Option<Rectangle>,
    calls: Arc<Mutex<Vec<Rectangle>>>,
}

impl Recorder {
    /// A source covering `bbox` with opaque white.
    fn source(bbox: Rectangle) -> Self {
        Self {
            bbox: Some(bbox),
            ..Self::default()
        }
    }

    fn calls(&self) -> Arc<Mutex<Vec<Rectangle>>> {
        self.calls.clone()
    }
}

impl Operation for Recorder {
    fn metadata(&self) -> OperationMetadata {
        let builder = OperationMetadata::builder("recorder", "Recorder").output(PadDefinition::pixel_output("output"));
        match self.bbox {
            Some(_) => builder.category(Category::Source).build(),
            None => builder.input(PadDefinition::pixel_input("input")).build(),
        }
    }

    fn bounding_box(&self, ctx: &RegionContext) -> Rectangle {
        match self.bbox {
            Some(bbox) => bbox,
            None => ctx.source_bounding_box("input").unwrap_or_else(Rectangle::empty),
        }
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let rect = ctx.output_rect();
        self.calls.lock().push(rect);
        match ctx.input("input") {
            Some(input) => Ok(input.sub_view(&rect)),
            None => Ok(Buffer::filled(rect, ctx.output_format(), Color::WHITE)?),
        }
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle {
    Rectangle::new(x, y, w, h)
}

/// A gradient over `extent` so proxy and direct wiring can be compared pixel by pixel.
fn gradient(extent: Rectangle) -> Buffer {
    let mut data = Vec::with_capacity(extent.area() as usize * 4);
    for y in 0..extent.height {
        for x in 0..extent.width {
            data.extend_from_slice(&[x as f32 / extent.width as f32, y as f32 / extent.height as f32, 0.25, 1.0]);
        }
    }
    Buffer::from_pixels(extent, PixelFormat::RgbaF32, data).unwrap()
}

#[test]
fn point_filter_chain_processes_each_node_once() {
    let mut graph = ProcessingGraph::new();
    let a = Recorder::source(Rectangle::infinite());
    let b = Recorder::default();
    let c = Recorder::default();
    let logs = [a.calls(), b.calls(), c.calls()];

    let a = graph.add_operation(Box::new(a));
    let b = graph.add_operation(Box::new(b));
    let c = graph.add_operation(Box::new(c));
    graph.connect(a, "output", b, "input").unwrap();
    graph.connect(b, "output", c, "input").unwrap();

    let out = ExecutionEngine::new()
        .request_region(&graph, c, "output", &rect(0, 0, 10, 10))
        .unwrap();

    assert_eq!(out.extent(), rect(0, 0, 10, 10));
    for log in &logs {
        assert_eq!(*log.lock(), vec![rect(0, 0, 10, 10)]);
    }
}

#[test]
fn halo_grows_request_and_clamps_to_source() {
    let mut graph = ProcessingGraph::new();
    let source = Recorder::source(rect(0, 0, 100, 100));
    let source_calls = source.calls();
    let a = graph.add_operation(Box::new(source));
    let b = graph.add_operation(Box::new(BoxBlur::new(2.0)));
    graph.connect(a, "output", b, "input").unwrap();

    let engine = ExecutionEngine::new();
    let plan = engine.plan_request(&graph, b, "output", &rect(40, 40, 20, 20)).unwrap();
    assert_eq!(plan.input_rect(b, "input"), Some(rect(38, 38, 24, 24)));
    assert_eq!(plan.node_rect(a), Some(rect(38, 38, 24, 24)));

    engine.request_region(&graph, b, "output", &rect(40, 40, 20, 20)).unwrap();
    assert_eq!(*source_calls.lock(), vec![rect(38, 38, 24, 24)]);

    // Within 2px of the top-left corner the halo would leave the source
    let plan = engine.plan_request(&graph, b, "output", &rect(1, 1, 10, 10)).unwrap();
    assert_eq!(plan.input_rect(b, "input"), Some(rect(0, 0, 13, 13)));
    let edge = engine.request_region(&graph, b, "output", &rect(1, 1, 10, 10)).unwrap();
    assert_eq!(edge.pixel(1, 1), Some([1.0; 4]));
}

#[test]
fn proxy_pads_are_transparent() {
    let area = rect(0, 0, 16, 8);
    let request = rect(2, 1, 10, 6);

    // Direct: source -> invert -> blur
    let mut direct = ProcessingGraph::new();
    let src = direct.add_operation(Box::new(BufferSource::new(gradient(area))));
    let x = direct.add_operation(Box::new(Invert));
    let sink = direct.add_operation(Box::new(BoxBlur::new(1.0)));
    direct.connect(src, "output", x, "input").unwrap();
    direct.connect(x, "output", sink, "input").unwrap();

    // Wrapped: the invert lives inside a graph node
    let mut wrapped = ProcessingGraph::new();
    let src = wrapped.add_operation(Box::new(BufferSource::new(gradient(area))));
    let group = wrapped.add_graph("group");
    let inner = wrapped.add_operation(Box::new(Invert));
    wrapped.add_child(group, inner).unwrap();
    wrapped.expose_pad(group, inner, "input", "input").unwrap();
    wrapped.expose_pad(group, inner, "output", "output").unwrap();
    let wrapped_sink = wrapped.add_operation(Box::new(BoxBlur::new(1.0)));
    wrapped.connect(src, "output", group, "input").unwrap();
    wrapped.connect(group, "output", wrapped_sink, "input").unwrap();

    let engine = ExecutionEngine::new();
    let expected = engine.request_region(&direct, sink, "output", &request).unwrap();
    let actual = engine.request_region(&wrapped, wrapped_sink, "output", &request).unwrap();
    assert_eq!(actual.extent(), expected.extent());
    assert_eq!(
        actual.get(&request, PixelFormat::RgbaF32),
        expected.get(&request, PixelFormat::RgbaF32)
    );

    // The graph node's own output proxy can be requested too
    let through_proxy = engine.request_region(&wrapped, group, "output", &request).unwrap();
    let at_leaf = engine.request_region(&direct, x, "output", &request).unwrap();
    assert_eq!(
        through_proxy.get(&request, PixelFormat::RgbaF32),
        at_leaf.get(&request, PixelFormat::RgbaF32)
    );
}

#[test]
fn disconnect_invalidates_exactly_dependent_entries() {
    let mut graph = ProcessingGraph::new();
    let src = graph.add_operation(Box::new(Recorder::source(rect(0, 0, 32, 32))));
    let first = graph.add_node(GraphNode::new(Box::new(Nop)).with_cache(true));
    let second = graph.add_node(GraphNode::new(Box::new(Nop)).with_cache(true));
    let other_src = graph.add_operation(Box::new(Recorder::source(rect(0, 0, 32, 32))));
    let other = graph.add_node(GraphNode::new(Box::new(Nop)).with_cache(true));

    graph.connect(src, "output", first, "input").unwrap();
    graph.connect(first, "output", second, "input").unwrap();
    graph.connect(other_src, "output", other, "input").unwrap();

    let engine = ExecutionEngine::new();
    let region = rect(0, 0, 8, 8);
    engine.request_region(&graph, second, "output", &region).unwrap();
    engine.request_region(&graph, other, "output", &region).unwrap();

    let key = |node| CacheKey::new(node, "output", region);
    assert!(graph.cache().contains(&key(first)));
    assert!(graph.cache().contains(&key(second)));
    assert!(graph.cache().contains(&key(other)));

    graph.disconnect(first, "output", second, "input").unwrap();

    assert!(graph.cache().contains(&key(first)));
    assert!(!graph.cache().contains(&key(second)));
    assert!(graph.cache().contains(&key(other)));
    assert_eq!(graph.cache().stats().invalidations, 1);
}

#[test]
fn property_change_reevaluates_downstream() {
    let mut graph = ProcessingGraph::new();
    let fill = graph.add_operation(Box::new(ColorSource::new(Color::WHITE)));
    let opacity = graph.add_node(GraphNode::new(Box::new(Opacity::default())).with_cache(true));
    graph.connect(fill, "output", opacity, "input").unwrap();

    let engine = ExecutionEngine::new();
    let region = rect(0, 0, 4, 4);
    let before = engine.request_region(&graph, opacity, "output", &region).unwrap();
    assert_eq!(before.pixel(0, 0), Some([1.0; 4]));

    graph.set_property(fill, "value", Value::Color(Color::BLACK)).unwrap();
    let after = engine.request_region(&graph, opacity, "output", &region).unwrap();
    assert_eq!(after.pixel(0, 0), Some([0.0, 0.0, 0.0, 1.0]));
}

#[test]
fn scalar_output_drives_property_pad() {
    let mut data = vec![0.0; 4 * 4];
    for px in data.chunks_exact_mut(4) {
        px[3] = 1.0;
    }
    data[..4].copy_from_slice(&[1.0; 4]);
    data[4..8].copy_from_slice(&[1.0; 4]);
    let half_white = Buffer::from_pixels(rect(0, 0, 4, 1), PixelFormat::RgbaF32, data).unwrap();

    let mut graph = ProcessingGraph::new();
    let src = graph.add_operation(Box::new(BufferSource::new(half_white)));
    let mean = graph.add_operation(Box::new(Mean));
    let opacity = graph.add_operation(Box::new(Opacity::default()));
    graph.connect(src, "output", mean, "input").unwrap();
    graph.connect(src, "output", opacity, "input").unwrap();
    graph.connect(mean, "value", opacity, "value").unwrap();

    let engine = ExecutionEngine::new();
    let value = engine.request_scalar(&graph, mean, "value").unwrap();
    assert!((value.as_float().unwrap() - 0.5).abs() < 1e-6);

    // Only one pixel is requested, but the mean still sees the whole source
    let out = engine.request_region(&graph, opacity, "output", &rect(3, 0, 1, 1)).unwrap();
    let [r, _, _, a] = out.pixel(3, 0).unwrap();
    assert_eq!(r, 0.0);
    assert!((a - 0.5).abs() < 1e-6);
}

#[test]
fn translate_and_crop_move_the_request() {
    let mut graph = ProcessingGraph::new();
    let source = Recorder::source(rect(0, 0, 10, 10));
    let calls = source.calls();
    let src = graph.add_operation(Box::new(source));
    let shift = graph.add_operation(Box::new(Translate::new(5.0, 0.0)));
    let crop = graph.add_operation(Box::new(Crop::new(rect(0, 0, 8, 8))));
    graph.connect(src, "output", shift, "input").unwrap();
    graph.connect(shift, "output", crop, "input").unwrap();

    let engine = ExecutionEngine::new();
    assert_eq!(engine.bounding_box(&graph, crop, "output").unwrap(), rect(5, 0, 3, 8));

    let out = engine.request_region(&graph, crop, "output", &rect(0, 0, 8, 8)).unwrap();
    assert_eq!(*calls.lock(), vec![rect(0, 0, 3, 8)]);
    assert_eq!(out.pixel(4, 0), Some([0.0; 4]));
    assert_eq!(out.pixel(5, 0), Some([1.0; 4]));
}

#[test]
fn validation_gates_execution() {
    let registry = OperationRegistry::with_builtins();
    let mut graph = ProcessingGraph::new();
    let blur = graph.add_operation(registry.create("box_blur").unwrap());
    let group = graph.add_graph("empty");

    let report = ValidationPipeline::default().validate(&graph);
    assert!(report.can_execute());
    assert!(report.warnings.iter().any(|w| w.node_id == Some(blur)));
    assert!(report.warnings.iter().any(|w| w.node_id == Some(group)));
}

#[test]
fn crop_hides_source_pixels_outside_its_rect() {
    let white = Buffer::filled(rect(0, 0, 10, 10), PixelFormat::RgbaF32, Color::WHITE).unwrap();
    let mut graph = ProcessingGraph::new();
    let src = graph.add_operation(Box::new(BufferSource::new(white)));
    let crop = graph.add_operation(Box::new(Crop::new(rect(0, 0, 5, 5))));
    graph.connect(src, "output", crop, "input").unwrap();

    let engine = ExecutionEngine::new();
    assert_eq!(engine.bounding_box(&graph, crop, "output").unwrap(), rect(0, 0, 5, 5));

    let out = engine.request_region(&graph, crop, "output", &rect(0, 0, 10, 10)).unwrap();
    assert_eq!(out.extent(), rect(0, 0, 10, 10));
    assert_eq!(out.pixel(4, 4), Some([1.0; 4]));
    assert_eq!(out.get(&rect(8, 8, 1, 1), PixelFormat::RgbaF32), vec![0.0; 4]);
    assert_eq!(out.get(&rect(5, 0, 5, 10), PixelFormat::RgbaF32), vec![0.0; 5 * 10 * 4]);
}

#[test]
fn source_pixels_past_the_request_stay_hidden() {
    let white = Buffer::filled(rect(0, 0, 10, 10), PixelFormat::RgbaF32, Color::WHITE).unwrap();
    let mut graph = ProcessingGraph::new();
    let src = graph.add_operation(Box::new(BufferSource::new(white)));

    let out = ExecutionEngine::new()
        .request_region(&graph, src, "output", &rect(8, 8, 4, 4))
        .unwrap();
    assert_eq!(out.pixel(9, 9), Some([1.0; 4]));
    assert_eq!(out.pixel(10, 10), Some([0.0; 4]));
}

#[test]
fn writing_to_a_result_leaves_cached_pixels_alone() {
    let mut graph = ProcessingGraph::new();
    let fill = graph.add_operation(Box::new(ColorSource::new(Color::WHITE)));
    let invert = graph.add_node(GraphNode::new(Box::new(Invert)).with_cache(true));
    graph.connect(fill, "output", invert, "input").unwrap();

    let engine = ExecutionEngine::new();
    let region = rect(0, 0, 2, 2);
    let first = engine.request_region(&graph, invert, "output", &region).unwrap();
    let original = first.get(&region, PixelFormat::RgbaF32);
    first.set(&region, PixelFormat::RgbaF32, &[0.5; 16]).unwrap();

    let second = engine.request_region(&graph, invert, "output", &region).unwrap();
    assert_eq!(graph.cache().stats().hits, 1);
    assert_eq!(second.get(&region, PixelFormat::RgbaF32), original);
    assert!(!second.shares_storage(&first));
}

#[test]
fn writing_to_a_result_leaves_the_held_buffer_alone() {
    let held = Buffer::filled(rect(0, 0, 4, 4), PixelFormat::RgbaF32, Color::WHITE).unwrap();
    let mut graph = ProcessingGraph::new();
    let src = graph.add_operation(Box::new(BufferSource::new(held.clone())));

    let engine = ExecutionEngine::new();
    let out = engine.request_region(&graph, src, "output", &rect(0, 0, 4, 4)).unwrap();
    assert!(!out.shares_storage(&held));
    out.set(&rect(0, 0, 1, 1), PixelFormat::RgbaF32, &[0.0; 4]).unwrap();

    assert_eq!(held.pixel(0, 0), Some([1.0; 4]));
    let again = engine.request_region(&graph, src, "output", &rect(0, 0, 1, 1)).unwrap();
    assert_eq!(again.pixel(0, 0), Some([1.0; 4]));
}

#[test]
fn scalar_source_skipped_when_consumer_needs_nothing() {
    let half = Buffer::filled(rect(0, 0, 4, 4), PixelFormat::RgbaF32, Color::WHITE).unwrap();
    let mut graph = ProcessingGraph::new();
    let src = graph.add_operation(Box::new(BufferSource::new(half)));
    let mean = graph.add_operation(Box::new(Mean));
    let opacity = graph.add_operation(Box::new(Opacity::default()));
    graph.connect(src, "output", mean, "input").unwrap();
    graph.connect(src, "output", opacity, "input").unwrap();
    graph.connect(mean, "value", opacity, "value").unwrap();

    let engine = ExecutionEngine::new();
    let outside = engine
        .request_region_with(&graph, opacity, "output", &rect(50, 50, 2, 2), engine.default_options())
        .unwrap();
    assert_eq!(outside.stats.nodes_processed, 0);
    let plan = engine.plan_request(&graph, opacity, "output", &rect(50, 50, 2, 2)).unwrap();
    assert!(!plan.wants_scalar(mean, "value"));

    let inside = engine
        .request_region_with(&graph, opacity, "output", &rect(0, 0, 2, 2), engine.default_options())
        .unwrap();
    assert_eq!(inside.stats.nodes_processed, 3);
}
