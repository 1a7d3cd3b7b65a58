//! Ambit CLI - request regions of image graphs from the command line.

use ambit::prelude::*;
use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ambit", version, about = "Demand-driven image graph engine")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all available operations.
    List {
        /// Print metadata as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show detailed info about an operation.
    Info {
        /// Operation ID, e.g. `box_blur`.
        operation: String,

        /// Print metadata as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Load an image, run it through a chain of operations and save a region.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input image.
    #[arg(long)]
    input: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    output: PathBuf,

    /// Box blur radius.
    #[arg(long)]
    blur: Option<f64>,

    /// Invert the color channels.
    #[arg(long)]
    invert: bool,

    /// Stretch contrast to the full range.
    #[arg(long)]
    stretch: bool,

    /// Region to render as `x,y,w,h` (default: the whole result).
    #[arg(long, value_parser = parse_region)]
    region: Option<Rectangle>,

    /// Engine configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Evaluate independent nodes in parallel.
    #[arg(long)]
    parallel: bool,

    /// Print the graph in DOT format before rendering.
    #[arg(long)]
    dot: bool,
}

fn parse_region(text: &str) -> Result<Rectangle, String> {
    Rectangle::parse(text).ok_or_else(|| format!("expected x,y,w,h, got '{}'", text))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::List { json } => cmd_list(json),
        Command::Info { operation, json } => cmd_info(&operation, json),
        Command::Render(args) => cmd_render(args),
    }
}

fn cmd_list(json: bool) -> anyhow::Result<()> {
    let registry = OperationRegistry::with_builtins();
    let grouped = registry.grouped_by_category();

    if json {
        println!("{}", serde_json::to_string_pretty(&grouped).context("serialize operation list")?);
        return Ok(());
    }

    println!("Available operations ({} total):", registry.len());
    println!();
    for (category, operations) in grouped {
        println!("  {}", category.display_name());
        for metadata in operations {
            println!("      {:<18} {}", metadata.id, metadata.description);
        }
        println!();
    }
    Ok(())
}

fn cmd_info(id: &str, json: bool) -> anyhow::Result<()> {
    let registry = OperationRegistry::with_builtins();
    let Some(metadata) = registry.get_metadata(id) else {
        bail!("operation not found: {} (use 'list' to see available operations)", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(metadata).context("serialize metadata")?);
        return Ok(());
    }

    println!("Operation: {}", metadata.name);
    println!("ID: {}", metadata.id);
    println!("Category: {}", metadata.category.display_name());
    println!("Version: {}", metadata.version);
    println!();
    println!("Description:");
    println!("  {}", metadata.description);
    println!();

    let print_pads = |title: &str, pads: &[PadDefinition]| {
        if pads.is_empty() {
            return;
        }
        println!("{}:", title);
        for pad in pads {
            let optional = if pad.optional { " (optional)" } else { "" };
            println!("  {} [{}]{}", pad.name, pad.pad_type, optional);
            if !pad.description.is_empty() {
                println!("    {}", pad.description);
            }
        }
        println!();
    };
    print_pads("Inputs", metadata.inputs.as_slice());
    print_pads("Outputs", metadata.outputs.as_slice());

    if !metadata.properties.is_empty() {
        println!("Properties:");
        for property in &metadata.properties {
            println!("  {} [{}] = {}", property.name, property.kind, property.default_value);
            if !property.description.is_empty() {
                println!("    {}", property.description);
            }
        }
    }
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => EngineConfig::default(),
    };

    let registry = OperationRegistry::with_builtins();
    let mut graph = ProcessingGraph::new().with_region_cache(std::sync::Arc::new(config.region_cache()));

    let mut add = |id: &str| {
        registry
            .create(id)
            .map(|op| graph.add_operation(op))
            .with_context(|| format!("operation '{}' is not registered", id))
    };
    let load = add("load_image")?;
    let blur = args.blur.map(|_| add("box_blur")).transpose()?;
    let invert = args.invert.then(|| add("invert")).transpose()?;
    let stretch = args.stretch.then(|| add("stretch_contrast")).transpose()?;

    graph
        .set_property(load, "path", Value::String(args.input.to_string_lossy().into_owned()))
        .context("set input path")?;
    if let (Some(node), Some(radius)) = (blur, args.blur) {
        graph
            .set_property(node, "radius", Value::Float(radius))
            .context("set blur radius")?;
    }

    let mut last = load;
    for node in [blur, invert, stretch].into_iter().flatten() {
        graph
            .connect(last, "output", node, "input")
            .with_context(|| format!("connect {} to {}", last, node))?;
        last = node;
    }

    if args.dot {
        print!("{}", TopologyAnalyzer::new(&graph).to_dot());
    }

    let report = ValidationPipeline::default().validate(&graph);
    for warning in &report.warnings {
        log::warn!("{}", warning.message);
    }
    if !report.can_execute() {
        for line in report.detailed_errors() {
            eprintln!("  {}", line);
        }
        bail!("validation failed: {}", report.summary());
    }

    let options = config
        .execution_options()
        .with_parallel(config.parallel || args.parallel)
        .with_progress(|update| {
            if let ProgressUpdate::NodeProcessed { node_name, rect, duration_ms, .. } = update {
                log::info!("{} produced {} in {}ms", node_name, rect, duration_ms);
            }
        });
    let engine = ExecutionEngine::new().with_default_options(options);

    let region = match args.region {
        Some(region) => region,
        None => engine
            .bounding_box(&graph, last, "output")
            .context("compute result bounds")?,
    };
    if region.is_empty() || region.is_infinite() {
        bail!("nothing to render: the requested region is {}", region);
    }

    let pixels = engine
        .request_region(&graph, last, "output", &region)
        .with_context(|| format!("render {}", region))?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    pixels
        .to_rgba8()
        .save(&args.output)
        .with_context(|| format!("write image '{}'", args.output.display()))?;

    eprintln!("wrote {} ({})", args.output.display(), region);
    Ok(())
}
