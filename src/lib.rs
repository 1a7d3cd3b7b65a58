//! # Ambit - Demand-driven Image Graphs
//!
//! Ambit evaluates image processing graphs lazily: nothing is computed until
//! a rectangle of some output pad is requested, and then only the pixels that
//! contribute to that rectangle are produced.
//!
//! ## Features
//!
//! - **Region propagation**: Requests flow upstream through halos, crops and
//!   translations so each node computes only what its consumers read
//! - **Nested graphs**: Graph nodes group children behind proxy pads
//! - **Format negotiation**: Input pads accept, convert or insist on a pixel format
//! - **Parallel evaluation**: Independent nodes run on the rayon pool
//! - **Region cache**: Opt-in per node, invalidated exactly by graph edits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ambit::prelude::*;
//!
//! let registry = OperationRegistry::with_builtins();
//! let mut graph = ProcessingGraph::new();
//!
//! let board = graph.add_operation(registry.create("checkerboard").unwrap());
//! let blur = graph.add_operation(registry.create("box_blur").unwrap());
//! graph.set_property(blur, "radius", Value::Float(2.0)).unwrap();
//! graph.connect(board, "output", blur, "input").unwrap();
//!
//! let report = ValidationPipeline::default().validate(&graph);
//! assert!(report.can_execute());
//!
//! let engine = ExecutionEngine::new();
//! let pixels = engine
//!     .request_region(&graph, blur, "output", &Rectangle::new(0, 0, 64, 64))
//!     .unwrap();
//! assert_eq!(pixels.extent(), Rectangle::new(0, 0, 64, 64));
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Rectangles, buffers, pixel formats, pads and the [`Operation`](core::Operation) trait
//! - [`graph`]: The node arena, connections, nested graphs and traversal
//! - [`execution`]: The prepare, request and evaluate passes, caching and progress
//! - [`validation`]: Multi-stage validation pipeline
//! - [`operations`]: Operation registry and built-in operations
//!
//! ## Writing an Operation
//!
//! Only [`metadata`](core::Operation::metadata), [`process`](core::Operation::process)
//! and [`clone_box`](core::Operation::clone_box) are required. The region
//! methods default to a point filter over the `input` pad.
//!
//! ```rust,ignore
//! use ambit::prelude::*;
//!
//! #[derive(Clone)]
//! struct Darken;
//!
//! impl Operation for Darken {
//!     fn metadata(&self) -> OperationMetadata {
//!         OperationMetadata::builder("darken", "Darken")
//!             .category(Category::Color)
//!             .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
//!             .output(PadDefinition::pixel_output("output"))
//!             .build()
//!     }
//!
//!     fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
//!         let rect = ctx.output_rect();
//!         let out = ctx.allocate_output()?;
//!         let mut pixels = ctx.require_input("input")?.get(&rect, PixelFormat::RgbaF32);
//!         for px in pixels.chunks_exact_mut(4) {
//!             px[..3].iter_mut().for_each(|c| *c *= 0.5);
//!         }
//!         out.set(&rect, PixelFormat::RgbaF32, &pixels)?;
//!         Ok(out)
//!     }
//!
//!     fn clone_box(&self) -> Box<dyn Operation> {
//!         Box::new(self.clone())
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod graph;
pub mod operations;
pub mod validation;

use crate::core::{AmbitResult, Buffer, NodeId, Rectangle};
use crate::graph::ProcessingGraph;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use ambit::prelude::*;
/// ```
pub mod prelude {
    // Geometry and pixels
    pub use crate::core::buffer::{AbyssPolicy, Buffer, Interpolation};
    pub use crate::core::format::{FormatPolicy, PixelFormat};
    pub use crate::core::rect::{Halo, Rectangle};

    // Values and pads
    pub use crate::core::pad::{Constraint, PadDefinition, PadDirection, PropertyDefinition};
    pub use crate::core::types::{Color, PadType, ScalarKind, Value};

    // Operation trait and contexts
    pub use crate::core::context::{ProcessContext, RegionContext};
    pub use crate::core::node::{Category, Nop, Operation, OperationMetadata};

    // Errors
    pub use crate::core::error::{
        AmbitError, AmbitResult, BufferError, ConfigError, ConnectionId, ExecutionError,
        GraphError, NodeId, ValidationError, ValidationReport, ValidationWarning,
    };

    // Graph
    pub use crate::graph::{
        Connection, Endpoint, GraphNode, ProcessingGraph, SharedGraph, TopologyAnalyzer, Visitable,
        Visitor,
    };

    // Validation
    pub use crate::validation::{ValidationPipeline, ValidationStage};

    // Execution
    pub use crate::execution::{
        EngineConfig, ExecutionEngine, ExecutionOptions, ProgressCallback, ProgressUpdate,
        RegionCache, RequestPlan, RequestStats, SharedCache,
    };

    // Operations
    pub use crate::operations::builtin::{
        BoxBlur, BufferSource, Checkerboard, ColorSource, Crop, Invert, LinearToSrgb, LoadImage,
        Mean, Opacity, Over, SrgbToLinear, StretchContrast, Translate,
    };
    pub use crate::operations::{OperationFactory, OperationRegistry};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Compute `rect` of `pad` on `node` with a default engine.
///
/// Convenience for one-off requests; hold an
/// [`ExecutionEngine`](execution::ExecutionEngine) to reuse its thread pool
/// and options.
pub fn request_region(
    graph: &ProcessingGraph,
    node: NodeId,
    pad: &str,
    rect: &Rectangle,
) -> AmbitResult<Buffer> {
    execution::ExecutionEngine::new().request_region(graph, node, pad, rect)
}
