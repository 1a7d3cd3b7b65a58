//! Core types and traits for the Ambit engine.
//!
//! This module contains the foundational types that every other part of the
//! engine builds on:
//! - Rectangles and halo margins
//! - Pixel formats and windowed buffers
//! - Pad, property and value types
//! - The Operation trait and its contexts
//! - Error types

pub mod buffer;
pub mod context;
pub mod error;
pub mod format;
pub mod node;
pub mod pad;
pub mod rect;
pub mod types;

// Re-export commonly used types
pub use buffer::{AbyssPolicy, Buffer, Interpolation};
pub use context::{InputInfo, ProcessContext, RegionContext};
pub use error::{
    AmbitError, AmbitResult, BufferError, ConfigError, ConnectionId, ExecutionError, ExecutionResult,
    GraphError, GraphResult, NodeId, ValidationError, ValidationReport, ValidationWarning,
};
pub use format::{FormatPolicy, PixelFormat, Rgba};
pub use node::{Category, Nop, Operation, OperationMetadata};
pub use pad::{Constraint, PadDefinition, PadDirection, PropertyDefinition};
pub use rect::{Halo, Rectangle};
pub use types::{Color, PadType, ScalarKind, Value};
