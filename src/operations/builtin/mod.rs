//! Built-in operation implementations.
//!
//! This module contains the standard operations that ship with Ambit.

mod analyze;
mod blur;
mod color;
mod composite;
mod io;
mod sources;
mod transform;

use crate::core::node::Nop;
use crate::core::types::Value;
use crate::operations::registry::OperationRegistry;

/// Register all built-in operations.
pub fn register_all(registry: &mut OperationRegistry) {
    sources::register(registry);
    io::register(registry);
    color::register(registry);
    blur::register(registry);
    transform::register(registry);
    composite::register(registry);
    analyze::register(registry);
    registry.register(|| Box::new(Nop));
}

// Re-export for direct access
pub use analyze::Mean;
pub use blur::BoxBlur;
pub use color::{Invert, LinearToSrgb, Opacity, SrgbTables, SrgbToLinear, StretchContrast};
pub use composite::Over;
pub use io::LoadImage;
pub use sources::{BufferSource, Checkerboard, ColorSource};
pub use transform::{Crop, Translate};

fn expect_float(name: &str, value: &Value) -> Result<f64, String> {
    value
        .as_float()
        .ok_or_else(|| format!("'{}' expects a number, got {}", name, value))
}

fn expect_integer(name: &str, value: &Value) -> Result<i64, String> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        other => Err(format!("'{}' expects an integer, got {}", name, other)),
    }
}

fn unknown_property(name: &str) -> String {
    format!("unknown property '{}'", name)
}
