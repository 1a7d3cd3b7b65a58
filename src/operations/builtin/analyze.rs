//! Whole-image statistics exposed on scalar pads.

use crate::core::buffer::Buffer;
use crate::core::context::{ProcessContext, RegionContext};
use crate::core::error::ExecutionError;
use crate::core::format::PixelFormat;
use crate::core::node::{Category, Operation, OperationMetadata};
use crate::core::pad::PadDefinition;
use crate::core::rect::Rectangle;
use crate::core::types::{ScalarKind, Value};
use crate::operations::registry::OperationRegistry;

/// Register analysis operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register(|| Box::new(Mean));
}

/// Mean luminance of the whole input, on the `value` pad.
#[derive(Debug, Clone, Default)]
pub struct Mean;

impl Operation for Mean {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("mean", "Mean")
            .description("Average luminance of the input")
            .category(Category::Analyze)
            .input(PadDefinition::pixel_input("input"))
            .output(PadDefinition::scalar_output("value", ScalarKind::Float))
            .tags(["average", "statistics"])
            .build()
    }

    fn required_input_region(&self, _pad: &str, _output: &Rectangle, ctx: &RegionContext) -> Rectangle {
        ctx.source_bounding_box("input").unwrap_or_else(Rectangle::empty)
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        Err(ctx.fail("mean has no pixel output"))
    }

    fn compute_scalar(&self, _pad: &str, ctx: &ProcessContext) -> Result<Value, ExecutionError> {
        let Some(input) = ctx.input("input") else {
            return Ok(Value::Float(0.0));
        };
        let extent = input.extent();
        let luma = input.get(&extent, PixelFormat::YF32);
        if luma.is_empty() {
            return Ok(Value::Float(0.0));
        }
        let sum: f64 = luma.iter().map(|&v| v as f64).sum();
        Ok(Value::Float(sum / luma.len() as f64))
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;
    use crate::core::types::Color;

    #[test]
    fn test_mean_of_half_white() {
        let mut data = vec![0.0; 4 * 4];
        for px in data.chunks_exact_mut(4).take(2) {
            px.copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        }
        let input = Buffer::from_pixels(Rectangle::new(0, 0, 4, 1), PixelFormat::RgbaF32, data).unwrap();
        let region = RegionContext::new(NodeId(1)).with_input("input", input.extent(), None);
        let mut ctx = ProcessContext::new(&region, "value", Rectangle::empty(), PixelFormat::RgbaF32);
        ctx.add_input("input", input);

        let value = Mean.compute_scalar("value", &ctx).unwrap();
        assert!((value.as_float().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mean_without_input() {
        let region = RegionContext::new(NodeId(1));
        let ctx = ProcessContext::new(&region, "value", Rectangle::empty(), PixelFormat::RgbaF32);
        assert_eq!(Mean.compute_scalar("value", &ctx).unwrap(), Value::Float(0.0));
        assert!(Mean.process(&ctx).is_err());
    }

    #[test]
    fn test_requires_whole_input() {
        let region = RegionContext::new(NodeId(1))
            .with_input("input", Rectangle::new(-3, 0, 9, 9), Some(PixelFormat::RgbaF32));
        assert_eq!(
            Mean.required_input_region("input", &Rectangle::new(0, 0, 1, 1), &region),
            Rectangle::new(-3, 0, 9, 9)
        );
        let flat = Buffer::filled(Rectangle::new(0, 0, 2, 2), PixelFormat::RgbaF32, Color::WHITE).unwrap();
        let mut ctx = ProcessContext::new(&region, "value", Rectangle::empty(), PixelFormat::RgbaF32);
        ctx.add_input("input", flat);
        let v = Mean.compute_scalar("value", &ctx).unwrap().as_float().unwrap();
        assert!((v - 1.0).abs() < 1e-6);
    }
}
