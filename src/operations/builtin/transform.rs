//! Geometric operations: translate and crop.

use super::{expect_float, expect_integer, unknown_property};
use crate::core::buffer::Buffer;
use crate::core::context::{ProcessContext, RegionContext};
use crate::core::error::ExecutionError;
use crate::core::node::{Category, Operation, OperationMetadata};
use crate::core::pad::{PadDefinition, PropertyDefinition};
use crate::core::rect::Rectangle;
use crate::core::types::{ScalarKind, Value};
use crate::operations::registry::OperationRegistry;

/// Register transform operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register(|| Box::new(Translate::default()));
    registry.register(|| Box::new(Crop::default()));
}

/// Moves the input by a whole number of pixels.
///
/// Fractional offsets are rounded to the nearest pixel.
#[derive(Debug, Clone, Default)]
pub struct Translate {
    pub x: f64,
    pub y: f64,
}

impl Translate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn offset(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

impl Operation for Translate {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("translate", "Translate")
            .description("Move the input by an offset")
            .category(Category::Transform)
            .input(PadDefinition::pixel_input("input"))
            .output(PadDefinition::pixel_output("output"))
            .property(PropertyDefinition::new("x", ScalarKind::Float, Value::Float(0.0)))
            .property(PropertyDefinition::new("y", ScalarKind::Float, Value::Float(0.0)))
            .tags(["move", "shift", "offset"])
            .build()
    }

    fn bounding_box(&self, ctx: &RegionContext) -> Rectangle {
        let (dx, dy) = self.offset();
        ctx.source_bounding_box("input")
            .map(|b| b.translate(dx, dy))
            .unwrap_or_else(Rectangle::empty)
    }

    fn required_input_region(&self, _pad: &str, output: &Rectangle, _ctx: &RegionContext) -> Rectangle {
        let (dx, dy) = self.offset();
        output.translate(-dx, -dy)
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let rect = ctx.output_rect();
        let out = ctx.allocate_output()?;
        if let Some(input) = ctx.input("input") {
            let (dx, dy) = self.offset();
            let pixels = input.get(&rect.translate(-dx, -dy), ctx.output_format());
            out.set(&rect, ctx.output_format(), &pixels)?;
        }
        Ok(out)
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::Float(self.x)),
            "y" => Some(Value::Float(self.y)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), String> {
        match name {
            "x" => self.x = expect_float(name, value)?,
            "y" => self.y = expect_float(name, value)?,
            _ => return Err(unknown_property(name)),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

/// Limits the input to a rectangle.
#[derive(Debug, Clone)]
pub struct Crop {
    pub rect: Rectangle,
}

impl Default for Crop {
    fn default() -> Self {
        Self {
            rect: Rectangle::new(0, 0, 256, 256),
        }
    }
}

impl Crop {
    pub fn new(rect: Rectangle) -> Self {
        Self { rect }
    }
}

impl Operation for Crop {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("crop", "Crop")
            .description("Keep only a rectangle of the input")
            .category(Category::Transform)
            .input(PadDefinition::pixel_input("input"))
            .output(PadDefinition::pixel_output("output"))
            .property(PropertyDefinition::new("x", ScalarKind::Integer, Value::Integer(0)))
            .property(PropertyDefinition::new("y", ScalarKind::Integer, Value::Integer(0)))
            .property(
                PropertyDefinition::new("width", ScalarKind::Integer, Value::Integer(256))
                    .with_range(0.0, i32::MAX as f64),
            )
            .property(
                PropertyDefinition::new("height", ScalarKind::Integer, Value::Integer(256))
                    .with_range(0.0, i32::MAX as f64),
            )
            .build()
    }

    fn bounding_box(&self, ctx: &RegionContext) -> Rectangle {
        ctx.source_bounding_box("input")
            .map(|b| b.intersect(&self.rect))
            .unwrap_or_else(Rectangle::empty)
    }

    fn required_input_region(&self, _pad: &str, output: &Rectangle, _ctx: &RegionContext) -> Rectangle {
        output.intersect(&self.rect)
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let out = ctx.allocate_output()?;
        let inside = ctx.output_rect().intersect(&self.rect);
        if let Some(input) = ctx.input("input") {
            let format = ctx.output_format();
            out.set(&inside, format, &input.get(&inside, format))?;
        }
        Ok(out)
    }

    fn property(&self, name: &str) -> Option<Value> {
        let v = match name {
            "x" => self.rect.x,
            "y" => self.rect.y,
            "width" => self.rect.width,
            "height" => self.rect.height,
            _ => return None,
        };
        Some(Value::Integer(v as i64))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), String> {
        let v = expect_integer(name, value)?;
        let v = i32::try_from(v).map_err(|_| format!("'{}' is out of range", name))?;
        match name {
            "x" => self.rect.x = v,
            "y" => self.rect.y = v,
            "width" => self.rect.width = v.max(0),
            "height" => self.rect.height = v.max(0),
            _ => return Err(unknown_property(name)),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;
    use crate::core::format::PixelFormat;
    use crate::core::types::Color;

    fn region(bbox: Rectangle) -> RegionContext {
        RegionContext::new(NodeId(1)).with_input("input", bbox, Some(PixelFormat::RgbaF32))
    }

    #[test]
    fn test_translate_regions() {
        let op = Translate::new(10.0, -5.0);
        let ctx = region(Rectangle::new(0, 0, 20, 20));

        assert_eq!(op.bounding_box(&ctx), Rectangle::new(10, -5, 20, 20));
        assert_eq!(
            op.required_input_region("input", &Rectangle::new(10, 0, 4, 4), &ctx),
            Rectangle::new(0, 5, 4, 4)
        );
        assert!(op.bounding_box(&region(Rectangle::infinite())).is_infinite());
    }

    #[test]
    fn test_translate_moves_pixels() {
        let input = Buffer::filled(Rectangle::new(0, 0, 2, 2), PixelFormat::RgbaF32, Color::WHITE).unwrap();
        let op = Translate::new(2.0, 0.0);
        let rc = region(input.extent());
        let mut ctx = ProcessContext::new(&rc, "output", Rectangle::new(2, 0, 3, 1), PixelFormat::RgbaF32);
        ctx.add_input("input", input.reframe(&Rectangle::new(0, 0, 3, 1)));

        let out = op.process(&ctx).unwrap();
        assert_eq!(out.pixel(3, 0), Some([1.0; 4]));
        assert_eq!(out.pixel(4, 0), Some([0.0; 4]));
    }

    #[test]
    fn test_crop_regions() {
        let op = Crop::new(Rectangle::new(5, 5, 10, 10));
        let ctx = region(Rectangle::new(0, 0, 8, 100));

        assert_eq!(op.bounding_box(&ctx), Rectangle::new(5, 5, 3, 10));
        assert_eq!(
            op.required_input_region("input", &Rectangle::new(0, 0, 7, 7), &ctx),
            Rectangle::new(5, 5, 2, 2)
        );
        assert_eq!(op.bounding_box(&region(Rectangle::infinite())), op.rect);
    }

    #[test]
    fn test_crop_hides_pixels_outside_rect() {
        let input = Buffer::filled(Rectangle::new(0, 0, 10, 10), PixelFormat::RgbaF32, Color::WHITE).unwrap();
        let op = Crop::new(Rectangle::new(0, 0, 5, 5));
        let rc = region(input.extent());
        let mut ctx = ProcessContext::new(&rc, "output", Rectangle::new(0, 0, 10, 10), PixelFormat::RgbaF32);
        ctx.add_input("input", input.clone());

        let out = op.process(&ctx).unwrap();
        assert_eq!(out.extent(), Rectangle::new(0, 0, 10, 10));
        assert_eq!(out.pixel(4, 4), Some([1.0; 4]));
        assert_eq!(out.pixel(8, 8), Some([0.0; 4]));
        assert!(!out.shares_storage(&input));
    }

    #[test]
    fn test_crop_properties() {
        let mut op = Crop::default();
        op.set_property("width", &Value::Integer(7)).unwrap();
        assert_eq!(op.property("width"), Some(Value::Integer(7)));
        assert!(op.set_property("x", &Value::Integer(i64::MAX)).is_err());
    }
}
