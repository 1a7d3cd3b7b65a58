//! Pixel sources: solid color, checkerboard, and an in-memory buffer.

use super::{expect_integer, unknown_property};
use crate::core::buffer::Buffer;
use crate::core::context::{ProcessContext, RegionContext};
use crate::core::error::ExecutionError;
use crate::core::format::PixelFormat;
use crate::core::node::{Category, Operation, OperationMetadata};
use crate::core::pad::{PadDefinition, PropertyDefinition};
use crate::core::rect::Rectangle;
use crate::core::types::{Color, ScalarKind, Value};
use crate::operations::registry::OperationRegistry;

/// Register source operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register(|| Box::new(ColorSource::default()));
    registry.register(|| Box::new(Checkerboard::default()));
    registry.register(|| Box::new(BufferSource::default()));
}

/// Fills the infinite plane with one color.
#[derive(Debug, Clone)]
pub struct ColorSource {
    pub color: Color,
}

impl ColorSource {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Default for ColorSource {
    fn default() -> Self {
        Self::new(Color::BLACK)
    }
}

impl Operation for ColorSource {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("color", "Color")
            .description("An infinite plane of a single color")
            .category(Category::Source)
            .output(PadDefinition::pixel_output("output"))
            .property(
                PropertyDefinition::new("value", ScalarKind::Color, Value::Color(Color::BLACK))
                    .with_description("Fill color"),
            )
            .tags(["fill", "solid"])
            .build()
    }

    fn output_format(&self, _pad: &str, _ctx: &RegionContext) -> PixelFormat {
        PixelFormat::RgbaF32
    }

    fn bounding_box(&self, _ctx: &RegionContext) -> Rectangle {
        Rectangle::infinite()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        Ok(Buffer::filled(ctx.output_rect(), ctx.output_format(), self.color)?)
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "value").then(|| Value::Color(self.color))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), String> {
        match name {
            "value" => {
                self.color = value
                    .as_color()
                    .ok_or_else(|| format!("'value' expects a color, got {}", value))?;
                Ok(())
            }
            _ => Err(unknown_property(name)),
        }
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

/// An infinite checkerboard of two colors.
#[derive(Debug, Clone)]
pub struct Checkerboard {
    pub size: i32,
    pub color1: Color,
    pub color2: Color,
}

impl Default for Checkerboard {
    fn default() -> Self {
        Self {
            size: 16,
            color1: Color::rgb(0.4, 0.4, 0.4),
            color2: Color::rgb(0.6, 0.6, 0.6),
        }
    }
}

impl Checkerboard {
    fn color_at(&self, x: i32, y: i32) -> Color {
        let cx = x.div_euclid(self.size);
        let cy = y.div_euclid(self.size);
        if (cx + cy).rem_euclid(2) == 0 {
            self.color1
        } else {
            self.color2
        }
    }
}

impl Operation for Checkerboard {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("checkerboard", "Checkerboard")
            .description("An infinite checkerboard pattern")
            .category(Category::Source)
            .output(PadDefinition::pixel_output("output"))
            .property(
                PropertyDefinition::new("size", ScalarKind::Integer, Value::Integer(16))
                    .with_description("Edge length of one square")
                    .with_range(1.0, 4096.0),
            )
            .property(PropertyDefinition::new(
                "color1",
                ScalarKind::Color,
                Value::Color(Color::rgb(0.4, 0.4, 0.4)),
            ))
            .property(PropertyDefinition::new(
                "color2",
                ScalarKind::Color,
                Value::Color(Color::rgb(0.6, 0.6, 0.6)),
            ))
            .build()
    }

    fn output_format(&self, _pad: &str, _ctx: &RegionContext) -> PixelFormat {
        PixelFormat::RgbaF32
    }

    fn bounding_box(&self, _ctx: &RegionContext) -> Rectangle {
        Rectangle::infinite()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let rect = ctx.output_rect();
        let mut pixels = Vec::with_capacity(rect.area() as usize * 4);
        for y in rect.y..rect.bottom() as i32 {
            for x in rect.x..rect.right() as i32 {
                pixels.extend_from_slice(&self.color_at(x, y).to_rgba());
            }
        }
        let out = ctx.allocate_output()?;
        out.set(&rect, PixelFormat::RgbaF32, &pixels)?;
        Ok(out)
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "size" => Some(Value::Integer(self.size as i64)),
            "color1" => Some(Value::Color(self.color1)),
            "color2" => Some(Value::Color(self.color2)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), String> {
        let color = || value.as_color().ok_or_else(|| format!("'{}' expects a color", name));
        match name {
            "size" => self.size = expect_integer(name, value)?.clamp(1, 4096) as i32,
            "color1" => self.color1 = color()?,
            "color2" => self.color2 = color()?,
            _ => return Err(unknown_property(name)),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

/// Presents a buffer held in memory. The bounding box is the buffer extent.
#[derive(Debug, Clone, Default)]
pub struct BufferSource {
    buffer: Option<Buffer>,
}

impl BufferSource {
    pub fn new(buffer: Buffer) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }

    /// Replace the held buffer.
    pub fn set_buffer(&mut self, buffer: Option<Buffer>) {
        self.buffer = buffer;
    }

    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }
}

impl Operation for BufferSource {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("buffer_source", "Buffer Source")
            .description("Pixels from a buffer held in memory")
            .category(Category::Source)
            .output(PadDefinition::pixel_output("output"))
            .build()
    }

    fn output_format(&self, _pad: &str, _ctx: &RegionContext) -> PixelFormat {
        self.buffer
            .as_ref()
            .map(|b| b.format())
            .unwrap_or(PixelFormat::RgbaF32)
    }

    fn bounding_box(&self, _ctx: &RegionContext) -> Rectangle {
        self.buffer
            .as_ref()
            .map(|b| b.extent())
            .unwrap_or_else(Rectangle::empty)
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        match &self.buffer {
            Some(buffer) => Ok(buffer.reframe(&ctx.output_rect())),
            None => ctx.allocate_output(),
        }
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;

    fn run(op: &dyn Operation, rect: Rectangle) -> Buffer {
        let region = RegionContext::new(NodeId(1));
        let format = op.output_format("output", &region);
        let ctx = ProcessContext::new(&region, "output", rect, format);
        op.process(&ctx).unwrap()
    }

    #[test]
    fn test_color_fills_request() {
        let op = ColorSource::new(Color::rgb(1.0, 0.0, 0.0));
        assert!(op.bounding_box(&RegionContext::new(NodeId(1))).is_infinite());

        let out = run(&op, Rectangle::new(-5, -5, 3, 3));
        assert_eq!(out.extent(), Rectangle::new(-5, -5, 3, 3));
        assert_eq!(out.pixel(-4, -4), Some([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_checkerboard_pattern() {
        let mut op = Checkerboard::default();
        op.set_property("size", &Value::Integer(2)).unwrap();
        let out = run(&op, Rectangle::new(-2, 0, 4, 1));

        let first = op.color1.to_rgba();
        let second = op.color2.to_rgba();
        assert_eq!(out.pixel(-2, 0), Some(second));
        assert_eq!(out.pixel(-1, 0), Some(second));
        assert_eq!(out.pixel(0, 0), Some(first));
        assert_eq!(out.pixel(1, 0), Some(first));
    }

    #[test]
    fn test_buffer_source_extent() {
        let held = Buffer::filled(Rectangle::new(2, 2, 4, 4), PixelFormat::YF32, Color::WHITE).unwrap();
        let op = BufferSource::new(held.clone());
        let region = RegionContext::new(NodeId(1));

        assert_eq!(op.bounding_box(&region), Rectangle::new(2, 2, 4, 4));
        assert_eq!(op.output_format("output", &region), PixelFormat::YF32);

        let out = run(&op, Rectangle::new(3, 3, 2, 2));
        assert!(out.shares_storage(&held));
        assert_eq!(out.extent(), Rectangle::new(3, 3, 2, 2));
        assert!(BufferSource::default().bounding_box(&region).is_empty());
    }

    #[test]
    fn test_color_property_round_trip() {
        let mut op = ColorSource::default();
        op.set_property("value", &Value::Color(Color::WHITE)).unwrap();
        assert_eq!(op.property("value"), Some(Value::Color(Color::WHITE)));
        assert!(op.set_property("value", &Value::Float(1.0)).is_err());
    }
}
