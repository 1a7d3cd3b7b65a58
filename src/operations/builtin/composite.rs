//! Porter-Duff compositing.

use crate::core::buffer::Buffer;
use crate::core::context::{ProcessContext, RegionContext};
use crate::core::error::ExecutionError;
use crate::core::format::PixelFormat;
use crate::core::node::{Category, Operation, OperationMetadata};
use crate::core::pad::PadDefinition;
use crate::core::rect::Rectangle;
use crate::operations::registry::OperationRegistry;

/// Register compositing operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register(|| Box::new(Over));
}

/// Places `aux` over `input`.
///
/// Either side may be unconnected, in which case it reads as transparent.
#[derive(Debug, Clone, Default)]
pub struct Over;

impl Operation for Over {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("over", "Over")
            .description("Composite the aux input over the main input")
            .category(Category::Composite)
            .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaPremulF32))
            .input(
                PadDefinition::pixel_input_as("aux", PixelFormat::RgbaPremulF32)
                    .optional()
                    .with_description("Layer placed on top"),
            )
            .output(PadDefinition::pixel_output("output"))
            .tags(["blend", "layer", "porter-duff"])
            .build()
    }

    fn output_format(&self, _pad: &str, _ctx: &RegionContext) -> PixelFormat {
        PixelFormat::RgbaF32
    }

    fn bounding_box(&self, ctx: &RegionContext) -> Rectangle {
        ctx.union_of_inputs()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let rect = ctx.output_rect();
        let out = ctx.allocate_output()?;
        let read = |pad: &str| {
            ctx.input(pad)
                .map(|b| b.get(&rect, PixelFormat::RgbaPremulF32))
                .unwrap_or_else(|| vec![0.0; rect.area() as usize * 4])
        };

        let mut below = read("input");
        let above = read("aux");
        for (dst, src) in below.chunks_exact_mut(4).zip(above.chunks_exact(4)) {
            let keep = 1.0 - src[3];
            for c in 0..4 {
                dst[c] = src[c] + dst[c] * keep;
            }
        }

        out.set(&rect, PixelFormat::RgbaPremulF32, &below)?;
        Ok(out)
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

    fn composite(input: Option<Buffer>, aux: Option<Buffer>, rect: Rectangle) -> Buffer {
        let mut region = RegionContext::new(NodeId(1));
        if let Some(b) = &input {
            region = region.with_input("input", b.extent(), Some(PixelFormat::RgbaPremulF32));
        }
        if let Some(b) = &aux {
            region = region.with_input("aux", b.extent(), Some(PixelFormat::RgbaPremulF32));
        }
        let mut ctx = ProcessContext::new(&region, "output", rect, PixelFormat::RgbaF32);
        if let Some(b) = input {
            ctx.add_input("input", b);
        }
        if let Some(b) = aux {
            ctx.add_input("aux", b);
        }
        Over.process(&ctx).unwrap()
    }

    #[test]
    fn test_bounding_box_is_union() {
        let region = RegionContext::new(NodeId(1))
            .with_input("input", Rectangle::new(0, 0, 10, 10), None)
            .with_input("aux", Rectangle::new(20, 0, 5, 5), None);
        assert_eq!(Over.bounding_box(&region), Rectangle::new(0, 0, 25, 10));
    }

    #[test]
    fn test_opaque_aux_wins() {
        let rect = Rectangle::new(0, 0, 2, 2);
        let input = Buffer::filled(rect, PixelFormat::RgbaF32, Color::rgb(1.0, 0.0, 0.0)).unwrap();
        let aux = Buffer::filled(rect, PixelFormat::RgbaF32, Color::rgb(0.0, 0.0, 1.0)).unwrap();
        let out = composite(Some(input), Some(aux), rect);
        assert_eq!(out.pixel(1, 1), Some([0.0, 0.0, 1.0, 1.0]));
    }

    #[test]
    fn test_half_transparent_aux() {
        let rect = Rectangle::new(0, 0, 1, 1);
        let input = Buffer::filled(rect, PixelFormat::RgbaF32, Color::rgb(1.0, 0.0, 0.0)).unwrap();
        let aux = Buffer::filled(rect, PixelFormat::RgbaF32, Color::new(0.0, 0.0, 1.0, 0.5)).unwrap();
        let [r, g, b, a] = composite(Some(input), Some(aux), rect).pixel(0, 0).unwrap();
        assert!((r - 0.5).abs() < 1e-6);
        assert_eq!(g, 0.0);
        assert!((b - 0.5).abs() < 1e-6);
        assert!((a - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_aux_passes_input() {
        let rect = Rectangle::new(0, 0, 3, 1);
        let input = Buffer::filled(Rectangle::new(0, 0, 2, 1), PixelFormat::RgbaF32, Color::WHITE).unwrap();
        let out = composite(Some(input), None, rect);
        assert_eq!(out.pixel(0, 0), Some([1.0; 4]));
        assert_eq!(out.pixel(2, 0), Some([0.0; 4]));
    }
}
