//! Box blur.

use super::{expect_float, unknown_property};
use crate::core::buffer::{AbyssPolicy, Buffer};
use crate::core::context::ProcessContext;
use crate::core::error::ExecutionError;
use crate::core::format::PixelFormat;
use crate::core::node::{Category, Operation, OperationMetadata};
use crate::core::pad::{PadDefinition, PropertyDefinition};
use crate::core::rect::Halo;
use crate::core::types::{ScalarKind, Value};
use crate::operations::registry::OperationRegistry;

/// Register blur operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register(|| Box::new(BoxBlur::default()));
}

/// Averages each pixel with its neighbours within `radius`.
///
/// Blurs in premultiplied alpha. Pixels beyond the input's bounding box
/// repeat the nearest edge pixel.
#[derive(Debug, Clone)]
pub struct BoxBlur {
    pub radius: f64,
}

impl Default for BoxBlur {
    fn default() -> Self {
        Self { radius: 4.0 }
    }
}

impl BoxBlur {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }
}

/// One separable pass. `src` is `src_w * src_h` premultiplied RGBA pixels;
/// the result drops `r` pixels from each end along the pass direction.
fn box_pass(src: &[f32], src_w: usize, src_h: usize, r: usize, horizontal: bool) -> Vec<f32> {
    let (out_w, out_h) = if horizontal {
        (src_w - 2 * r, src_h)
    } else {
        (src_w, src_h - 2 * r)
    };
    let taps = (2 * r + 1) as f32;
    let mut out = vec![0.0; out_w * out_h * 4];

    for y in 0..out_h {
        for x in 0..out_w {
            let mut acc = [0.0f32; 4];
            for k in 0..=2 * r {
                let (sx, sy) = if horizontal { (x + k, y) } else { (x, y + k) };
                let i = (sy * src_w + sx) * 4;
                for c in 0..4 {
                    acc[c] += src[i + c];
                }
            }
            let o = (y * out_w + x) * 4;
            for c in 0..4 {
                out[o + c] = acc[c] / taps;
            }
        }
    }
    out
}

impl Operation for BoxBlur {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("box_blur", "Box Blur")
            .description("Average each pixel with its neighbours")
            .category(Category::Blur)
            .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
            .output(PadDefinition::pixel_output("output"))
            .property(
                PropertyDefinition::new("radius", ScalarKind::Float, Value::Float(4.0))
                    .with_description("Blur radius in pixels")
                    .with_range(0.0, 1000.0),
            )
            .build()
    }

    fn halo(&self) -> Halo {
        Halo::from_radius(self.radius)
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let rect = ctx.output_rect();
        let out = ctx.allocate_output()?;
        let Some(input) = ctx.input("input") else {
            return Ok(out);
        };

        let halo = self.halo();
        let r = halo.left as usize;
        let source = rect.grow(&halo);
        let pixels = input.get_with_abyss(&source, PixelFormat::RgbaPremulF32, AbyssPolicy::Clamp);

        let (w, h) = (source.width as usize, source.height as usize);
        let rows = box_pass(&pixels, w, h, r, true);
        let blurred = box_pass(&rows, w - 2 * r, h, r, false);

        out.set(&rect, PixelFormat::RgbaPremulF32, &blurred)?;
        Ok(out)
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "radius").then(|| Value::Float(self.radius))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), String> {
        match name {
            "radius" => {
                self.radius = expect_float(name, value)?.max(0.0);
                Ok(())
            }
            _ => Err(unknown_property(name)),
        }
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::RegionContext;
    use crate::core::error::NodeId;
    use crate::core::types::Color;
    use crate::core::rect::Rectangle;

    fn blur(radius: f64, input: Buffer, rect: Rectangle) -> Buffer {
        let region = RegionContext::new(NodeId(1)).with_input(
            "input",
            input.extent(),
            Some(PixelFormat::RgbaF32),
        );
        let mut ctx = ProcessContext::new(&region, "output", rect, PixelFormat::RgbaF32);
        ctx.add_input("input", input);
        BoxBlur::new(radius).process(&ctx).unwrap()
    }

    #[test]
    fn test_halo_rounds_up() {
        let op = BoxBlur::new(1.5);
        assert_eq!(op.halo(), Halo::symmetric(2));
        let region = RegionContext::new(NodeId(1));
        assert_eq!(
            op.required_input_region("input", &Rectangle::new(10, 10, 5, 5), &region),
            Rectangle::new(8, 8, 9, 9)
        );
    }

    #[test]
    fn test_flat_input_unchanged() {
        let input = Buffer::filled(Rectangle::new(0, 0, 6, 6), PixelFormat::RgbaF32, Color::rgb(0.5, 0.5, 0.5)).unwrap();
        let out = blur(1.0, input, Rectangle::new(0, 0, 6, 6));
        let [r, _, _, a] = out.pixel(0, 0).unwrap();
        assert!((r - 0.5).abs() < 1e-6);
        assert!((a - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_averages_neighbours() {
        // A single bright column at x = 2 in a 5x1 strip
        let mut data = vec![0.0; 5 * 4];
        for x in 0..5 {
            data[x * 4 + 3] = 1.0;
        }
        data[2 * 4] = 1.0;
        let input = Buffer::from_pixels(Rectangle::new(0, 0, 5, 1), PixelFormat::RgbaF32, data).unwrap();

        let out = blur(1.0, input, Rectangle::new(1, 0, 3, 1));
        let third = 1.0 / 3.0;
        assert!((out.pixel(1, 0).unwrap()[0] - third).abs() < 1e-6);
        assert!((out.pixel(2, 0).unwrap()[0] - third).abs() < 1e-6);
        assert!((out.pixel(3, 0).unwrap()[0] - third).abs() < 1e-6);
    }

    #[test]
    fn test_zero_radius_copies() {
        let input = Buffer::filled(Rectangle::new(0, 0, 2, 2), PixelFormat::RgbaF32, Color::WHITE).unwrap();
        let out = blur(0.0, input, Rectangle::new(0, 0, 2, 2));
        assert_eq!(out.pixel(1, 1), Some([1.0, 1.0, 1.0, 1.0]));
    }
}
