//! Color operations: invert, opacity, sRGB transfer curves, contrast stretch.

use super::{expect_float, unknown_property};
use crate::core::buffer::Buffer;
use crate::core::context::{ProcessContext, RegionContext};
use crate::core::error::ExecutionError;
use crate::core::format::PixelFormat;
use crate::core::node::{Category, Operation, OperationMetadata};
use crate::core::pad::{PadDefinition, PropertyDefinition};
use crate::core::rect::Rectangle;
use crate::core::types::{ScalarKind, Value};
use crate::operations::registry::OperationRegistry;
use std::sync::Arc;

/// Register color operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register(|| Box::new(Invert));
    registry.register(|| Box::new(Opacity::default()));
    registry.register_with_setup(SrgbTables::new, |tables| Box::new(SrgbToLinear::new(tables)));
    registry.register_with_setup(SrgbTables::new, |tables| Box::new(LinearToSrgb::new(tables)));
    registry.register(|| Box::new(StretchContrast));
}

/// Apply `f` to the straight RGBA pixels of `input` over the output
/// rectangle. A missing input reads as transparent.
fn map_pixels<F>(ctx: &ProcessContext, f: F) -> Result<Buffer, ExecutionError>
where
    F: Fn(&mut [f32]),
{
    let rect = ctx.output_rect();
    let out = ctx.allocate_output()?;
    let Some(input) = ctx.input("input") else {
        return Ok(out);
    };
    let mut pixels = input.get(&rect, PixelFormat::RgbaF32);
    for px in pixels.chunks_exact_mut(4) {
        f(px);
    }
    out.set(&rect, PixelFormat::RgbaF32, &pixels)?;
    Ok(out)
}

/// Inverts the color channels, keeping alpha.
#[derive(Debug, Clone)]
pub struct Invert;

impl Operation for Invert {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("invert", "Invert")
            .description("Invert the color channels of the input")
            .category(Category::Color)
            .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
            .output(PadDefinition::pixel_output("output"))
            .tags(["negative"])
            .build()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        map_pixels(ctx, |px| {
            for c in &mut px[..3] {
                *c = 1.0 - *c;
            }
        })
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

/// Scales alpha by a factor, read from the `value` pad when connected.
#[derive(Debug, Clone)]
pub struct Opacity {
    pub value: f64,
}

impl Default for Opacity {
    fn default() -> Self {
        Self { value: 1.0 }
    }
}

impl Operation for Opacity {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("opacity", "Opacity")
            .description("Multiply the alpha channel by a factor")
            .category(Category::Color)
            .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
            .input(
                PadDefinition::scalar_input("value", ScalarKind::Float)
                    .optional()
                    .with_description("Overrides the value property"),
            )
            .output(PadDefinition::pixel_output("output"))
            .property(
                PropertyDefinition::new("value", ScalarKind::Float, Value::Float(1.0))
                    .with_description("Alpha factor")
                    .with_range(0.0, 1.0),
            )
            .build()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let factor = ctx
            .scalar("value")
            .and_then(Value::as_float)
            .unwrap_or(self.value)
            .clamp(0.0, 1.0) as f32;
        map_pixels(ctx, |px| px[3] *= factor)
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "value").then(|| Value::Float(self.value))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), String> {
        match name {
            "value" => {
                self.value = expect_float(name, value)?;
                Ok(())
            }
            _ => Err(unknown_property(name)),
        }
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

const TABLE_SIZE: usize = 4096;

/// Lookup tables for the sRGB transfer curves over [0, 1].
///
/// Built once per registry and shared by every conversion instance.
#[derive(Debug)]
pub struct SrgbTables {
    to_linear: Vec<f32>,
    to_srgb: Vec<f32>,
}

impl SrgbTables {
    pub fn new() -> Self {
        let step = |i: usize| i as f32 / (TABLE_SIZE - 1) as f32;
        Self {
            to_linear: (0..TABLE_SIZE).map(|i| srgb_to_linear(step(i))).collect(),
            to_srgb: (0..TABLE_SIZE).map(|i| linear_to_srgb(step(i))).collect(),
        }
    }

    fn lookup(table: &[f32], v: f32) -> f32 {
        let pos = v.clamp(0.0, 1.0) * (TABLE_SIZE - 1) as f32;
        let i = pos.floor() as usize;
        if i + 1 >= TABLE_SIZE {
            return table[TABLE_SIZE - 1];
        }
        let t = pos - i as f32;
        table[i] + (table[i + 1] - table[i]) * t
    }

    /// Decode an sRGB-encoded component.
    pub fn to_linear(&self, v: f32) -> f32 {
        Self::lookup(&self.to_linear, v)
    }

    /// Encode a linear component as sRGB.
    pub fn to_srgb(&self, v: f32) -> f32 {
        Self::lookup(&self.to_srgb, v)
    }
}

impl Default for SrgbTables {
    fn default() -> Self {
        Self::new()
    }
}

fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Decodes sRGB-encoded color channels to linear light.
#[derive(Debug, Clone)]
pub struct SrgbToLinear {
    tables: Arc<SrgbTables>,
}

impl SrgbToLinear {
    pub fn new(tables: Arc<SrgbTables>) -> Self {
        Self { tables }
    }
}

impl Operation for SrgbToLinear {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("srgb_to_linear", "sRGB to Linear")
            .description("Decode sRGB-encoded channels to linear light")
            .category(Category::Color)
            .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
            .output(PadDefinition::pixel_output("output"))
            .tags(["gamma"])
            .build()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        map_pixels(ctx, |px| {
            for c in &mut px[..3] {
                *c = self.tables.to_linear(*c);
            }
        })
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

/// Encodes linear color channels as sRGB.
#[derive(Debug, Clone)]
pub struct LinearToSrgb {
    tables: Arc<SrgbTables>,
}

impl LinearToSrgb {
    pub fn new(tables: Arc<SrgbTables>) -> Self {
        Self { tables }
    }
}

impl Operation for LinearToSrgb {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("linear_to_srgb", "Linear to sRGB")
            .description("Encode linear channels with the sRGB curve")
            .category(Category::Color)
            .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
            .output(PadDefinition::pixel_output("output"))
            .tags(["gamma"])
            .build()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        map_pixels(ctx, |px| {
            for c in &mut px[..3] {
                *c = self.tables.to_srgb(*c);
            }
        })
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

/// Stretches color channels so the input's darkest component maps to 0 and
/// its brightest to 1.
///
/// Needs the whole input to find the range. An infinite input is measured
/// over the requested area only.
#[derive(Debug, Clone)]
pub struct StretchContrast;

impl Operation for StretchContrast {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("stretch_contrast", "Stretch Contrast")
            .description("Scale channels to use the full [0, 1] range")
            .category(Category::Color)
            .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
            .output(PadDefinition::pixel_output("output"))
            .tags(["levels", "normalize"])
            .build()
    }

    fn required_input_region(&self, _pad: &str, output: &Rectangle, ctx: &RegionContext) -> Rectangle {
        match ctx.source_bounding_box("input") {
            Some(bbox) if !bbox.is_infinite() => bbox,
            _ => *output,
        }
    }

    fn cached_region(&self, output: &Rectangle, ctx: &RegionContext) -> Rectangle {
        match ctx.source_bounding_box("input") {
            Some(bbox) if !bbox.is_infinite() => bbox,
            _ => *output,
        }
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let Some(input) = ctx.input("input") else {
            return ctx.allocate_output();
        };
        let all = input.get(&input.extent(), PixelFormat::RgbaF32);
        let (min, max) = all
            .chunks_exact(4)
            .flat_map(|px| px[..3].iter().copied())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let range = max - min;
        log::trace!("stretch_contrast {}: range [{}, {}]", ctx.node_id, min, max);

        map_pixels(ctx, |px| {
            if range > 1e-6 {
                for c in &mut px[..3] {
                    *c = (*c - min) / range;
                }
            }
        })
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}
