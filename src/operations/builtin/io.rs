//! Image file input.

use super::unknown_property;
use crate::core::buffer::Buffer;
use crate::core::context::{ProcessContext, RegionContext};
use crate::core::error::ExecutionError;
use crate::core::format::PixelFormat;
use crate::core::node::{Category, Operation, OperationMetadata};
use crate::core::pad::{Constraint, PadDefinition, PropertyDefinition};
use crate::core::rect::Rectangle;
use crate::core::types::{ScalarKind, Value};
use crate::operations::registry::OperationRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

/// Register I/O operations.
pub fn register(registry: &mut OperationRegistry) {
    registry.register(|| Box::new(LoadImage::default()));
}

/// Decodes an image file with its top-left pixel at the origin.
///
/// The file is decoded on first use and kept until `path` changes.
#[derive(Debug, Clone, Default)]
pub struct LoadImage {
    path: String,
    decoded: Arc<Mutex<Option<Buffer>>>,
}

impl LoadImage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            decoded: Arc::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn load(&self) -> Result<Buffer, String> {
        let mut decoded = self.decoded.lock();
        if let Some(buffer) = decoded.as_ref() {
            return Ok(buffer.clone());
        }
        if self.path.is_empty() {
            return Err("no path set".to_string());
        }
        let image = image::open(&self.path).map_err(|e| format!("{}: {}", self.path, e))?;
        let buffer = Buffer::from_image(&image, 0, 0).map_err(|e| e.to_string())?;
        log::debug!("Decoded {} ({})", self.path, buffer.extent());
        *decoded = Some(buffer.clone());
        Ok(buffer)
    }
}

impl Operation for LoadImage {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("load_image", "Load Image")
            .description("Read pixels from an image file")
            .category(Category::Source)
            .output(PadDefinition::pixel_output("output"))
            .property(
                PropertyDefinition::new("path", ScalarKind::String, Value::String(String::new()))
                    .with_description("File to decode")
                    .with_constraint(Constraint::NotEmpty),
            )
            .tags(["file", "png", "jpeg"])
            .build()
    }

    fn output_format(&self, _pad: &str, _ctx: &RegionContext) -> PixelFormat {
        PixelFormat::RgbaF32
    }

    fn bounding_box(&self, _ctx: &RegionContext) -> Rectangle {
        match self.load() {
            Ok(buffer) => buffer.extent(),
            Err(e) => {
                log::warn!("load_image has no pixels: {}", e);
                Rectangle::empty()
            }
        }
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let buffer = self.load().map_err(|e| ctx.fail(e))?;
        Ok(buffer.reframe(&ctx.output_rect()))
    }

    fn property(&self, name: &str) -> Option<Value> {
        (name == "path").then(|| Value::String(self.path.clone()))
    }

    fn set_property(&mut self, name: &str, value: &Value) -> Result<(), String> {
        match name {
            "path" => {
                let path = value
                    .as_str()
                    .ok_or_else(|| format!("'path' expects a string, got {}", value))?;
                if path != self.path {
                    self.path = path.to_string();
                    // Instances cloned before the change keep the old pixels
                    self.decoded = Arc::default();
                }
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
    use crate::core::error::NodeId;

    #[test]
    fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        let mut img = image::RgbaImage::new(3, 2);
        for p in img.pixels_mut() {
            *p = image::Rgba([255, 0, 0, 255]);
        }
        img.save(&path).unwrap();

        let op = LoadImage::new(path.to_string_lossy());
        let region = RegionContext::new(NodeId(1));
        assert_eq!(op.bounding_box(&region), Rectangle::new(0, 0, 3, 2));

        let ctx = ProcessContext::new(&region, "output", Rectangle::new(1, 1, 2, 1), PixelFormat::RgbaF32);
        let out = op.process(&ctx).unwrap();
        assert_eq!(out.extent(), Rectangle::new(1, 1, 2, 1));
        let [r, g, _, a] = out.pixel(2, 1).unwrap();
        assert!((r - 1.0).abs() < 1e-6 && g == 0.0 && (a - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file() {
        let op = LoadImage::new("/nonexistent/ambit.png");
        let region = RegionContext::new(NodeId(4));
        assert!(op.bounding_box(&region).is_empty());

        let ctx = ProcessContext::new(&region, "output", Rectangle::new(0, 0, 1, 1), PixelFormat::RgbaF32);
        let err = op.process(&ctx).unwrap_err();
        assert_eq!(err.node_id(), Some(NodeId(4)));
    }

    #[test]
    fn test_path_property() {
        let mut op = LoadImage::default();
        op.set_property("path", &Value::String("a.png".into())).unwrap();
        assert_eq!(op.property("path"), Some(Value::String("a.png".into())));
        assert!(op.set_property("path", &Value::Integer(1)).is_err());
    }
}
