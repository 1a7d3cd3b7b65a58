//! Region and process contexts.
//!
//! Contexts give an operation read access to what the engine knows about its
//! inputs: their bounding boxes and negotiated formats while regions are
//! planned, and the input buffers themselves while it processes.

use crate::core::buffer::Buffer;
use crate::core::error::{ExecutionError, NodeId};
use crate::core::format::PixelFormat;
use crate::core::rect::Rectangle;
use crate::core::types::Value;
use std::collections::HashMap;

/// What the engine knows about one connected input pad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputInfo {
    /// Bounding box of the source feeding this pad.
    pub bounding_box: Rectangle,
    /// Format this pad will read, once negotiated.
    pub format: Option<PixelFormat>,
}

/// Context for the geometry and format methods of an operation.
#[derive(Debug, Clone)]
pub struct RegionContext {
    /// ID of the node being planned.
    pub node_id: NodeId,
    inputs: HashMap<String, InputInfo>,
}

impl RegionContext {
    /// Create a context with no connected inputs.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            inputs: HashMap::new(),
        }
    }

    /// Record a connected input.
    pub fn add_input(&mut self, pad: impl Into<String>, info: InputInfo) {
        self.inputs.insert(pad.into(), info);
    }

    /// Builder form of [`add_input`](Self::add_input).
    pub fn with_input(mut self, pad: impl Into<String>, bounding_box: Rectangle, format: Option<PixelFormat>) -> Self {
        self.add_input(pad, InputInfo { bounding_box, format });
        self
    }

    /// Whether the named input has a source.
    pub fn is_connected(&self, pad: &str) -> bool {
        self.inputs.contains_key(pad)
    }

    /// Bounding box of the source connected to `pad`.
    pub fn source_bounding_box(&self, pad: &str) -> Option<Rectangle> {
        self.inputs.get(pad).map(|i| i.bounding_box)
    }

    /// Negotiated format of `pad`.
    pub fn input_format(&self, pad: &str) -> Option<PixelFormat> {
        self.inputs.get(pad).and_then(|i| i.format)
    }

    /// Union of every connected input's bounding box.
    pub fn union_of_inputs(&self) -> Rectangle {
        self.inputs
            .values()
            .fold(Rectangle::empty(), |acc, i| acc.union(&i.bounding_box))
    }
}

/// Context provided to [`Operation::process`](crate::core::node::Operation::process).
///
/// Holds the input buffers delivered by upstream nodes, scalar inputs, and
/// the rectangle and format the output must cover.
pub struct ProcessContext<'a> {
    /// ID of the node being processed.
    pub node_id: NodeId,
    output_pad: String,
    output_rect: Rectangle,
    output_format: PixelFormat,
    region: &'a RegionContext,
    inputs: HashMap<String, Buffer>,
    scalars: HashMap<String, Value>,
}

impl<'a> ProcessContext<'a> {
    /// Create a context for producing `output_rect` on `output_pad`.
    pub fn new(
        region: &'a RegionContext,
        output_pad: impl Into<String>,
        output_rect: Rectangle,
        output_format: PixelFormat,
    ) -> Self {
        Self {
            node_id: region.node_id,
            output_pad: output_pad.into(),
            output_rect,
            output_format,
            region,
            inputs: HashMap::new(),
            scalars: HashMap::new(),
        }
    }

    /// Deliver a buffer to an input pad.
    pub fn add_input(&mut self, pad: impl Into<String>, buffer: Buffer) {
        self.inputs.insert(pad.into(), buffer);
    }

    /// Deliver a scalar to an input pad.
    pub fn add_scalar(&mut self, pad: impl Into<String>, value: Value) {
        self.scalars.insert(pad.into(), value);
    }

    /// The output pad being computed.
    pub fn output_pad(&self) -> &str {
        &self.output_pad
    }

    /// The rectangle the returned buffer must cover.
    pub fn output_rect(&self) -> Rectangle {
        self.output_rect
    }

    /// The format the output was declared in.
    pub fn output_format(&self) -> PixelFormat {
        self.output_format
    }

    /// Planning information for this node.
    pub fn region(&self) -> &RegionContext {
        self.region
    }

    /// Buffer delivered to `pad`, if the pad is connected and its source
    /// produced anything.
    pub fn input(&self, pad: &str) -> Option<&Buffer> {
        self.inputs.get(pad)
    }

    /// Buffer delivered to `pad`, or an operation failure.
    pub fn require_input(&self, pad: &str) -> Result<&Buffer, ExecutionError> {
        self.inputs
            .get(pad)
            .ok_or_else(|| self.fail(format!("input '{}' has no data", pad)))
    }

    /// Negotiated format for reading `pad`. Falls back to the output format.
    pub fn input_format(&self, pad: &str) -> PixelFormat {
        self.region.input_format(pad).unwrap_or(self.output_format)
    }

    /// Scalar delivered to `pad`.
    pub fn scalar(&self, pad: &str) -> Option<&Value> {
        self.scalars.get(pad)
    }

    /// Allocate a zeroed output buffer over the output rectangle.
    pub fn allocate_output(&self) -> Result<Buffer, ExecutionError> {
        Ok(Buffer::new(self.output_rect, self.output_format)?)
    }

    /// An operation failure attributed to this node.
    pub fn fail(&self, cause: impl Into<String>) -> ExecutionError {
        ExecutionError::operation(self.node_id, cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_context_queries() {
        let ctx = RegionContext::new(NodeId(1))
            .with_input("input", Rectangle::new(0, 0, 10, 10), Some(PixelFormat::RgbF32))
            .with_input("aux", Rectangle::new(5, 5, 10, 10), None);

        assert!(ctx.is_connected("input"));
        assert!(!ctx.is_connected("mask"));
        assert_eq!(ctx.input_format("input"), Some(PixelFormat::RgbF32));
        assert_eq!(ctx.union_of_inputs(), Rectangle::new(0, 0, 15, 15));
    }

    #[test]
    fn test_process_context_inputs() {
        let region = RegionContext::new(NodeId(2)).with_input(
            "input",
            Rectangle::new(0, 0, 4, 4),
            Some(PixelFormat::YF32),
        );
        let mut ctx = ProcessContext::new(&region, "output", Rectangle::new(0, 0, 2, 2), PixelFormat::RgbaF32);
        ctx.add_scalar("value", Value::Float(0.5));

        assert_eq!(ctx.input_format("input"), PixelFormat::YF32);
        assert_eq!(ctx.input_format("aux"), PixelFormat::RgbaF32);
        assert_eq!(ctx.scalar("value"), Some(&Value::Float(0.5)));
        assert!(ctx.input("input").is_none());

        let err = ctx.require_input("input").unwrap_err();
        assert_eq!(err.node_id(), Some(NodeId(2)));

        let out = ctx.allocate_output().unwrap();
        assert_eq!(out.extent(), Rectangle::new(0, 0, 2, 2));
    }
}
