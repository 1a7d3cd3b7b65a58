//! The Operation trait and operation metadata.
//!
//! An [`Operation`] is the computation behind a node. The engine never looks
//! inside one; it only asks the five region and format questions and calls
//! `process` with the rectangle the request pass settled on.

use crate::core::buffer::Buffer;
use crate::core::context::{ProcessContext, RegionContext};
use crate::core::error::ExecutionError;
use crate::core::format::PixelFormat;
use crate::core::pad::{PadDefinition, PropertyDefinition};
use crate::core::rect::{Halo, Rectangle};
use crate::core::types::Value;
use serde::{Deserialize, Serialize};

/// Category for organizing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Pixel generators and loaders
    Source,
    /// Geometric changes (crop, translate)
    Transform,
    /// Color adjustments
    Color,
    /// Neighbourhood filters
    Blur,
    /// Two-input compositing
    Composite,
    /// Whole-image statistics
    Analyze,
    /// Plumbing
    Utility,
    /// Custom/user-defined
    Custom,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Source => "Source",
            Category::Transform => "Transform",
            Category::Color => "Color",
            Category::Blur => "Blur",
            Category::Composite => "Composite",
            Category::Analyze => "Analyze",
            Category::Utility => "Utility",
            Category::Custom => "Custom",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Custom
    }
}

/// Metadata describing an operation type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Unique identifier for this operation type (e.g., "box_blur")
    pub id: String,
    /// Human-readable name (e.g., "Box Blur")
    pub name: String,
    /// Category for organization
    pub category: Category,
    /// Detailed description
    pub description: String,
    /// Version string
    pub version: String,

    /// Input pad declarations
    pub inputs: Vec<PadDefinition>,
    /// Output pad declarations
    pub outputs: Vec<PadDefinition>,
    /// Property declarations
    pub properties: Vec<PropertyDefinition>,

    /// Searchable tags
    pub tags: Vec<String>,
}

impl OperationMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> OperationMetadataBuilder {
        OperationMetadataBuilder::new(id, name)
    }

    /// Find an input pad by name.
    pub fn get_input(&self, name: &str) -> Option<&PadDefinition> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Find an output pad by name.
    pub fn get_output(&self, name: &str) -> Option<&PadDefinition> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Find a property by name.
    pub fn get_property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Every pad, inputs first.
    pub fn pads(&self) -> impl Iterator<Item = &PadDefinition> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}

/// Builder for OperationMetadata.
pub struct OperationMetadataBuilder {
    metadata: OperationMetadata,
}

impl OperationMetadataBuilder {
    /// Create a new builder with required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: OperationMetadata {
                id: id.into(),
                name: name.into(),
                category: Category::Custom,
                description: String::new(),
                version: "1.0.0".to_string(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                properties: Vec::new(),
                tags: Vec::new(),
            },
        }
    }

    /// Set the category.
    pub fn category(mut self, category: Category) -> Self {
        self.metadata.category = category;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Set the version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = version.into();
        self
    }

    /// Add an input pad.
    pub fn input(mut self, pad: PadDefinition) -> Self {
        self.metadata.inputs.push(pad);
        self
    }

    /// Add an output pad.
    pub fn output(mut self, pad: PadDefinition) -> Self {
        self.metadata.outputs.push(pad);
        self
    }

    /// Add a property.
    pub fn property(mut self, property: PropertyDefinition) -> Self {
        self.metadata.properties.push(property);
        self
    }

    /// Add multiple tags.
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.metadata.tags.extend(tags.into_iter().map(|t| t.into()));
        self
    }

    /// Build the metadata.
    pub fn build(self) -> OperationMetadata {
        self.metadata
    }
}

/// The capability interface every node computation implements.
///
/// Only [`metadata`](Operation::metadata), [`process`](Operation::process)
/// and [`clone_box`](Operation::clone_box) are required. The defaults
/// describe a point filter reading a pad named `input`:
///
/// - the output format is whatever `input` was negotiated to,
/// - the bounding box is the bounding box of `input`,
/// - the required input region is the output grown by [`halo`](Operation::halo),
///   which is zero unless overridden,
/// - the cached region is exactly the output.
///
/// # Example Implementation
///
/// ```ignore
/// #[derive(Clone)]
/// struct Darken;
///
/// impl Operation for Darken {
///     fn metadata(&self) -> OperationMetadata {
///         OperationMetadata::builder("darken", "Darken")
///             .category(Category::Color)
///             .input(PadDefinition::pixel_input_as("input", PixelFormat::RgbaF32))
///             .output(PadDefinition::pixel_output("output"))
///             .build()
///     }
///
///     fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
///         let rect = ctx.output_rect();
///         let input = ctx.require_input("input")?;
///         let mut pixels = input.get(&rect, PixelFormat::RgbaF32);
///         pixels.iter_mut().for_each(|v| *v *= 0.5);
///         let out = ctx.allocate_output()?;
///         out.set(&rect, PixelFormat::RgbaF32, &pixels)?;
///         Ok(out)
///     }
///
///     fn clone_box(&self) -> Box<dyn Operation> {
///         Box::new(self.clone())
///     }
/// }
/// ```
pub trait Operation: Send + Sync {
    /// Pads, properties and descriptive data.
    ///
    /// Pads are instantiated from this once, when the node is constructed.
    fn metadata(&self) -> OperationMetadata;

    /// Extra margins read around every output pixel.
    fn halo(&self) -> Halo {
        Halo::zero()
    }

    /// Format produced on an output pad, given the negotiated input formats.
    fn output_format(&self, _pad: &str, ctx: &RegionContext) -> PixelFormat {
        ctx.input_format("input").unwrap_or_default()
    }

    /// The largest region this node can ever produce.
    fn bounding_box(&self, ctx: &RegionContext) -> Rectangle {
        ctx.source_bounding_box("input").unwrap_or_else(Rectangle::empty)
    }

    /// Region of `input_pad` needed to produce `output`.
    fn required_input_region(
        &self,
        _input_pad: &str,
        output: &Rectangle,
        _ctx: &RegionContext,
    ) -> Rectangle {
        output.grow(&self.halo())
    }

    /// Region that computing `output` actually produces.
    fn cached_region(&self, output: &Rectangle, _ctx: &RegionContext) -> Rectangle {
        *output
    }

    /// Compute the output pad named by the context over its output rectangle.
    ///
    /// The returned buffer must cover `ctx.output_rect()`.
    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError>;

    /// Compute a scalar output pad.
    fn compute_scalar(&self, pad: &str, ctx: &ProcessContext) -> Result<Value, ExecutionError> {
        Err(ctx.fail(format!("no scalar output '{}'", pad)))
    }

    /// Current value of a property.
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Change a property. The value has already been checked against the
    /// declared [`PropertyDefinition`].
    fn set_property(&mut self, name: &str, _value: &Value) -> Result<(), String> {
        Err(format!("property '{}' is read-only", name))
    }

    /// Clone this operation into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Operation>;
}

// Allow cloning Box<dyn Operation>
impl Clone for Box<dyn Operation> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// An operation that forwards its input unchanged.
#[derive(Debug, Clone, Default)]
pub struct Nop;

impl Operation for Nop {
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::builder("nop", "Nop")
            .category(Category::Utility)
            .description("Passes the input through unchanged")
            .input(PadDefinition::pixel_input("input"))
            .output(PadDefinition::pixel_output("output"))
            .build()
    }

    fn process(&self, ctx: &ProcessContext) -> Result<Buffer, ExecutionError> {
        let input = ctx.require_input("input")?;
        Ok(input.sub_view(&ctx.output_rect()))
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;
    use crate::core::types::ScalarKind;

    #[test]
    fn test_metadata_builder() {
        let metadata = OperationMetadata::builder("test_op", "Test Op")
            .category(Category::Utility)
            .description("A test operation")
            .input(PadDefinition::pixel_input("input"))
            .input(PadDefinition::scalar_input("amount", ScalarKind::Float).optional())
            .output(PadDefinition::pixel_output("output"))
            .tags(["test", "debug"])
            .build();

        assert_eq!(metadata.id, "test_op");
        assert_eq!(metadata.category, Category::Utility);
        assert_eq!(metadata.inputs.len(), 2);
        assert_eq!(metadata.pads().count(), 3);
        assert!(metadata.get_input("amount").unwrap().optional);
        assert!(metadata.get_output("input").is_none());
    }

    #[test]
    fn test_point_filter_defaults() {
        let op = Nop;
        let ctx = RegionContext::new(NodeId(1)).with_input(
            "input",
            Rectangle::new(0, 0, 50, 50),
            Some(PixelFormat::YF32),
        );
        let r = Rectangle::new(3, 4, 5, 6);

        assert_eq!(op.required_input_region("input", &r, &ctx), r);
        assert_eq!(op.cached_region(&r, &ctx), r);
        assert_eq!(op.bounding_box(&ctx), Rectangle::new(0, 0, 50, 50));
        assert_eq!(op.output_format("output", &ctx), PixelFormat::YF32);
    }

    #[test]
    fn test_nop_forwards_view() {
        let op = Nop;
        let region = RegionContext::new(NodeId(1));
        let source = Buffer::new(Rectangle::new(0, 0, 10, 10), PixelFormat::RgbaF32).unwrap();
        let mut ctx = ProcessContext::new(&region, "output", Rectangle::new(2, 2, 4, 4), PixelFormat::RgbaF32);
        ctx.add_input("input", source.clone());

        let out = op.process(&ctx).unwrap();
        assert!(out.shares_storage(&source));
        assert_eq!(out.extent(), Rectangle::new(2, 2, 4, 4));
    }

    #[test]
    fn test_unconnected_bounding_box_is_empty() {
        let ctx = RegionContext::new(NodeId(1));
        assert!(Nop.bounding_box(&ctx).is_empty());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(Category::Blur.display_name(), "Blur");
        assert_eq!(Category::Source.display_name(), "Source");
    }
}
