//! Pad and property definitions.
//!
//! An operation declares its pads up front; a node instantiates one pad per
//! declaration when it is constructed. Properties are the operation's
//! non-connectable settings, validated through [`Constraint`]s.

use crate::core::format::{FormatPolicy, PixelFormat};
use crate::core::types::{PadType, ScalarKind, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a pad (input or output).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PadDirection {
    Input,
    Output,
}

impl fmt::Display for PadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadDirection::Input => write!(f, "input"),
            PadDirection::Output => write!(f, "output"),
        }
    }
}

/// Declaration of an operation pad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadDefinition {
    /// Unique name within the node
    pub name: String,
    /// Type of data this pad carries
    pub pad_type: PadType,
    /// Direction (input or output)
    pub direction: PadDirection,
    /// Whether the operation can run with this input unconnected
    pub optional: bool,
    /// Description for documentation
    pub description: String,
}

impl PadDefinition {
    /// Create an input pad definition.
    pub fn input(name: impl Into<String>, pad_type: PadType) -> Self {
        Self {
            name: name.into(),
            pad_type,
            direction: PadDirection::Input,
            optional: false,
            description: String::new(),
        }
    }

    /// Create an output pad definition.
    pub fn output(name: impl Into<String>, pad_type: PadType) -> Self {
        Self {
            name: name.into(),
            pad_type,
            direction: PadDirection::Output,
            optional: false,
            description: String::new(),
        }
    }

    /// A pixel input that accepts any format.
    pub fn pixel_input(name: impl Into<String>) -> Self {
        Self::input(name, PadType::pixels())
    }

    /// A pixel input read in a fixed format.
    pub fn pixel_input_as(name: impl Into<String>, format: PixelFormat) -> Self {
        Self::input(name, PadType::PixelStream(FormatPolicy::Convert(format)))
    }

    /// A pixel output.
    pub fn pixel_output(name: impl Into<String>) -> Self {
        Self::output(name, PadType::pixels())
    }

    /// A scalar input.
    pub fn scalar_input(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::input(name, PadType::Scalar(kind))
    }

    /// A scalar output.
    pub fn scalar_output(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::output(name, PadType::Scalar(kind))
    }

    /// Mark as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Constraints that can be applied to property values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Constraint {
    /// Numeric value must be within range [min, max]
    Range { min: f64, max: f64 },
    /// Numeric value must be >= min
    MinValue(f64),
    /// Numeric value must be <= max
    MaxValue(f64),
    /// String must not be empty
    NotEmpty,
    /// Value must be one of the specified options
    OneOf(Vec<Value>),
}

impl Constraint {
    /// Check a value against this constraint.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            Constraint::Range { min, max } => match value.as_float() {
                Some(v) if v >= *min && v <= *max => Ok(()),
                Some(v) => Err(format!("{} is outside [{}, {}]", v, min, max)),
                None => Ok(()),
            },
            Constraint::MinValue(min) => match value.as_float() {
                Some(v) if v < *min => Err(format!("{} is less than {}", v, min)),
                _ => Ok(()),
            },
            Constraint::MaxValue(max) => match value.as_float() {
                Some(v) if v > *max => Err(format!("{} is greater than {}", v, max)),
                _ => Ok(()),
            },
            Constraint::NotEmpty => match value.as_str() {
                Some("") => Err("value must not be empty".to_string()),
                _ => Ok(()),
            },
            Constraint::OneOf(options) => {
                if options.contains(value) {
                    Ok(())
                } else {
                    Err(format!("{} is not one of the allowed options", value))
                }
            }
        }
    }
}

/// Declaration of an operation property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Unique name within the operation
    pub name: String,
    /// Kind of value accepted
    pub kind: ScalarKind,
    /// Value used by a freshly created operation
    pub default_value: Value,
    /// Description for documentation
    pub description: String,
    /// Constraints for validation
    pub constraints: Vec<Constraint>,
}

impl PropertyDefinition {
    /// Create a new property definition.
    pub fn new(name: impl Into<String>, kind: ScalarKind, default_value: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default_value,
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Add a range constraint.
    pub fn with_range(self, min: f64, max: f64) -> Self {
        self.with_constraint(Constraint::Range { min, max })
    }

    /// Validate a candidate value.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if !self.kind.accepts(value) {
            return Err(format!(
                "Type mismatch for property '{}': expected {}, got {}",
                self.name,
                self.kind,
                value.kind()
            ));
        }

        for constraint in &self.constraints {
            constraint.validate(value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_builders() {
        let input = PadDefinition::pixel_input("aux").optional();
        assert_eq!(input.direction, PadDirection::Input);
        assert!(input.optional);
        assert!(input.pad_type.is_pixel());

        let output = PadDefinition::scalar_output("mean", ScalarKind::Float);
        assert_eq!(output.direction, PadDirection::Output);
        assert_eq!(output.pad_type, PadType::Scalar(ScalarKind::Float));

        let converted = PadDefinition::pixel_input_as("input", PixelFormat::RgbaPremulF32);
        assert_eq!(
            converted.pad_type,
            PadType::PixelStream(FormatPolicy::Convert(PixelFormat::RgbaPremulF32))
        );
    }

    #[test]
    fn test_range_constraint() {
        let c = Constraint::Range { min: 0.0, max: 10.0 };
        assert!(c.validate(&Value::Float(5.0)).is_ok());
        assert!(c.validate(&Value::Integer(10)).is_ok());
        assert!(c.validate(&Value::Float(10.5)).is_err());
    }

    #[test]
    fn test_property_validation() {
        let radius = PropertyDefinition::new("radius", ScalarKind::Float, Value::Float(1.0))
            .with_range(0.0, 100.0);

        assert!(radius.validate(&Value::Float(3.5)).is_ok());
        assert!(radius.validate(&Value::Integer(3)).is_ok());
        assert!(radius.validate(&Value::Float(-1.0)).is_err());
        assert!(radius.validate(&Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_one_of() {
        let c = Constraint::OneOf(vec![Value::from("clamp"), Value::from("none")]);
        assert!(c.validate(&Value::from("clamp")).is_ok());
        assert!(c.validate(&Value::from("wrap")).is_err());
    }
}
