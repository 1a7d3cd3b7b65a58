//! Value and pad types.
//!
//! Pads are typed with a closed [`PadType`]: either a stream of pixels or a
//! scalar value. Type compatibility is checked when a connection is made.

use crate::core::format::{FormatPolicy, Rgba};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Values
// ============================================================================

/// A scalar value carried by a property or a scalar pad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Color(Color),
    Vector2(f64, f64),
    None,
}

impl Value {
    /// The scalar kind of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Value::Integer(_) => ScalarKind::Integer,
            Value::Float(_) => ScalarKind::Float,
            Value::Boolean(_) => ScalarKind::Boolean,
            Value::String(_) => ScalarKind::String,
            Value::Color(_) => ScalarKind::Color,
            Value::Vector2(_, _) => ScalarKind::Vector2,
            Value::None => ScalarKind::Any,
        }
    }

    /// Try to get this value as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Try to get this value as a float.
    /// Integers are converted.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Try to get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Try to get this value as a color.
    pub fn as_color(&self) -> Option<Color> {
        if let Value::Color(c) = self {
            Some(*c)
        } else {
            None
        }
    }

    /// Try to get this value as a 2D vector.
    pub fn as_vector2(&self) -> Option<(f64, f64)> {
        if let Value::Vector2(x, y) = self {
            Some((*x, *y))
        } else {
            None
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Color(c) => write!(f, "{}", c.to_hex()),
            Value::Vector2(x, y) => write!(f, "({}, {})", x, y),
            Value::None => write!(f, "none"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Color> for Value {
    fn from(v: Color) -> Self {
        Value::Color(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

// ============================================================================
// Color
// ============================================================================

/// A straight-alpha linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Transparent black.
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
    /// Opaque black.
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);

    /// Create a color from components.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from RGB components.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse a hex color string.
    ///
    /// Supports formats: "#RGB", "#RGBA", "#RRGGBB", "#RRGGBBAA"
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim_start_matches('#');
        let digits = match hex.len() {
            3 | 4 => 1,
            6 | 8 => 2,
            n => {
                return Err(format!(
                    "Invalid hex color format: expected 3, 4, 6, or 8 characters, got {}",
                    n
                ))
            }
        };
        let scale = if digits == 1 { 15.0 } else { 255.0 };

        let mut channels = [1.0f32; 4];
        for (i, channel) in channels.iter_mut().enumerate().take(hex.len() / digits) {
            let part = hex
                .get(i * digits..(i + 1) * digits)
                .ok_or_else(|| format!("Invalid hex color '{}'", hex))?;
            let v = u8::from_str_radix(part, 16).map_err(|e| e.to_string())?;
            *channel = v as f32 / scale;
        }
        Ok(Self::new(channels[0], channels[1], channels[2], channels[3]))
    }

    /// Convert to a hex string, quantized to 8 bits per channel.
    pub fn to_hex(&self) -> String {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        if self.a >= 1.0 {
            format!("#{:02X}{:02X}{:02X}", q(self.r), q(self.g), q(self.b))
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", q(self.r), q(self.g), q(self.b), q(self.a))
        }
    }

    /// As a pixel.
    pub fn to_rgba(&self) -> Rgba {
        [self.r, self.g, self.b, self.a]
    }

    /// From a pixel.
    pub fn from_rgba(rgba: Rgba) -> Self {
        Self::new(rgba[0], rgba[1], rgba[2], rgba[3])
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::TRANSPARENT
    }
}

// ============================================================================
// Pad types
// ============================================================================

/// The kind of scalar carried by a scalar pad or property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Integer,
    Float,
    Boolean,
    String,
    Color,
    Vector2,
    /// Accepts any scalar
    Any,
}

impl ScalarKind {
    /// Whether a value of this kind can flow into a slot of kind `other`.
    pub fn compatible_with(&self, other: &ScalarKind) -> bool {
        match (self, other) {
            (ScalarKind::Any, _) | (_, ScalarKind::Any) => true,
            // Integer output can connect to Float input (implicit conversion)
            (ScalarKind::Integer, ScalarKind::Float) => true,
            (a, b) => a == b,
        }
    }

    /// Whether `value` is acceptable for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        value.kind().compatible_with(self)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Integer => "Integer",
            ScalarKind::Float => "Float",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::String => "String",
            ScalarKind::Color => "Color",
            ScalarKind::Vector2 => "Vector2",
            ScalarKind::Any => "Any",
        };
        f.write_str(name)
    }
}

/// The declared type of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "inner")]
pub enum PadType {
    /// Pixel data, with the format policy used when reading it.
    PixelStream(FormatPolicy),
    /// A single scalar value.
    Scalar(ScalarKind),
}

impl PadType {
    /// A pixel pad that takes any format.
    pub fn pixels() -> Self {
        PadType::PixelStream(FormatPolicy::Any)
    }

    /// Whether this is a pixel pad.
    pub fn is_pixel(&self) -> bool {
        matches!(self, PadType::PixelStream(_))
    }

    /// Whether an output of this type may feed an input of type `sink`.
    ///
    /// Pixel formats are not compared here; they are negotiated per request.
    pub fn compatible_with(&self, sink: &PadType) -> bool {
        match (self, sink) {
            (PadType::PixelStream(_), PadType::PixelStream(_)) => true,
            (PadType::Scalar(a), PadType::Scalar(b)) => a.compatible_with(b),
            _ => false,
        }
    }
}

impl fmt::Display for PadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadType::PixelStream(policy) => write!(f, "Pixels<{}>", policy),
            PadType::Scalar(kind) => write!(f, "{}", kind),
        }
    }
}
