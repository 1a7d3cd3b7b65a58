//! Pixel formats and format negotiation policies.
//!
//! All formats store `f32` components. Conversion between formats always goes
//! through straight (non-premultiplied) linear RGBA.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A straight-alpha linear RGBA pixel.
pub type Rgba = [f32; 4];

/// Rec. 709 luminance weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// The component layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Straight-alpha RGBA.
    RgbaF32,
    /// Premultiplied RGBA.
    RgbaPremulF32,
    /// Opaque RGB.
    RgbF32,
    /// Luminance with alpha.
    YaF32,
    /// Luminance.
    YF32,
}

impl PixelFormat {
    /// Every supported format.
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::RgbaF32,
        PixelFormat::RgbaPremulF32,
        PixelFormat::RgbF32,
        PixelFormat::YaF32,
        PixelFormat::YF32,
    ];

    /// Number of `f32` components per pixel.
    pub fn components(&self) -> usize {
        match self {
            PixelFormat::RgbaF32 | PixelFormat::RgbaPremulF32 => 4,
            PixelFormat::RgbF32 => 3,
            PixelFormat::YaF32 => 2,
            PixelFormat::YF32 => 1,
        }
    }

    /// Whether the format carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        matches!(
            self,
            PixelFormat::RgbaF32 | PixelFormat::RgbaPremulF32 | PixelFormat::YaF32
        )
    }

    /// Bytes per pixel as stored.
    pub fn bytes_per_pixel(&self) -> usize {
        self.components() * std::mem::size_of::<f32>()
    }

    /// Human-readable name, matching the usual babl naming.
    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::RgbaF32 => "RGBA float",
            PixelFormat::RgbaPremulF32 => "RaGaBaA float",
            PixelFormat::RgbF32 => "RGB float",
            PixelFormat::YaF32 => "YA float",
            PixelFormat::YF32 => "Y float",
        }
    }

    /// Look a format up by name.
    pub fn from_name(name: &str) -> Option<PixelFormat> {
        Self::ALL.iter().copied().find(|f| f.name().eq_ignore_ascii_case(name))
    }

    /// Decode one pixel of this format into straight RGBA.
    pub fn to_rgba(&self, pixel: &[f32]) -> Rgba {
        match self {
            PixelFormat::RgbaF32 => [pixel[0], pixel[1], pixel[2], pixel[3]],
            PixelFormat::RgbaPremulF32 => {
                let a = pixel[3];
                if a > f32::EPSILON {
                    [pixel[0] / a, pixel[1] / a, pixel[2] / a, a]
                } else {
                    [0.0, 0.0, 0.0, 0.0]
                }
            }
            PixelFormat::RgbF32 => [pixel[0], pixel[1], pixel[2], 1.0],
            PixelFormat::YaF32 => [pixel[0], pixel[0], pixel[0], pixel[1]],
            PixelFormat::YF32 => [pixel[0], pixel[0], pixel[0], 1.0],
        }
    }

    /// Encode a straight RGBA pixel into this format.
    ///
    /// `out` must hold exactly [`components`](Self::components) values.
    pub fn from_rgba(&self, rgba: Rgba, out: &mut [f32]) {
        match self {
            PixelFormat::RgbaF32 => out.copy_from_slice(&rgba),
            PixelFormat::RgbaPremulF32 => {
                let a = rgba[3];
                out.copy_from_slice(&[rgba[0] * a, rgba[1] * a, rgba[2] * a, a]);
            }
            PixelFormat::RgbF32 => out.copy_from_slice(&rgba[..3]),
            PixelFormat::YaF32 => {
                out[0] = luminance(rgba);
                out[1] = rgba[3];
            }
            PixelFormat::YF32 => out[0] = luminance(rgba),
        }
    }

    /// Convert a run of pixels from `self` into `target`.
    pub fn convert(&self, target: PixelFormat, pixels: &[f32]) -> Vec<f32> {
        if *self == target {
            return pixels.to_vec();
        }
        let src_n = self.components();
        let dst_n = target.components();
        let count = pixels.len() / src_n;
        let mut out = vec![0.0; count * dst_n];
        for (src, dst) in pixels.chunks_exact(src_n).zip(out.chunks_exact_mut(dst_n)) {
            target.from_rgba(self.to_rgba(src), dst);
        }
        out
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::RgbaF32
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn luminance(rgba: Rgba) -> f32 {
    rgba[0] * LUMA[0] + rgba[1] * LUMA[1] + rgba[2] * LUMA[2]
}

/// How an input pad accepts the format offered by its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatPolicy {
    /// Take whatever the source produces.
    Any,
    /// Read the source converted to this format.
    Convert(PixelFormat),
    /// Only this format is acceptable; no conversion.
    Exact(PixelFormat),
}

impl FormatPolicy {
    /// Agree on the format an input pad will read, given what the source offers.
    ///
    /// Returns `None` when no common format exists.
    pub fn negotiate(&self, offered: PixelFormat) -> Option<PixelFormat> {
        match self {
            FormatPolicy::Any => Some(offered),
            FormatPolicy::Convert(format) => Some(*format),
            FormatPolicy::Exact(format) if *format == offered => Some(offered),
            FormatPolicy::Exact(_) => None,
        }
    }
}

impl Default for FormatPolicy {
    fn default() -> Self {
        FormatPolicy::Any
    }
}

impl fmt::Display for FormatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatPolicy::Any => write!(f, "any"),
            FormatPolicy::Convert(format) => write!(f, "{}", format),
            FormatPolicy::Exact(format) => write!(f, "exactly {}", format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_premultiplied_conversion() {
        let straight = [0.5, 1.0, 0.25, 0.5];
        let premul = PixelFormat::RgbaF32.convert(PixelFormat::RgbaPremulF32, &straight);
        assert!(close(&premul, &[0.25, 0.5, 0.125, 0.5]));

        let back = PixelFormat::RgbaPremulF32.convert(PixelFormat::RgbaF32, &premul);
        assert!(close(&back, &straight));
    }

    #[test]
    fn test_luminance_conversion() {
        let white = [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let y = PixelFormat::RgbaF32.convert(PixelFormat::YF32, &white);
        assert!(close(&y, &[1.0, 0.0]));

        let rgba = PixelFormat::YaF32.to_rgba(&[0.3, 0.7]);
        assert!(close(&rgba, &[0.3, 0.3, 0.3, 0.7]));
    }

    #[test]
    fn test_rgb_gains_opaque_alpha() {
        assert_eq!(PixelFormat::RgbF32.to_rgba(&[0.1, 0.2, 0.3]), [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_format_names() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_name(format.name()), Some(format));
        }
        assert_eq!(PixelFormat::from_name("CMYK float"), None);
        assert_eq!(PixelFormat::RgbaPremulF32.bytes_per_pixel(), 16);
    }

    #[test]
    fn test_negotiate() {
        let offered = PixelFormat::RgbF32;
        assert_eq!(FormatPolicy::Any.negotiate(offered), Some(offered));
        assert_eq!(
            FormatPolicy::Convert(PixelFormat::YF32).negotiate(offered),
            Some(PixelFormat::YF32)
        );
        assert_eq!(FormatPolicy::Exact(PixelFormat::RgbF32).negotiate(offered), Some(offered));
        assert_eq!(FormatPolicy::Exact(PixelFormat::RgbaF32).negotiate(offered), None);
    }
}
