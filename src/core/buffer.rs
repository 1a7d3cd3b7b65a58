//! Windowed pixel buffers.
//!
//! A [`Buffer`] is a view onto shared pixel storage addressed in absolute
//! coordinates. Cloning a buffer or taking a [`sub_view`](Buffer::sub_view)
//! shares the storage; nothing is copied. Reads outside the stored area
//! follow an [`AbyssPolicy`].

use crate::core::error::BufferError;
use crate::core::format::{PixelFormat, Rgba};
use crate::core::rect::Rectangle;
use crate::core::types::Color;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What to read outside the area a buffer actually stores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "color", rename_all = "lowercase")]
pub enum AbyssPolicy {
    /// Transparent black.
    None,
    /// Repeat the nearest edge pixel.
    Clamp,
    /// Tile the stored area.
    Wrap,
    /// A constant color.
    Color(Color),
}

impl Default for AbyssPolicy {
    fn default() -> Self {
        AbyssPolicy::None
    }
}

/// Reconstruction kernel used by [`Buffer::sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest pixel.
    Nearest,
    /// Bilinear.
    Linear,
    /// Catmull-Rom bicubic.
    Cubic,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Linear
    }
}

struct Storage {
    extent: Rectangle,
    format: PixelFormat,
    data: Vec<f32>,
}

impl Storage {
    fn offset(&self, x: i32, y: i32) -> usize {
        let n = self.format.components();
        let row = (y - self.extent.y) as usize * self.extent.width as usize;
        (row + (x - self.extent.x) as usize) * n
    }

    fn rgba_at(&self, x: i32, y: i32) -> Rgba {
        let n = self.format.components();
        let i = self.offset(x, y);
        self.format.to_rgba(&self.data[i..i + n])
    }
}

/// A rectangular window onto shared pixel storage.
#[derive(Clone)]
pub struct Buffer {
    storage: Arc<RwLock<Storage>>,
    view: Rectangle,
}

impl Buffer {
    /// Allocate a zeroed buffer.
    pub fn new(extent: Rectangle, format: PixelFormat) -> Result<Self, BufferError> {
        if extent.is_infinite() {
            return Err(BufferError::InfiniteExtent);
        }
        let len = extent.area() as usize * format.components();
        Ok(Self::from_storage(Storage {
            extent,
            format,
            data: vec![0.0; len],
        }))
    }

    /// A buffer covering nothing.
    pub fn empty(format: PixelFormat) -> Self {
        Self::from_storage(Storage {
            extent: Rectangle::empty(),
            format,
            data: Vec::new(),
        })
    }

    /// Allocate a buffer filled with one color.
    pub fn filled(extent: Rectangle, format: PixelFormat, color: Color) -> Result<Self, BufferError> {
        let buffer = Self::new(extent, format)?;
        {
            let mut storage = buffer.storage.write();
            let n = format.components();
            let mut pixel = vec![0.0; n];
            format.from_rgba(color.to_rgba(), &mut pixel);
            for chunk in storage.data.chunks_exact_mut(n) {
                chunk.copy_from_slice(&pixel);
            }
        }
        Ok(buffer)
    }

    /// Wrap existing pixel data laid out row-major in `format`.
    pub fn from_pixels(
        extent: Rectangle,
        format: PixelFormat,
        data: Vec<f32>,
    ) -> Result<Self, BufferError> {
        if extent.is_infinite() {
            return Err(BufferError::InfiniteExtent);
        }
        let expected = extent.area() as usize * format.components();
        if data.len() != expected {
            return Err(BufferError::SizeMismatch {
                rect: extent.to_string(),
                expected,
                got: data.len(),
            });
        }
        Ok(Self::from_storage(Storage {
            extent,
            format,
            data,
        }))
    }

    fn from_storage(storage: Storage) -> Self {
        let view = storage.extent;
        Self {
            storage: Arc::new(RwLock::new(storage)),
            view,
        }
    }

    /// The rectangle this buffer presents.
    pub fn extent(&self) -> Rectangle {
        self.view
    }

    /// The storage format.
    pub fn format(&self) -> PixelFormat {
        self.storage.read().format
    }

    /// The area that is backed by stored pixels.
    pub fn valid_area(&self) -> Rectangle {
        self.view.intersect(&self.storage.read().extent)
    }

    /// Whether two buffers view the same storage.
    pub fn shares_storage(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Approximate memory held by the storage, in bytes.
    pub fn memory_size(&self) -> usize {
        self.storage.read().data.len() * std::mem::size_of::<f32>()
    }

    /// A view of `rect` within this buffer, sharing storage.
    pub fn sub_view(&self, rect: &Rectangle) -> Buffer {
        Buffer {
            storage: Arc::clone(&self.storage),
            view: self.view.intersect(rect),
        }
    }

    /// The same storage presented over `rect`, which may extend past the
    /// stored area.
    pub fn reframe(&self, rect: &Rectangle) -> Buffer {
        Buffer {
            storage: Arc::clone(&self.storage),
            view: *rect,
        }
    }

    /// Deep copy of the visible area into fresh storage.
    pub fn duplicate(&self) -> Result<Buffer, BufferError> {
        let format = self.format();
        let data = self.get(&self.view, format);
        Buffer::from_pixels(self.view, format, data)
    }

    /// One pixel as straight RGBA, if it lies in the stored area.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        if !self.valid_area().contains_point(x, y) {
            return None;
        }
        Some(self.storage.read().rgba_at(x, y))
    }

    /// Read `rect` in `format`, with transparent abyss.
    pub fn get(&self, rect: &Rectangle, format: PixelFormat) -> Vec<f32> {
        self.get_with_abyss(rect, format, AbyssPolicy::None)
    }

    /// Read `rect` in `format`. Pixels outside the stored area follow `abyss`.
    ///
    /// An infinite rectangle reads nothing.
    pub fn get_with_abyss(&self, rect: &Rectangle, format: PixelFormat, abyss: AbyssPolicy) -> Vec<f32> {
        if rect.is_infinite() || rect.is_empty() {
            return Vec::new();
        }
        let storage = self.storage.read();
        let valid = self.view.intersect(&storage.extent);
        let dst_n = format.components();
        let width = rect.width as usize;
        let mut out = vec![0.0; rect.area() as usize * dst_n];

        // Rows fully inside the stored area convert in one pass.
        let span = rect.intersect(&valid);
        let whole_rows = !span.is_empty() && span.x == rect.x && span.width == rect.width;

        let mut abyss_pixel = vec![0.0; dst_n];
        if let AbyssPolicy::Color(color) = abyss {
            format.from_rgba(color.to_rgba(), &mut abyss_pixel);
        } else {
            format.from_rgba([0.0; 4], &mut abyss_pixel);
        }

        for (row, out_row) in out.chunks_exact_mut(width * dst_n).enumerate() {
            let y = rect.y + row as i32;
            if whole_rows && y >= span.y && (y as i64) < span.bottom() {
                let start = storage.offset(rect.x, y);
                let end = start + width * storage.format.components();
                let converted = storage.format.convert(format, &storage.data[start..end]);
                out_row.copy_from_slice(&converted);
                continue;
            }
            for (col, dst) in out_row.chunks_exact_mut(dst_n).enumerate() {
                let x = rect.x + col as i32;
                match resolve(x, y, &valid, abyss) {
                    Some((sx, sy)) => format.from_rgba(storage.rgba_at(sx, sy), dst),
                    None => dst.copy_from_slice(&abyss_pixel),
                }
            }
        }
        out
    }

    /// Write `pixels` (row-major, in `format`) over `rect`.
    ///
    /// Pixels falling outside the stored area are dropped.
    pub fn set(&self, rect: &Rectangle, format: PixelFormat, pixels: &[f32]) -> Result<(), BufferError> {
        if rect.is_infinite() {
            return Err(BufferError::InfiniteExtent);
        }
        let src_n = format.components();
        let expected = rect.area() as usize * src_n;
        if pixels.len() != expected {
            return Err(BufferError::SizeMismatch {
                rect: rect.to_string(),
                expected,
                got: pixels.len(),
            });
        }

        let mut storage = self.storage.write();
        let target = rect.intersect(&self.view.intersect(&storage.extent));
        if target.is_empty() {
            return Ok(());
        }
        let dst_format = storage.format;
        let dst_n = dst_format.components();
        let width = rect.width as usize;

        for y in target.y..(target.bottom() as i32) {
            let src_row = (y - rect.y) as usize * width;
            let src_start = (src_row + (target.x - rect.x) as usize) * src_n;
            let src = &pixels[src_start..src_start + target.width as usize * src_n];
            let converted = format.convert(dst_format, src);
            let dst_start = storage.offset(target.x, y);
            storage.data[dst_start..dst_start + target.width as usize * dst_n]
                .copy_from_slice(&converted);
        }
        Ok(())
    }

    /// Sample at a sub-pixel position, with transparent abyss.
    ///
    /// Pixel centers lie at half-integer coordinates.
    pub fn sample(&self, x: f64, y: f64, interpolation: Interpolation) -> Rgba {
        self.sample_with_abyss(x, y, interpolation, AbyssPolicy::None)
    }

    /// Sample at a sub-pixel position.
    ///
    /// Filtering happens on premultiplied values so transparent neighbours do
    /// not bleed their color.
    pub fn sample_with_abyss(
        &self,
        x: f64,
        y: f64,
        interpolation: Interpolation,
        abyss: AbyssPolicy,
    ) -> Rgba {
        let storage = self.storage.read();
        let valid = self.view.intersect(&storage.extent);
        let fetch = |ix: i32, iy: i32| -> Rgba {
            let rgba = match resolve(ix, iy, &valid, abyss) {
                Some((sx, sy)) => storage.rgba_at(sx, sy),
                None => match abyss {
                    AbyssPolicy::Color(c) => c.to_rgba(),
                    _ => [0.0; 4],
                },
            };
            premultiply(rgba)
        };

        let result = match interpolation {
            Interpolation::Nearest => fetch(x.floor() as i32, y.floor() as i32),
            Interpolation::Linear => {
                let u = x - 0.5;
                let v = y - 0.5;
                let x0 = u.floor();
                let y0 = v.floor();
                let fx = (u - x0) as f32;
                let fy = (v - y0) as f32;
                let (x0, y0) = (x0 as i32, y0 as i32);
                let mut acc = [0.0f32; 4];
                for (dx, dy, w) in [
                    (0, 0, (1.0 - fx) * (1.0 - fy)),
                    (1, 0, fx * (1.0 - fy)),
                    (0, 1, (1.0 - fx) * fy),
                    (1, 1, fx * fy),
                ] {
                    accumulate(&mut acc, fetch(x0.saturating_add(dx), y0.saturating_add(dy)), w);
                }
                acc
            }
            Interpolation::Cubic => {
                let u = x - 0.5;
                let v = y - 0.5;
                let x0 = u.floor();
                let y0 = v.floor();
                let wx = catmull_rom_weights((u - x0) as f32);
                let wy = catmull_rom_weights((v - y0) as f32);
                let (x0, y0) = (x0 as i32, y0 as i32);
                let mut acc = [0.0f32; 4];
                for (j, wyj) in wy.iter().enumerate() {
                    for (i, wxi) in wx.iter().enumerate() {
                        let p = fetch(x0.saturating_add(i as i32 - 1), y0.saturating_add(j as i32 - 1));
                        accumulate(&mut acc, p, wxi * wyj);
                    }
                }
                acc
            }
        };
        unpremultiply(result)
    }

    /// Build a buffer from an 8-bit image placed at `(x, y)`.
    pub fn from_image(image: &image::DynamicImage, x: i32, y: i32) -> Result<Buffer, BufferError> {
        let rgba = image.to_rgba8();
        let extent = Rectangle::new(x, y, rgba.width() as i32, rgba.height() as i32);
        let data = rgba.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Buffer::from_pixels(extent, PixelFormat::RgbaF32, data)
    }

    /// Quantize the visible area to an 8-bit RGBA image.
    pub fn to_rgba8(&self) -> image::RgbaImage {
        let rect = self.view;
        let width = if rect.is_infinite() { 0 } else { rect.width.max(0) as u32 };
        let height = if rect.is_infinite() { 0 } else { rect.height.max(0) as u32 };
        let data = self.get(&rect, PixelFormat::RgbaF32);
        let bytes: Vec<u8> = data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        image::RgbaImage::from_raw(width, height, bytes)
            .unwrap_or_else(|| image::RgbaImage::new(width, height))
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.storage.read();
        f.debug_struct("Buffer")
            .field("view", &self.view)
            .field("storage_extent", &storage.extent)
            .field("format", &storage.format)
            .finish()
    }
}

/// Map `(x, y)` to a stored coordinate according to `abyss`, or `None` when
/// the abyss value itself should be used.
fn resolve(x: i32, y: i32, valid: &Rectangle, abyss: AbyssPolicy) -> Option<(i32, i32)> {
    if valid.contains_point(x, y) {
        return Some((x, y));
    }
    if valid.is_empty() {
        return None;
    }
    let right = (valid.right() - 1) as i32;
    let bottom = (valid.bottom() - 1) as i32;
    match abyss {
        AbyssPolicy::Clamp => Some((x.clamp(valid.x, right), y.clamp(valid.y, bottom))),
        AbyssPolicy::Wrap => Some((wrap(x, valid.x, valid.width), wrap(y, valid.y, valid.height))),
        AbyssPolicy::None | AbyssPolicy::Color(_) => None,
    }
}

/// `v` folded into `[origin, origin + len)`.
fn wrap(v: i32, origin: i32, len: i32) -> i32 {
    let offset = (i64::from(v) - i64::from(origin)).rem_euclid(i64::from(len));
    (i64::from(origin) + offset) as i32
}

fn premultiply(p: Rgba) -> Rgba {
    [p[0] * p[3], p[1] * p[3], p[2] * p[3], p[3]]
}

fn unpremultiply(p: Rgba) -> Rgba {
    if p[3] > f32::EPSILON {
        [p[0] / p[3], p[1] / p[3], p[2] / p[3], p[3]]
    } else {
        [0.0; 4]
    }
}

fn accumulate(acc: &mut Rgba, p: Rgba, w: f32) {
    for (a, v) in acc.iter_mut().zip(p) {
        *a += v * w;
    }
}

fn catmull_rom_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(extent: Rectangle) -> Buffer {
        let mut data = Vec::new();
        for y in extent.y..extent.y + extent.height {
            for x in extent.x..extent.x + extent.width {
                data.extend_from_slice(&[x as f32, y as f32, 0.0, 1.0]);
            }
        }
        Buffer::from_pixels(extent, PixelFormat::RgbaF32, data).unwrap()
    }

    #[test]
    fn test_get_inside() {
        let buffer = gradient(Rectangle::new(0, 0, 4, 4));
        let pixels = buffer.get(&Rectangle::new(1, 2, 2, 1), PixelFormat::RgbaF32);
        assert_eq!(pixels, vec![1.0, 2.0, 0.0, 1.0, 2.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_get_converts_format() {
        let buffer = Buffer::filled(Rectangle::new(0, 0, 2, 1), PixelFormat::RgbaF32, Color::new(1.0, 1.0, 1.0, 0.5)).unwrap();
        let premul = buffer.get(&buffer.extent(), PixelFormat::RgbaPremulF32);
        assert_eq!(premul, vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_abyss_policies() {
        let buffer = gradient(Rectangle::new(0, 0, 2, 2));
        let outside = Rectangle::new(-1, 0, 1, 1);

        assert_eq!(buffer.get(&outside, PixelFormat::RgbaF32), vec![0.0; 4]);
        assert_eq!(
            buffer.get_with_abyss(&outside, PixelFormat::RgbaF32, AbyssPolicy::Clamp),
            vec![0.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(
            buffer.get_with_abyss(&outside, PixelFormat::RgbaF32, AbyssPolicy::Wrap),
            vec![1.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(
            buffer.get_with_abyss(&outside, PixelFormat::RgbaF32, AbyssPolicy::Color(Color::WHITE)),
            vec![1.0, 1.0, 1.0, 1.0]
        );
    }

    #[test]
    fn test_wrap_far_outside() {
        let buffer = gradient(Rectangle::new(0, 0, 2, 2));
        for interpolation in [Interpolation::Nearest, Interpolation::Linear, Interpolation::Cubic] {
            for (x, y) in [(1e12, 0.5), (-1e12, 0.5), (0.5, f64::MAX), (f64::MIN, f64::MIN)] {
                let p = buffer.sample_with_abyss(x, y, interpolation, AbyssPolicy::Wrap);
                assert!(p.iter().all(|c| c.is_finite()), "{:?} at ({}, {})", interpolation, x, y);
            }
        }
        let corner = Rectangle::new(i32::MIN + 1, i32::MAX - 1, 1, 1);
        let wrapped = buffer.get_with_abyss(&corner, PixelFormat::RgbaF32, AbyssPolicy::Wrap);
        assert_eq!(wrapped.len(), 4);
    }

    #[test]
    fn test_set_and_get() {
        let buffer = Buffer::new(Rectangle::new(10, 10, 3, 3), PixelFormat::YF32).unwrap();
        buffer
            .set(&Rectangle::new(11, 11, 1, 1), PixelFormat::RgbaF32, &[1.0, 1.0, 1.0, 1.0])
            .unwrap();
        let y = buffer.get(&Rectangle::new(10, 11, 3, 1), PixelFormat::YF32);
        assert!((y[1] - 1.0).abs() < 1e-5);
        assert_eq!(y[0], 0.0);
        assert_eq!(y[2], 0.0);
    }

    #[test]
    fn test_set_rejects_wrong_length() {
        let buffer = Buffer::new(Rectangle::new(0, 0, 2, 2), PixelFormat::RgbaF32).unwrap();
        let err = buffer.set(&Rectangle::new(0, 0, 2, 2), PixelFormat::RgbaF32, &[0.0; 3]);
        assert!(matches!(err, Err(BufferError::SizeMismatch { expected: 16, got: 3, .. })));
    }

    #[test]
    fn test_set_clips_to_storage() {
        let buffer = Buffer::new(Rectangle::new(0, 0, 2, 1), PixelFormat::YF32).unwrap();
        buffer
            .set(&Rectangle::new(1, 0, 2, 1), PixelFormat::YF32, &[0.25, 0.75])
            .unwrap();
        assert_eq!(buffer.get(&buffer.extent(), PixelFormat::YF32), vec![0.0, 0.25]);
    }

    #[test]
    fn test_sub_view_shares_storage() {
        let buffer = gradient(Rectangle::new(0, 0, 8, 8));
        let view = buffer.sub_view(&Rectangle::new(2, 2, 3, 3));

        assert!(view.shares_storage(&buffer));
        assert_eq!(view.extent(), Rectangle::new(2, 2, 3, 3));

        view.set(&Rectangle::new(2, 2, 1, 1), PixelFormat::RgbaF32, &[9.0, 9.0, 9.0, 1.0])
            .unwrap();
        assert_eq!(buffer.pixel(2, 2), Some([9.0, 9.0, 9.0, 1.0]));

        // Reads through a view stop at the view's edge.
        assert_eq!(view.pixel(0, 0), None);
        assert_eq!(view.get(&Rectangle::new(1, 2, 1, 1), PixelFormat::RgbaF32), vec![0.0; 4]);
    }

    #[test]
    fn test_reframe_extends_with_abyss() {
        let buffer = gradient(Rectangle::new(0, 0, 2, 2));
        let framed = buffer.reframe(&Rectangle::new(-1, -1, 4, 4));
        assert_eq!(framed.extent(), Rectangle::new(-1, -1, 4, 4));
        assert_eq!(framed.pixel(-1, -1), None);
        assert_eq!(framed.pixel(1, 1), Some([1.0, 1.0, 0.0, 1.0]));
        assert_eq!(framed.valid_area(), Rectangle::new(0, 0, 2, 2));
    }

    #[test]
    fn test_sampling() {
        let buffer = gradient(Rectangle::new(0, 0, 4, 4));

        let nearest = buffer.sample(1.7, 2.2, Interpolation::Nearest);
        assert_eq!(nearest, [1.0, 2.0, 0.0, 1.0]);

        // Halfway between the centers of (1, 1) and (2, 1).
        let linear = buffer.sample(2.0, 1.5, Interpolation::Linear);
        assert!((linear[0] - 1.5).abs() < 1e-5);
        assert!((linear[1] - 1.0).abs() < 1e-5);

        // Catmull-Rom reproduces linear ramps exactly.
        let cubic = buffer.sample(2.25, 1.5, Interpolation::Cubic);
        assert!((cubic[0] - 1.75).abs() < 1e-4);
        assert!((cubic[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_infinite_extent_rejected() {
        assert!(matches!(
            Buffer::new(Rectangle::infinite(), PixelFormat::RgbaF32),
            Err(BufferError::InfiniteExtent)
        ));
    }

    #[test]
    fn test_image_round_trip() {
        let buffer = Buffer::filled(Rectangle::new(5, 5, 3, 2), PixelFormat::RgbaF32, Color::rgb(1.0, 0.0, 0.0)).unwrap();
        let image = buffer.to_rgba8();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);

        let back = Buffer::from_image(&image::DynamicImage::ImageRgba8(image), 5, 5).unwrap();
        assert_eq!(back.extent(), Rectangle::new(5, 5, 3, 2));
        assert_eq!(back.pixel(6, 6), Some([1.0, 0.0, 0.0, 1.0]));
    }
}
