//! Rectangles and halo margins.
//!
//! Every region that flows through the engine is a [`Rectangle`] in absolute
//! pixel coordinates. Unbounded sources report [`Rectangle::infinite`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin used by the infinite-plane sentinel.
const INFINITE_ORIGIN: i32 = i32::MIN / 2;
/// Extent used by the infinite-plane sentinel.
const INFINITE_EXTENT: i32 = i32::MAX;

/// An axis-aligned integer rectangle.
///
/// Width and height are never negative. A rectangle with zero area is empty,
/// regardless of its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    /// Left edge (inclusive).
    pub x: i32,
    /// Top edge (inclusive).
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rectangle {
    /// Create a rectangle. Negative sizes are clamped to zero.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// The empty rectangle at the origin.
    pub fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// The unbounded plane.
    pub fn infinite() -> Self {
        Self {
            x: INFINITE_ORIGIN,
            y: INFINITE_ORIGIN,
            width: INFINITE_EXTENT,
            height: INFINITE_EXTENT,
        }
    }

    /// Build a rectangle from inclusive-exclusive edges.
    fn from_edges(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        Self::new(
            clamp(left),
            clamp(top),
            clamp((right - left).max(0)),
            clamp((bottom - top).max(0)),
        )
    }

    /// Whether this is the infinite-plane sentinel.
    pub fn is_infinite(&self) -> bool {
        self.width == INFINITE_EXTENT || self.height == INFINITE_EXTENT
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    /// Whether the pixel at `(px, py)` lies inside.
    pub fn contains_point(&self, px: i32, py: i32) -> bool {
        !self.is_empty()
            && px >= self.x
            && py >= self.y
            && (px as i64) < self.right()
            && (py as i64) < self.bottom()
    }

    /// Whether `other` is fully covered by this rectangle.
    ///
    /// Every rectangle contains the empty rectangle.
    pub fn contains(&self, other: &Rectangle) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_infinite() {
            return true;
        }
        !self.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// The overlap of two rectangles, empty when disjoint.
    pub fn intersect(&self, other: &Rectangle) -> Rectangle {
        if self.is_infinite() {
            return *other;
        }
        if other.is_infinite() {
            return *self;
        }
        let left = (self.x as i64).max(other.x as i64);
        let top = (self.y as i64).max(other.y as i64);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return Rectangle::empty();
        }
        Rectangle::from_edges(left, top, right, bottom)
    }

    /// The smallest rectangle covering both. Empty inputs are ignored.
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        if self.is_infinite() || other.is_infinite() {
            return Rectangle::infinite();
        }
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rectangle::from_edges(
            (self.x as i64).min(other.x as i64),
            (self.y as i64).min(other.y as i64),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Grow by the given halo margins. Infinite and empty rectangles are unchanged.
    pub fn grow(&self, halo: &Halo) -> Rectangle {
        if self.is_infinite() || self.is_empty() {
            return *self;
        }
        Rectangle::from_edges(
            self.x as i64 - halo.left as i64,
            self.y as i64 - halo.top as i64,
            self.right() + halo.right as i64,
            self.bottom() + halo.bottom as i64,
        )
    }

    /// Move the rectangle by `(dx, dy)`.
    pub fn translate(&self, dx: i32, dy: i32) -> Rectangle {
        if self.is_infinite() {
            return *self;
        }
        Rectangle::from_edges(
            self.x as i64 + dx as i64,
            self.y as i64 + dy as i64,
            self.right() + dx as i64,
            self.bottom() + dy as i64,
        )
    }

    /// Parse `x,y,w,h`.
    pub fn parse(text: &str) -> Option<Rectangle> {
        let parts: Vec<i32> = text
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [x, y, w, h] if *w >= 0 && *h >= 0 => Some(Rectangle::new(*x, *y, *w, *h)),
            _ => None,
        }
    }
}

impl Default for Rectangle {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "(infinite)")
        } else {
            write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
        }
    }
}

/// Extra margins an area filter reads around each output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Halo {
    /// Pixels needed to the left.
    pub left: u32,
    /// Pixels needed to the right.
    pub right: u32,
    /// Pixels needed above.
    pub top: u32,
    /// Pixels needed below.
    pub bottom: u32,
}

impl Halo {
    /// No margins: a point filter.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Same margin on all sides.
    pub fn symmetric(radius: u32) -> Self {
        Self {
            left: radius,
            right: radius,
            top: radius,
            bottom: radius,
        }
    }

    /// Explicit margins.
    pub fn asymmetric(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Margins for a kernel of fractional radius, rounded up.
    pub fn from_radius(radius: f64) -> Self {
        Self::from_radii(radius, radius)
    }

    /// Margins for separate horizontal and vertical radii, rounded up.
    pub fn from_radii(radius_x: f64, radius_y: f64) -> Self {
        let rx = ceil_margin(radius_x);
        let ry = ceil_margin(radius_y);
        Self::asymmetric(rx, rx, ry, ry)
    }

    /// Whether any side needs extra pixels.
    pub fn needs_overlap(&self) -> bool {
        self.left > 0 || self.right > 0 || self.top > 0 || self.bottom > 0
    }

    /// The largest margin on any side.
    pub fn max_extent(&self) -> u32 {
        self.left.max(self.right).max(self.top).max(self.bottom)
    }

    /// Side-wise maximum of two halos.
    pub fn combine(&self, other: &Halo) -> Halo {
        Halo {
            left: self.left.max(other.left),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

fn ceil_margin(radius: f64) -> u32 {
    if !radius.is_finite() || radius <= 0.0 {
        0
    } else {
        radius.ceil().min(u32::MAX as f64) as u32
    }
}
