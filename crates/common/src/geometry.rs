//! Integer pixel geometry.

use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Size of a canvas or buffer in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels, `None` on overflow.
    #[inline]
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    #[inline]
    pub fn to_rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    /// Largest size with this aspect ratio that fits in `bounds`, never
    /// larger than `self`.
    pub fn fit_within(&self, bounds: Size) -> Size {
        if self.is_empty() || bounds.is_empty() {
            return Size::new(0, 0);
        }
        if self.width <= bounds.width && self.height <= bounds.height {
            return *self;
        }
        let scale = (bounds.width as f64 / self.width as f64)
            .min(bounds.height as f64 / self.height as f64);
        Size::new(
            ((self.width as f64 * scale).round() as u32).clamp(1, bounds.width),
            ((self.height as f64 * scale).round() as u32).clamp(1, bounds.height),
        )
    }
}

/// Integer rectangle for pixel operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[inline]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    #[inline]
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right > x as i64 && bottom > y as i64 {
            Some(PixelRect::new(x, y, (right - x as i64) as u32, (bottom - y as i64) as u32))
        } else {
            None
        }
    }
}

/// Per-side extents, used for effect margins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeSizes {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl EdgeSizes {
    pub const ZERO: EdgeSizes = EdgeSizes {
        top: 0,
        right: 0,
        bottom: 0,
        left: 0,
    };

    #[inline]
    pub const fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self { top, right, bottom, left }
    }

    #[inline]
    pub const fn all(value: u32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    #[inline]
    pub fn horizontal(&self) -> u32 {
        self.left.saturating_add(self.right)
    }

    #[inline]
    pub fn vertical(&self) -> u32 {
        self.top.saturating_add(self.bottom)
    }

    /// `size` grown by these edges. Saturates at `u32::MAX` per axis.
    #[inline]
    pub fn expand(&self, size: Size) -> Size {
        Size::new(
            size.width.saturating_add(self.horizontal()),
            size.height.saturating_add(self.vertical()),
        )
    }

    /// Offset of the unexpanded content's top-left corner relative to an
    /// expanded buffer placed at the origin.
    #[inline]
    pub fn origin(&self) -> (i32, i32) {
        let clamp = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        (-clamp(self.left), -clamp(self.top))
    }
}

impl Add for EdgeSizes {
    type Output = EdgeSizes;
    fn add(self, rhs: EdgeSizes) -> EdgeSizes {
        EdgeSizes::new(
            self.top.saturating_add(rhs.top),
            self.right.saturating_add(rhs.right),
            self.bottom.saturating_add(rhs.bottom),
            self.left.saturating_add(rhs.left),
        )
    }
}
