//! Premultiplied pixel values.

use common::Color;

/// One premultiplied RGBA sample.
///
/// Buffers only ever store pixels whose color channels do not exceed alpha;
/// [`Pixel::new`] and every buffer write enforce that.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    pub const TRANSPARENT: Pixel = Pixel { r: 0, g: 0, b: 0, a: 0 };

    /// Create a pixel, clamping color channels to alpha.
    #[inline]
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r.min(a),
            g: g.min(a),
            b: b.min(a),
            a,
        }
    }

    #[inline]
    pub(crate) fn from_slice(px: &[u8]) -> Self {
        Self {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        }
    }

    #[inline]
    pub(crate) fn write_to(self, px: &mut [u8]) {
        px[0] = self.r;
        px[1] = self.g;
        px[2] = self.b;
        px[3] = self.a;
    }

    /// Premultiply a straight color.
    pub fn from_color(color: Color) -> Self {
        let a = color.a as u32;
        let mul = |c: u8| ((c as u32 * a + 127) / 255) as u8;
        Self {
            r: mul(color.r),
            g: mul(color.g),
            b: mul(color.b),
            a: color.a,
        }
    }

    /// Recover the straight color.
    pub fn to_color(self) -> Color {
        if self.a == 0 {
            return Color::TRANSPARENT;
        }
        let a = self.a as u32;
        let div = |c: u8| ((c as u32 * 255 + a / 2) / a).min(255) as u8;
        Color::rgba(div(self.r), div(self.g), div(self.b), self.a)
    }

    /// Same pixel with color channels clamped to alpha.
    #[inline]
    pub fn normalized(self) -> Self {
        Self::new(self.r, self.g, self.b, self.a)
    }

    #[inline]
    pub fn is_premultiplied(&self) -> bool {
        self.r <= self.a && self.g <= self.a && self.b <= self.a
    }

    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

impl From<Color> for Pixel {
    fn from(color: Color) -> Self {
        Pixel::from_color(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_to_alpha() {
        assert_eq!(Pixel::new(200, 10, 90, 100), Pixel { r: 100, g: 10, b: 90, a: 100 });
    }

    #[test]
    fn test_premultiply() {
        assert_eq!(Pixel::from_color(Color::RED), Pixel::new(255, 0, 0, 255));
        assert_eq!(Pixel::from_color(Color::rgba(255, 128, 0, 128)), Pixel::new(128, 64, 0, 128));
        assert_eq!(Pixel::from_color(Color::rgba(255, 255, 255, 0)), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_unpremultiply() {
        assert_eq!(Pixel::new(128, 64, 0, 128).to_color(), Color::rgba(255, 128, 0, 128));
        assert_eq!(Pixel::TRANSPARENT.to_color(), Color::TRANSPARENT);
    }
}
