//! Text layer descriptors and rasterization.

use crate::blend::{composite_pixel, BlendMode, CompositeOp};
use crate::pixel::Pixel;
use crate::pixel_buffer::PixelBuffer;
use common::{CanvasError, CanvasResult, Color, Size};
use fontdue::{Font, FontSettings};
use serde::{Deserialize, Serialize};

/// Everything needed to re-render a text layer's pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextDescriptor {
    pub text: String,
    /// Pixel size of the em square.
    pub font_size: f32,
    pub color: Color,
    /// Top-left of the first line's box, canvas pixels.
    pub x: i32,
    pub y: i32,
}

impl TextDescriptor {
    pub fn new(text: impl Into<String>, font_size: f32, color: Color) -> Self {
        Self {
            text: text.into(),
            font_size,
            color,
            x: 0,
            y: 0,
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }
}

/// Lays out and rasterizes a descriptor at canvas size.
///
/// `None` means the text could not be rendered; callers leave existing
/// pixels untouched.
pub trait TextRenderer: Send + Sync {
    fn render(&self, descriptor: &TextDescriptor, size: Size) -> Option<PixelBuffer>;
}

/// [`TextRenderer`] backed by a single fontdue font.
pub struct FontTextRenderer {
    font: Font,
}

impl FontTextRenderer {
    pub fn from_bytes(data: &[u8]) -> CanvasResult<Self> {
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| CanvasError::image(format!("font load failed: {}", e)))?;
        Ok(Self { font })
    }
}

impl TextRenderer for FontTextRenderer {
    fn render(&self, descriptor: &TextDescriptor, size: Size) -> Option<PixelBuffer> {
        let mut buffer = PixelBuffer::with_size(size).ok()?;
        let px = descriptor.font_size;
        if px.is_nan() || px <= 0.0 {
            return None;
        }

        let (ascent, line_height) = match self.font.horizontal_line_metrics(px) {
            Some(m) => (m.ascent, m.new_line_size),
            None => (px, px * 1.2),
        };
        let ink = Pixel::from_color(descriptor.color);

        for (line_no, line) in descriptor.text.lines().enumerate() {
            let baseline = descriptor.y as f32 + ascent + line_no as f32 * line_height;
            let mut pen_x = descriptor.x as f32;

            for c in line.chars() {
                let (metrics, coverage) = self.font.rasterize(c, px);
                let left = pen_x.round() as i64 + metrics.xmin as i64;
                let top = baseline.round() as i64 - metrics.height as i64 - metrics.ymin as i64;

                for gy in 0..metrics.height {
                    for gx in 0..metrics.width {
                        let cov = coverage[gy * metrics.width + gx] as u32;
                        let (x, y) = (left + gx as i64, top + gy as i64);
                        if cov == 0 || x < 0 || y < 0 {
                            continue;
                        }
                        let scale = |c: u8| ((c as u32 * cov + 127) / 255) as u8;
                        let src = Pixel::new(scale(ink.r), scale(ink.g), scale(ink.b), scale(ink.a));
                        let (x, y) = (x as u32, y as u32);
                        let dst = buffer.get_pixel(x, y);
                        buffer.set_pixel(
                            x,
                            y,
                            composite_pixel(dst, src, 1.0, BlendMode::Normal, CompositeOp::Over),
                        );
                    }
                }
                pen_x += metrics.advance_width;
            }
        }

        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_font_is_error() {
        assert!(FontTextRenderer::from_bytes(b"not a font").is_err());
    }

    #[test]
    fn test_descriptor_builder() {
        let d = TextDescriptor::new("hi", 12.0, Color::BLACK).at(4, 5);
        assert_eq!((d.x, d.y), (4, 5));
        assert_eq!(d.text, "hi");
    }
}
