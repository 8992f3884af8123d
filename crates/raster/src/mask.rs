//! Single-channel masks and the mask-apply rule.

use crate::pixel::Pixel;
use crate::pixel_buffer::{alloc_samples, PixelBuffer};
use common::{CanvasResult, PixelRect, Size};
use std::fmt;

/// Single-channel coverage buffer, 0 hidden to 255 fully visible.
#[derive(Clone, PartialEq, Eq)]
pub struct MaskBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl MaskBuffer {
    /// Create a fully visible mask.
    pub fn new(width: u32, height: u32) -> CanvasResult<Self> {
        Self::filled(Size::new(width, height), 255)
    }

    pub fn filled(size: Size, value: u8) -> CanvasResult<Self> {
        let data = alloc_samples(size, 1, value)?;
        Ok(Self {
            width: size.width,
            height: size.height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Sample at position; 0 outside the mask.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    pub fn fill_rect(&mut self, rect: PixelRect, value: u8) {
        let Some(rect) = rect.intersection(&self.size().to_rect()) else {
            return;
        };
        let stride = self.width as usize;
        for y in rect.y as usize..rect.y as usize + rect.height as usize {
            let start = y * stride + rect.x as usize;
            self.data[start..start + rect.width as usize].fill(value);
        }
    }

    /// Whether no sample is above zero.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for MaskBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Arbitrary clip region supplied by a selection tool.
pub trait SelectionMask {
    /// Whether the selection covers nothing.
    fn is_empty(&self) -> bool;

    /// Rasterize the selection at canvas size.
    fn to_mask(&self, size: Size) -> Option<MaskBuffer>;
}

impl SelectionMask for MaskBuffer {
    fn is_empty(&self) -> bool {
        self.is_blank()
    }

    fn to_mask(&self, size: Size) -> Option<MaskBuffer> {
        if self.size() == size {
            return Some(self.clone());
        }
        let mut out = MaskBuffer::filled(size, 0).ok()?;
        for y in 0..size.height.min(self.height) {
            for x in 0..size.width.min(self.width) {
                out.set(x, y, self.get(x, y));
            }
        }
        Some(out)
    }
}

/// Mask one premultiplied pixel by a mask sample.
///
/// `alpha' = floor(alpha * m / 255)`; color channels are scaled by
/// `alpha' / alpha`, rounded, and clamped to `alpha'`.
#[inline]
pub fn mask_pixel(pixel: Pixel, sample: u8) -> Pixel {
    if sample == 255 {
        return pixel;
    }
    let new_a = (pixel.a as u32 * sample as u32 / 255) as u8;
    if pixel.a == 0 || new_a == 0 {
        return Pixel::new(0, 0, 0, new_a);
    }
    let scale = new_a as f32 / pixel.a as f32;
    let ch = |c: u8| ((c as f32 * scale).round() as u32).min(new_a as u32) as u8;
    Pixel {
        r: ch(pixel.r),
        g: ch(pixel.g),
        b: ch(pixel.b),
        a: new_a,
    }
}

/// Apply `mask` to `image` in place over their overlapping area.
pub fn apply_mask(image: &mut PixelBuffer, mask: &MaskBuffer) {
    let width = image.width().min(mask.width()) as usize;
    let rows = image.height().min(mask.height()) as usize;
    let (stride, mask_stride) = (image.stride(), mask.width as usize);
    let data = image.data_mut();

    for y in 0..rows {
        let row = &mut data[y * stride..y * stride + width * 4];
        let samples = &mask.data[y * mask_stride..y * mask_stride + width];
        for (px, &m) in row.chunks_exact_mut(4).zip(samples) {
            mask_pixel(Pixel::from_slice(px), m).write_to(px);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Color;

    fn gradient_buffer() -> PixelBuffer {
        let mut buffer = PixelBuffer::new(16, 16).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                let a = (x * 16 + y) as u8;
                buffer.set_pixel(x, y, Pixel::new(a, a / 2, a / 3, a));
            }
        }
        buffer
    }

    #[test]
    fn test_full_mask_is_identity() {
        let mut image = gradient_buffer();
        let original = image.clone();
        apply_mask(&mut image, &MaskBuffer::new(16, 16).unwrap());
        assert_eq!(image, original);
    }

    #[test]
    fn test_zero_mask_clears_alpha() {
        let mut image = gradient_buffer();
        apply_mask(&mut image, &MaskBuffer::filled(Size::new(16, 16), 0).unwrap());
        assert!(image.pixels().all(|p| p.a == 0));
        assert!(image.is_premultiplied());
    }

    #[test]
    fn test_partial_mask_floors_alpha() {
        let p = mask_pixel(Pixel::new(200, 100, 0, 200), 128);
        // floor(200 * 128 / 255) = 100
        assert_eq!(p.a, 100);
        assert_eq!(p.r, 100);
        assert_eq!(p.g, 50);
        assert!(p.is_premultiplied());
    }

    #[test]
    fn test_partial_masks_keep_invariant() {
        let mut image = gradient_buffer();
        let mut mask = MaskBuffer::new(16, 16).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                mask.set(x, y, (x * 17) as u8);
            }
        }
        apply_mask(&mut image, &mask);
        assert!(image.is_premultiplied());
    }

    #[test]
    fn test_selection_mask_resizes() {
        let mut mask = MaskBuffer::filled(Size::new(2, 2), 0).unwrap();
        assert!(SelectionMask::is_empty(&mask));
        mask.fill_rect(PixelRect::new(1, 1, 5, 5), 200);
        assert!(!SelectionMask::is_empty(&mask));

        let grown = mask.to_mask(Size::new(3, 3)).unwrap();
        assert_eq!(grown.get(1, 1), 200);
        assert_eq!(grown.get(2, 2), 0);
    }

    #[test]
    fn test_mask_on_opaque_color() {
        let mut image = PixelBuffer::new(1, 1).unwrap();
        image.fill(Color::BLUE);
        let mut mask = MaskBuffer::new(1, 1).unwrap();
        mask.set(0, 0, 0);
        apply_mask(&mut image, &mask);
        assert_eq!(image.get_pixel(0, 0), Pixel::TRANSPARENT);
    }
}
