//! Fixed-size premultiplied RGBA pixel storage.

use crate::pixel::Pixel;
use common::{CanvasError, CanvasResult, Color, PixelRect, Size};
use std::fmt;

/// Reserve and fill a sample vector, reporting allocation failure instead of
/// aborting.
pub(crate) fn alloc_samples(size: Size, channels: usize, fill: u8) -> CanvasResult<Vec<u8>> {
    let len = size
        .pixel_count()
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| CanvasError::allocation(size.width, size.height))?;

    let mut data = Vec::new();
    if data.try_reserve_exact(len).is_err() {
        tracing::warn!(width = size.width, height = size.height, "buffer allocation failed");
        return Err(CanvasError::allocation(size.width, size.height));
    }
    data.resize(len, fill);
    Ok(data)
}

/// Pixel buffer holding premultiplied RGBA samples, top row first.
///
/// Width and height never change after creation. Every public write keeps
/// each color channel at or below its alpha.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> CanvasResult<Self> {
        let data = alloc_samples(Size::new(width, height), 4, 0)?;
        Ok(Self { width, height, data })
    }

    pub fn with_size(size: Size) -> CanvasResult<Self> {
        Self::new(size.width, size.height)
    }

    /// Wrap raw premultiplied samples. Channels above alpha are clamped.
    pub fn from_premultiplied(width: u32, height: u32, mut data: Vec<u8>) -> CanvasResult<Self> {
        let expected = Size::new(width, height)
            .pixel_count()
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| CanvasError::allocation(width, height))?;
        if data.len() != expected {
            return Err(CanvasError::image(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        for px in data.chunks_exact_mut(4) {
            Pixel::from_slice(px).normalized().write_to(px);
        }
        Ok(Self { width, height, data })
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

    #[inline]
    pub fn bounds(&self) -> PixelRect {
        self.size().to_rect()
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    #[inline]
    pub(crate) fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// Get pixel at position; transparent outside the buffer.
    pub fn get_pixel(&self, x: u32, y: u32) -> Pixel {
        if x >= self.width || y >= self.height {
            return Pixel::TRANSPARENT;
        }
        let offset = self.offset(x, y);
        Pixel::from_slice(&self.data[offset..offset + 4])
    }

    /// Set pixel at position. Writes outside the buffer are dropped.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = self.offset(x, y);
        pixel.normalized().write_to(&mut self.data[offset..offset + 4]);
    }

    /// Fill the whole buffer with a straight color.
    pub fn fill(&mut self, color: Color) {
        let rect = self.bounds();
        self.fill_rect(rect, color);
    }

    /// Fill a rectangle with a straight color, premultiplied by its alpha.
    pub fn fill_rect(&mut self, rect: PixelRect, color: Color) {
        let pixel = Pixel::from_color(color);
        self.for_each_in_rect(rect, |px| pixel.write_to(px));
    }

    /// Clear to transparent.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn clear_rect(&mut self, rect: PixelRect) {
        self.for_each_in_rect(rect, |px| px.fill(0));
    }

    fn for_each_in_rect(&mut self, rect: PixelRect, mut f: impl FnMut(&mut [u8])) {
        let Some(rect) = rect.intersection(&self.bounds()) else {
            return;
        };
        let stride = self.stride();
        for y in rect.y as usize..rect.y as usize + rect.height as usize {
            let start = y * stride + rect.x as usize * 4;
            let end = start + rect.width as usize * 4;
            for px in self.data[start..end].chunks_exact_mut(4) {
                f(px);
            }
        }
    }

    /// Replace the contents with `source`, anchored at the top-left corner.
    ///
    /// Sizes are expected to match. On mismatch the overlap is copied and the
    /// remainder cleared; nothing is scaled.
    pub fn replace_from(&mut self, source: &PixelBuffer) {
        if self.size() == source.size() {
            self.data.copy_from_slice(&source.data);
            return;
        }

        tracing::debug!(
            dst = ?self.size(),
            src = ?source.size(),
            "replacing buffer from mismatched source, clipping"
        );
        self.clear();
        let w = self.width.min(source.width) as usize * 4;
        let rows = self.height.min(source.height) as usize;
        let (dst_stride, src_stride) = (self.stride(), source.stride());
        for y in 0..rows {
            self.data[y * dst_stride..y * dst_stride + w]
                .copy_from_slice(&source.data[y * src_stride..y * src_stride + w]);
        }
    }

    /// Copy out the alpha channel.
    pub fn alpha_plane(&self) -> AlphaPlane {
        AlphaPlane {
            size: self.size(),
            data: self.data.chunks_exact(4).map(|px| px[3]).collect(),
        }
    }

    /// Overwrite the alpha channel from a snapshot.
    ///
    /// Color channels are left as they are, except that each is clamped to the
    /// restored alpha. Returns `false` without writing if sizes differ.
    pub fn restore_alpha_plane(&mut self, plane: &AlphaPlane) -> bool {
        if plane.size != self.size() {
            return false;
        }
        for (px, &a) in self.data.chunks_exact_mut(4).zip(plane.data.iter()) {
            px[3] = a;
            for c in &mut px[..3] {
                *c = (*c).min(a);
            }
        }
        true
    }

    /// Raw premultiplied samples.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Iterate pixels row by row.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data.chunks_exact(4).map(Pixel::from_slice)
    }

    /// Apply `f` to every pixel, normalizing the result.
    pub fn map_pixels(&mut self, mut f: impl FnMut(Pixel) -> Pixel) {
        for px in self.data.chunks_exact_mut(4) {
            f(Pixel::from_slice(px)).normalized().write_to(px);
        }
    }

    /// Whether every pixel satisfies the premultiplied invariant.
    pub fn is_premultiplied(&self) -> bool {
        self.pixels().all(|p| p.is_premultiplied())
    }

    pub fn is_transparent(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }

    /// Straight (non-premultiplied) RGBA samples.
    pub fn to_straight_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len());
        for p in self.pixels() {
            let c = p.to_color();
            out.extend_from_slice(&[c.r, c.g, c.b, c.a]);
        }
        out
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Snapshot of one buffer's alpha channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlphaPlane {
    size: Size,
    data: Vec<u8>,
}

impl AlphaPlane {
    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.size.width || y >= self.size.height {
            return 0;
        }
        self.data[y as usize * self.size.width as usize + x as usize]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer() {
        let mut buffer = PixelBuffer::new(100, 100).unwrap();
        assert_eq!(buffer.width(), 100);
        assert_eq!(buffer.height(), 100);
        assert_eq!(buffer.as_bytes().len(), 100 * 100 * 4);

        buffer.set_pixel(50, 50, Pixel::new(255, 0, 0, 255));
        assert_eq!(buffer.get_pixel(50, 50), Pixel::new(255, 0, 0, 255));
        assert_eq!(buffer.get_pixel(500, 50), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_set_pixel_keeps_invariant() {
        let mut buffer = PixelBuffer::new(2, 2).unwrap();
        buffer.set_pixel(0, 0, Pixel { r: 255, g: 255, b: 255, a: 10 });
        assert_eq!(buffer.get_pixel(0, 0), Pixel::new(10, 10, 10, 10));
        assert!(buffer.is_premultiplied());
    }

    #[test]
    fn test_overflowing_size_is_allocation_failure() {
        let err = PixelBuffer::new(u32::MAX, u32::MAX).unwrap_err();
        assert_eq!(err, CanvasError::allocation(u32::MAX, u32::MAX));
    }

    #[test]
    fn test_fill_and_clear_rect() {
        let mut buffer = PixelBuffer::new(4, 4).unwrap();
        buffer.fill_rect(PixelRect::new(-2, -2, 4, 4), Color::rgba(255, 0, 0, 128));
        assert_eq!(buffer.get_pixel(1, 1), Pixel::new(128, 0, 0, 128));
        assert_eq!(buffer.get_pixel(2, 2), Pixel::TRANSPARENT);

        buffer.fill(Color::WHITE);
        buffer.clear_rect(PixelRect::new(3, 3, 10, 10));
        assert_eq!(buffer.get_pixel(3, 3), Pixel::TRANSPARENT);
        assert_eq!(buffer.get_pixel(2, 3), Pixel::new(255, 255, 255, 255));
    }

    #[test]
    fn test_replace_from_clips_mismatch() {
        let mut src = PixelBuffer::new(2, 2).unwrap();
        src.fill(Color::BLUE);
        let mut dst = PixelBuffer::new(3, 1).unwrap();
        dst.fill(Color::RED);

        dst.replace_from(&src);
        assert_eq!(dst.get_pixel(0, 0), Pixel::new(0, 0, 255, 255));
        assert_eq!(dst.get_pixel(1, 0), Pixel::new(0, 0, 255, 255));
        assert_eq!(dst.get_pixel(2, 0), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_alpha_plane_round_trip() {
        let mut buffer = PixelBuffer::new(2, 1).unwrap();
        buffer.set_pixel(0, 0, Pixel::new(10, 20, 30, 40));
        buffer.set_pixel(1, 0, Pixel::new(0, 0, 0, 255));
        let plane = buffer.alpha_plane();

        buffer.fill(Color::WHITE);
        assert!(buffer.restore_alpha_plane(&plane));
        assert_eq!(buffer.get_pixel(0, 0), Pixel::new(40, 40, 40, 40));
        assert_eq!(buffer.get_pixel(1, 0), Pixel::new(255, 255, 255, 255));
        assert_eq!(buffer.alpha_plane(), plane);

        let mut other = PixelBuffer::new(1, 1).unwrap();
        assert!(!other.restore_alpha_plane(&plane));
    }

    #[test]
    fn test_from_premultiplied_rejects_short_data() {
        assert!(PixelBuffer::from_premultiplied(2, 2, vec![0; 4]).is_err());
        let buffer = PixelBuffer::from_premultiplied(1, 1, vec![200, 0, 0, 100]).unwrap();
        assert_eq!(buffer.get_pixel(0, 0), Pixel::new(100, 0, 0, 100));
    }
}
