//! Scoped write access to a layer's pixels for brush and fill tools.

use crate::layer::{ContentMode, Layer};
use common::{CanvasError, CanvasResult, Color, PixelRect, Size};
use raster::{AlphaPlane, MaskBuffer, Pixel, SelectionMask};

/// Buffer a [`DrawingScope`] writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawTarget {
    Content,
    Mask,
}

/// Open drawing session on one layer.
///
/// Coordinates are top-down from the canvas origin. Dropping the scope ends
/// the session: an alpha-locked layer gets its pre-draw alpha back and the
/// filter cache is invalidated.
pub struct DrawingScope<'a> {
    layer: &'a mut Layer,
    target: DrawTarget,
    clip: Option<MaskBuffer>,
    frozen_alpha: Option<AlphaPlane>,
}

impl Layer {
    /// Start drawing into the mask when mask editing, otherwise the content.
    ///
    /// A non-empty `clip` restricts writes to pixels where it is above zero.
    pub fn begin_drawing(
        &mut self,
        clip: Option<&dyn SelectionMask>,
    ) -> CanvasResult<DrawingScope<'_>> {
        let size = self.content.size();
        let clip = match clip {
            Some(selection) if !selection.is_empty() => Some(
                selection
                    .to_mask(size)
                    .ok_or_else(|| CanvasError::image("selection could not be rasterized"))?,
            ),
            _ => None,
        };

        let target = match self.content_mode() {
            ContentMode::MaskEditing => DrawTarget::Mask,
            ContentMode::Normal => DrawTarget::Content,
        };
        let frozen_alpha = (target == DrawTarget::Content && self.is_alpha_locked())
            .then(|| self.content.alpha_plane());

        tracing::trace!(layer = ?self.id(), ?target, clipped = clip.is_some(), "begin drawing");
        Ok(DrawingScope {
            layer: self,
            target,
            clip,
            frozen_alpha,
        })
    }
}

impl<'a> DrawingScope<'a> {
    #[inline]
    pub fn target(&self) -> DrawTarget {
        self.target
    }

    pub fn size(&self) -> Size {
        self.layer.content.size()
    }

    #[inline]
    fn writable(&self, x: u32, y: u32) -> bool {
        self.clip.as_ref().map_or(true, |clip| clip.get(x, y) > 0)
    }

    /// Current value at `(x, y)`. On the mask target the sample is returned
    /// as an opaque gray pixel.
    pub fn get_pixel(&self, x: u32, y: u32) -> Pixel {
        match (self.target, &self.layer.mask) {
            (DrawTarget::Mask, Some(mask)) => {
                let v = mask.get(x, y);
                Pixel::new(v, v, v, 255)
            }
            _ => self.layer.content.get_pixel(x, y),
        }
    }

    /// Write a premultiplied pixel.
    ///
    /// With alpha lock the pixel keeps the pre-draw alpha and its color is
    /// clamped to it. On the mask target the pixel's alpha becomes the mask
    /// sample.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        if !self.writable(x, y) {
            return;
        }
        match self.target {
            DrawTarget::Mask => {
                if let Some(mask) = self.layer.mask.as_mut() {
                    mask.set(x, y, pixel.a);
                }
            }
            DrawTarget::Content => {
                let pixel = match &self.frozen_alpha {
                    Some(plane) => {
                        let a = plane.get(x, y);
                        Pixel::new(pixel.r.min(a), pixel.g.min(a), pixel.b.min(a), a)
                    }
                    None => pixel,
                };
                self.layer.content.set_pixel(x, y, pixel);
            }
        }
    }

    /// Write a raw mask sample. Ignored unless drawing into the mask.
    pub fn set_mask_value(&mut self, x: u32, y: u32, value: u8) {
        if self.target != DrawTarget::Mask || !self.writable(x, y) {
            return;
        }
        if let Some(mask) = self.layer.mask.as_mut() {
            mask.set(x, y, value);
        }
    }

    /// Fill `rect` with a straight color, premultiplied by its own alpha.
    pub fn fill_rect(&mut self, rect: PixelRect, color: Color) {
        self.for_each_in(rect, Pixel::from_color(color));
    }

    pub fn clear_rect(&mut self, rect: PixelRect) {
        self.for_each_in(rect, Pixel::TRANSPARENT);
    }

    fn for_each_in(&mut self, rect: PixelRect, pixel: Pixel) {
        let Some(region) = rect.intersection(&self.layer.content.bounds()) else {
            return;
        };
        let (x0, y0) = (region.x as u32, region.y as u32);
        for y in y0..y0 + region.height {
            for x in x0..x0 + region.width {
                self.set_pixel(x, y, pixel);
            }
        }
    }

    /// End the session. Same as dropping the scope.
    pub fn end(self) {}
}

impl Drop for DrawingScope<'_> {
    fn drop(&mut self) {
        if let Some(plane) = self.frozen_alpha.take() {
            self.layer.content.restore_alpha_plane(&plane);
        }
        self.layer.invalidate();
        tracing::trace!(layer = ?self.layer.id(), "end drawing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerFlags, LayerId};
    use raster::PixelBuffer;
    use slotmap::SlotMap;

    fn layer(w: u32, h: u32) -> Layer {
        let mut ids: SlotMap<LayerId, ()> = SlotMap::with_key();
        Layer::new(ids.insert(()), "draw", PixelBuffer::new(w, h).unwrap())
    }

    #[test]
    fn test_draws_into_content() {
        let mut l = layer(4, 4);
        let mut scope = l.begin_drawing(None).unwrap();
        assert_eq!(scope.target(), DrawTarget::Content);
        scope.fill_rect(PixelRect::new(1, 1, 2, 2), Color::RED);
        scope.end();

        assert_eq!(l.content().get_pixel(1, 1), Pixel::new(255, 0, 0, 255));
        assert!(l.content().get_pixel(0, 0).is_transparent());
    }

    #[test]
    fn test_addressing_is_top_down() {
        let mut l = layer(2, 3);
        {
            let mut scope = l.begin_drawing(None).unwrap();
            scope.set_pixel(0, 0, Pixel::new(0, 0, 255, 255));
        }
        let bytes = l.content().as_bytes();
        assert_eq!(&bytes[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_clip_restricts_writes() {
        let mut l = layer(2, 1);
        let mut clip = MaskBuffer::filled(Size::new(2, 1), 0).unwrap();
        clip.set(1, 0, 10);
        {
            let mut scope = l.begin_drawing(Some(&clip)).unwrap();
            scope.fill_rect(l_bounds(), Color::BLUE);
        }
        assert!(l.content().get_pixel(0, 0).is_transparent());
        assert_eq!(l.content().get_pixel(1, 0), Pixel::new(0, 0, 255, 255));
    }

    #[test]
    fn test_empty_clip_is_ignored() {
        let mut l = layer(2, 1);
        let clip = MaskBuffer::filled(Size::new(2, 1), 0).unwrap();
        {
            let mut scope = l.begin_drawing(Some(&clip)).unwrap();
            scope.fill_rect(l_bounds(), Color::BLUE);
        }
        assert!(!l.content().get_pixel(0, 0).is_transparent());
    }

    fn l_bounds() -> PixelRect {
        PixelRect::new(0, 0, 2, 1)
    }

    #[test]
    fn test_mask_editing_targets_mask() {
        let mut l = layer(2, 1);
        l.create_mask().unwrap();
        l.set_mask_editing(true);
        {
            let mut scope = l.begin_drawing(None).unwrap();
            assert_eq!(scope.target(), DrawTarget::Mask);
            scope.set_mask_value(0, 0, 40);
            scope.set_pixel(1, 0, Pixel::new(0, 0, 0, 90));
            assert_eq!(scope.get_pixel(0, 0), Pixel::new(40, 40, 40, 255));
        }
        assert_eq!(l.mask().unwrap().get(0, 0), 40);
        assert_eq!(l.mask().unwrap().get(1, 0), 90);
        assert!(l.content().is_transparent());
    }

    #[test]
    fn test_mask_editing_without_mask_draws_content() {
        let mut l = layer(1, 1);
        l.set_mask_editing(true);
        {
            let mut scope = l.begin_drawing(None).unwrap();
            assert_eq!(scope.target(), DrawTarget::Content);
            scope.set_pixel(0, 0, Pixel::new(9, 9, 9, 9));
        }
        assert_eq!(l.content().get_pixel(0, 0), Pixel::new(9, 9, 9, 9));
    }

    #[test]
    fn test_alpha_lock_round_trip() {
        let mut l = layer(3, 3);
        {
            let mut scope = l.begin_drawing(None).unwrap();
            for i in 0..9u32 {
                let a = (i * 28) as u8;
                scope.set_pixel(i % 3, i / 3, Pixel::new(a, a / 2, 0, a));
            }
        }
        let before = l.content().alpha_plane();

        l.set_flag(LayerFlags::ALPHA_LOCKED, true);
        {
            let mut scope = l.begin_drawing(None).unwrap();
            scope.fill_rect(PixelRect::new(0, 0, 3, 3), Color::WHITE);
            scope.clear_rect(PixelRect::new(0, 0, 1, 3));
            scope.set_pixel(2, 2, Pixel::new(255, 255, 255, 255));
        }

        assert_eq!(l.content().alpha_plane(), before);
        assert!(l.content().is_premultiplied());
        assert_eq!(l.content().get_pixel(1, 1).a, before.get(1, 1));
    }

    #[test]
    fn test_drawing_invalidates_cache() {
        let mut l = layer(2, 2);
        l.set_effects(raster::Effects::new().with(raster::Effect::Invert { amount: 1.0 }));
        let effects = raster::SoftwareEffects;
        l.cached_filtered_image(&effects).unwrap();
        assert!(l.is_cache_valid());

        l.begin_drawing(None).unwrap().end();
        assert!(!l.is_cache_valid());
    }
}
