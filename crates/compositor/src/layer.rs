//! Paint layers.

use crate::cache::{EffectsCache, FilteredImage, PendingFilter};
use crate::snapshot::LayerSnapshot;
use bitflags::bitflags;
use common::{CanvasError, CanvasResult, Color, Outcome};
use raster::{
    apply_mask, BlendMode, Effects, EffectsRenderer, MaskBuffer, PixelBuffer, TextDescriptor,
    TextRenderer,
};
use slotmap::new_key_type;
use std::borrow::Cow;
use std::sync::Arc;

new_key_type! {
    /// Stable identifier for a layer; never reused while the layer lives.
    pub struct LayerId;
}

bitflags! {
    /// Boolean layer attributes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LayerFlags: u8 {
        /// The layer may not be deleted.
        const LOCKED = 1 << 0;
        /// Drawing may change color but never alpha.
        const ALPHA_LOCKED = 1 << 1;
        /// The layer clips to the nearest non-member layer beneath it.
        const CLIP_MEMBER = 1 << 2;
        /// The layer is a sampling reference for fill tools.
        const REFERENCE = 1 << 3;
    }
}

/// Which buffer drawing goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentMode {
    Normal,
    MaskEditing,
}

/// Whether pixels are generated from a text descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextMode {
    None,
    Authoring,
}

/// A compositing layer.
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    name: String,
    visible: bool,
    opacity: f32,
    blend_mode: BlendMode,
    flags: LayerFlags,
    pub(crate) content: PixelBuffer,
    pub(crate) mask: Option<MaskBuffer>,
    mask_editing: bool,
    text: Option<TextDescriptor>,
    effects: Effects,
    cache: EffectsCache,
    revision: u64,
}

impl Layer {
    pub(crate) fn new(id: LayerId, name: impl Into<String>, content: PixelBuffer) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            flags: LayerFlags::empty(),
            content,
            mask: None,
            mask_editing: false,
            text: None,
            effects: Effects::new(),
            cache: EffectsCache::default(),
            revision: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Outcome {
        let name = name.into();
        if name == self.name {
            return Outcome::Unchanged;
        }
        self.name = name;
        self.touch();
        Outcome::Applied
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) -> Outcome {
        if visible == self.visible {
            return Outcome::Unchanged;
        }
        self.visible = visible;
        self.touch();
        Outcome::Applied
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Set opacity, clamped to `[0, 1]`. NaN is treated as 0.
    pub fn set_opacity(&mut self, opacity: f32) -> Outcome {
        let opacity = if opacity.is_nan() { 0.0 } else { opacity.clamp(0.0, 1.0) };
        if opacity == self.opacity {
            return Outcome::Unchanged;
        }
        self.opacity = opacity;
        self.touch();
        Outcome::Applied
    }

    #[inline]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) -> Outcome {
        if mode == self.blend_mode {
            return Outcome::Unchanged;
        }
        self.blend_mode = mode;
        self.touch();
        Outcome::Applied
    }

    #[inline]
    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: LayerFlags, on: bool) -> Outcome {
        if self.flags.contains(flag) == on {
            return Outcome::Unchanged;
        }
        self.flags.set(flag, on);
        self.touch();
        Outcome::Applied
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flags.contains(LayerFlags::LOCKED)
    }

    #[inline]
    pub fn is_alpha_locked(&self) -> bool {
        self.flags.contains(LayerFlags::ALPHA_LOCKED)
    }

    #[inline]
    pub fn is_clip_member(&self) -> bool {
        self.flags.contains(LayerFlags::CLIP_MEMBER)
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        self.flags.contains(LayerFlags::REFERENCE)
    }

    /// Counter bumped by every mutation of this layer.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[inline]
    pub fn content(&self) -> &PixelBuffer {
        &self.content
    }

    #[inline]
    pub fn mask(&self) -> Option<&MaskBuffer> {
        self.mask.as_ref()
    }

    #[inline]
    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    /// Whether mask editing is switched on, even with no mask present.
    #[inline]
    pub fn is_mask_editing(&self) -> bool {
        self.mask_editing
    }

    /// Where drawing currently lands.
    pub fn content_mode(&self) -> ContentMode {
        if self.mask_editing && self.mask.is_some() {
            ContentMode::MaskEditing
        } else {
            ContentMode::Normal
        }
    }

    #[inline]
    pub fn text(&self) -> Option<&TextDescriptor> {
        self.text.as_ref()
    }

    pub fn text_mode(&self) -> TextMode {
        if self.text.is_some() {
            TextMode::Authoring
        } else {
            TextMode::None
        }
    }

    #[inline]
    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    pub fn set_effects(&mut self, effects: Effects) -> Outcome {
        if effects == self.effects {
            return Outcome::Unchanged;
        }
        self.effects = effects;
        self.invalidate();
        Outcome::Applied
    }

    /// Whether the filtered image is cached and current.
    pub fn is_cache_valid(&self) -> bool {
        self.cache.is_valid()
    }

    #[inline]
    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Record a pixel change: drops the filtered image synchronously.
    pub(crate) fn invalidate(&mut self) {
        self.cache.invalidate();
        self.touch();
    }

    /// Clear content to transparent.
    pub fn clear(&mut self) -> Outcome {
        self.content.clear();
        self.invalidate();
        Outcome::Applied
    }

    /// Fill content with a straight color.
    pub fn fill(&mut self, color: Color) -> Outcome {
        self.content.fill(color);
        self.invalidate();
        Outcome::Applied
    }

    /// Attach a fully visible mask.
    pub fn create_mask(&mut self) -> CanvasResult<Outcome> {
        if self.mask.is_some() {
            return Ok(Outcome::Unchanged);
        }
        self.mask = Some(MaskBuffer::filled(self.content.size(), 255)?);
        self.invalidate();
        Ok(Outcome::Applied)
    }

    /// Discard the mask and leave mask editing.
    pub fn delete_mask(&mut self) -> CanvasResult<Outcome> {
        if self.mask.take().is_none() {
            return Err(CanvasError::MaskAbsent);
        }
        self.mask_editing = false;
        self.invalidate();
        Ok(Outcome::Applied)
    }

    /// Switch drawing between content and mask.
    ///
    /// Allowed without a mask; drawing then keeps going to the content.
    pub fn set_mask_editing(&mut self, editing: bool) -> Outcome {
        if editing == self.mask_editing {
            return Outcome::Unchanged;
        }
        self.mask_editing = editing;
        self.touch();
        Outcome::Applied
    }

    /// Enter or update text authoring: re-render content from `descriptor`.
    ///
    /// `None` leaves authoring without touching pixels, like [`Layer::rasterize`].
    /// When the renderer fails the layer is left exactly as it was.
    pub fn set_text(
        &mut self,
        descriptor: Option<TextDescriptor>,
        renderer: &dyn TextRenderer,
    ) -> CanvasResult<Outcome> {
        let Some(descriptor) = descriptor else {
            return Ok(self.rasterize());
        };

        let Some(rendered) = renderer.render(&descriptor, self.content.size()) else {
            tracing::warn!(layer = ?self.id, "text renderer produced no pixels");
            return Err(CanvasError::TextUnavailable);
        };
        self.content.clear();
        self.content.replace_from(&rendered);
        self.text = Some(descriptor);
        self.invalidate();
        Ok(Outcome::Applied)
    }

    /// Drop the text descriptor, keeping pixels.
    pub fn rasterize(&mut self) -> Outcome {
        if self.text.take().is_none() {
            return Outcome::Unchanged;
        }
        self.touch();
        Outcome::Applied
    }

    /// Set the descriptor without re-rendering, for history replay onto
    /// pixels that already match it.
    pub fn restore_text_descriptor(&mut self, descriptor: Option<TextDescriptor>) {
        self.text = descriptor;
        self.touch();
    }

    /// Content with the layer's own mask applied.
    pub fn masked_content(&self) -> CanvasResult<Cow<'_, PixelBuffer>> {
        match &self.mask {
            None => Ok(Cow::Borrowed(&self.content)),
            Some(mask) => {
                let mut masked = PixelBuffer::with_size(self.content.size())?;
                masked.replace_from(&self.content);
                apply_mask(&mut masked, mask);
                Ok(Cow::Owned(masked))
            }
        }
    }

    /// Content after effects, cached until the next content, mask or
    /// effects change.
    ///
    /// `None` when there are no effects or the renderer fails; a failure
    /// leaves the cache dirty so the next call retries. The mask is never
    /// part of the filtered input.
    pub fn cached_filtered_image(&self, renderer: &dyn EffectsRenderer) -> Option<FilteredImage> {
        if self.effects.is_empty() {
            return None;
        }
        if let Some(image) = self.cache.get() {
            tracing::trace!(layer = ?self.id, "filter cache hit");
            return Some(image);
        }

        let generation = self.cache.generation();
        let margin = renderer.margin_for(&self.effects);
        let Some(buffer) = renderer.apply(&self.effects, &self.content) else {
            tracing::warn!(layer = ?self.id, "effects renderer failed, using unfiltered content");
            return None;
        };
        let image = FilteredImage {
            buffer: Arc::new(buffer),
            margin,
        };
        self.cache.publish(generation, image.clone());
        Some(image)
    }

    /// Fill the cache on the rayon pool.
    ///
    /// A result that finishes after a later invalidation is discarded.
    pub fn request_filtered_image(&self, renderer: Arc<dyn EffectsRenderer>) -> PendingFilter {
        if self.effects.is_empty() || self.cache.is_valid() {
            return PendingFilter::ready();
        }
        self.cache
            .fill_in_background(renderer, self.effects.clone(), self.content.clone())
    }

    /// Copy of the content buffer for history.
    pub fn snapshot_content(&self) -> PixelBuffer {
        self.content.clone()
    }

    /// Put back a content buffer taken by [`Layer::snapshot_content`].
    pub fn restore_content(&mut self, content: PixelBuffer) -> CanvasResult<Outcome> {
        if content.size() != self.content.size() {
            return Err(CanvasError::image("snapshot size does not match layer"));
        }
        self.content = content;
        self.invalidate();
        Ok(Outcome::Applied)
    }

    /// Copy of the mask for history.
    pub fn snapshot_mask(&self) -> Option<MaskBuffer> {
        self.mask.clone()
    }

    /// Put back a mask taken by [`Layer::snapshot_mask`], including its absence.
    pub fn restore_mask(&mut self, mask: Option<MaskBuffer>) -> CanvasResult<Outcome> {
        if let Some(m) = &mask {
            if m.size() != self.content.size() {
                return Err(CanvasError::image("mask snapshot size does not match layer"));
            }
        }
        if mask.is_none() {
            self.mask_editing = false;
        }
        self.mask = mask;
        self.invalidate();
        Ok(Outcome::Applied)
    }

    /// Capture pixels, mask and text descriptor.
    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            content: self.snapshot_content(),
            mask: self.snapshot_mask(),
            text: self.text.clone(),
        }
    }

    /// Restore everything captured by [`Layer::snapshot`] without re-rendering.
    pub fn restore(&mut self, snapshot: LayerSnapshot) -> CanvasResult<Outcome> {
        let LayerSnapshot { content, mask, text } = snapshot;
        if content.size() != self.content.size()
            || mask.as_ref().is_some_and(|m| m.size() != self.content.size())
        {
            return Err(CanvasError::image("snapshot size does not match layer"));
        }
        self.restore_content(content)?;
        self.restore_mask(mask)?;
        self.restore_text_descriptor(text);
        Ok(Outcome::Applied)
    }
}
