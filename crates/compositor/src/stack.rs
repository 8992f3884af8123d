//! Ordered layer stack backed by a slot-map arena.

use crate::config::StackConfig;
use crate::events::StackEvent;
use crate::layer::{Layer, LayerFlags, LayerId};
use common::{CanvasError, CanvasResult, Outcome, Size};
use image::RgbaImage;
use raster::{
    fit_image_to_canvas, BlendMode, CompositeOp, Effects, EffectsRenderer, PixelBuffer,
    TextDescriptor, TextRenderer,
};
use slotmap::SlotMap;
use std::borrow::Cow;

/// Attributes of one layer, as shown in a layers panel.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInfo {
    pub id: LayerId,
    pub index: usize,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub flags: LayerFlags,
    pub has_mask: bool,
    pub mask_editing: bool,
    pub has_text: bool,
    pub has_effects: bool,
    pub active: bool,
}

/// Layers of one canvas, index 0 at the bottom.
///
/// The arena owns every layer. Layers removed for undo stay in the arena,
/// detached from the order, until [`LayerStack::purge_layer`] frees them.
#[derive(Debug)]
pub struct LayerStack {
    pub(crate) layers: SlotMap<LayerId, Layer>,
    pub(crate) order: Vec<LayerId>,
    active: usize,
    size: Size,
    config: StackConfig,
    events: Vec<StackEvent>,
    revision: u64,
}

impl LayerStack {
    /// Create a stack holding a single background layer.
    pub fn new(size: Size, config: StackConfig) -> CanvasResult<Self> {
        config.validate(size)?;

        let mut content = PixelBuffer::with_size(size)?;
        content.fill(config.background);
        let mut layers = SlotMap::with_key();
        let name = config.background_name.clone();
        let id = layers.insert_with_key(|id| Layer::new(id, name, content));
        if config.lock_background {
            layers[id].set_flag(LayerFlags::LOCKED, true);
        }

        tracing::debug!(width = size.width, height = size.height, "created layer stack");
        Ok(Self {
            layers,
            order: vec![id],
            active: 0,
            size,
            config,
            events: Vec::new(),
            revision: 0,
        })
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Number of attached layers. Never zero.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[inline]
    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn set_active_index(&mut self, index: usize) -> CanvasResult<Outcome> {
        self.check_index(index)?;
        if index == self.active {
            return Ok(Outcome::Unchanged);
        }
        self.active = index;
        self.record(StackEvent::ActiveChanged { index });
        Ok(Outcome::Applied)
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.order[self.active]]
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.order[self.active]]
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.order.get(index).map(|&id| &self.layers[id])
    }

    /// Direct access for drawing tools. Pair edits with
    /// [`LayerStack::notify_content_changed`] when observers need to know.
    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        let id = *self.order.get(index)?;
        self.layers.get_mut(id)
    }

    /// Look up an attached or detached layer.
    pub fn layer_by_id(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn layer_by_id_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.order.iter().position(|&other| other == id)
    }

    /// Attached layer ids, bottom first.
    pub fn ids(&self) -> &[LayerId] {
        &self.order
    }

    /// Attached layers, bottom first.
    pub fn iter(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.order.iter().map(move |&id| &self.layers[id])
    }

    pub fn layer_infos(&self) -> Vec<LayerInfo> {
        self.iter()
            .enumerate()
            .map(|(index, layer)| LayerInfo {
                id: layer.id(),
                index,
                name: layer.name().to_owned(),
                visible: layer.is_visible(),
                opacity: layer.opacity(),
                blend_mode: layer.blend_mode(),
                flags: layer.flags(),
                has_mask: layer.has_mask(),
                mask_editing: layer.is_mask_editing(),
                has_text: layer.text().is_some(),
                has_effects: !layer.effects().is_empty(),
                active: index == self.active,
            })
            .collect()
    }

    /// Add a transparent layer above the active one and make it active.
    pub fn add_layer(&mut self, name: impl Into<String>) -> CanvasResult<LayerId> {
        let content = PixelBuffer::with_size(self.size)?;
        Ok(self.attach_new(name.into(), content))
    }

    /// Add a layer holding `image` scaled to fit the canvas, never enlarged,
    /// and centered.
    pub fn add_layer_from_image(
        &mut self,
        name: impl Into<String>,
        image: &RgbaImage,
    ) -> CanvasResult<LayerId> {
        let content = fit_image_to_canvas(image, self.size, self.config.max_import_size)?;
        Ok(self.attach_new(name.into(), content))
    }

    /// Add a layer rendered from `descriptor`, left in text authoring mode.
    ///
    /// Nothing is added when the renderer fails.
    pub fn add_text_layer(
        &mut self,
        descriptor: TextDescriptor,
        renderer: &dyn TextRenderer,
    ) -> CanvasResult<LayerId> {
        let Some(rendered) = renderer.render(&descriptor, self.size) else {
            tracing::warn!("text renderer produced no pixels");
            return Err(CanvasError::TextUnavailable);
        };
        let mut content = PixelBuffer::with_size(self.size)?;
        content.replace_from(&rendered);

        let name = descriptor.text.clone();
        let id = self.attach_new(name, content);
        self.layers[id].restore_text_descriptor(Some(descriptor));
        Ok(id)
    }

    fn attach_new(&mut self, name: String, content: PixelBuffer) -> LayerId {
        let id = self
            .layers
            .insert_with_key(|id| Layer::new(id, name, content));
        let index = (self.active + 1).min(self.order.len());
        self.order.insert(index, id);
        self.active = index;
        tracing::debug!(?id, index, "added layer");
        self.record(StackEvent::LayerAdded { id, index });
        id
    }

    /// Detach the layer at `index`, keeping it in the arena for history.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range. Only history replay should call
    /// this, with indices it recorded itself.
    pub fn remove_layer_for_undo(&mut self, index: usize) -> LayerId {
        self.detach(index)
    }

    /// Re-attach a layer previously detached from this stack.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a detached layer of this stack or `index` is
    /// past the end.
    pub fn insert_layer_for_undo(&mut self, id: LayerId, index: usize) {
        assert!(self.is_detached(id), "layer {id:?} is not detached from this stack");
        assert!(index <= self.order.len(), "insert index {index} past end");
        self.order.insert(index, id);
        self.active = index;
        tracing::debug!(?id, index, "re-inserted layer");
        self.record(StackEvent::LayerAdded { id, index });
    }

    /// Remove the layer at `index` on user request.
    ///
    /// Refuses to remove the last layer or a locked one. The layer stays
    /// detached in the arena so history can re-insert it.
    pub fn delete_layer(&mut self, index: usize) -> CanvasResult<LayerId> {
        self.check_index(index)?;
        if self.order.len() == 1 {
            return Err(CanvasError::LastLayer);
        }
        if self.layers[self.order[index]].is_locked() {
            return Err(CanvasError::LayerLocked);
        }
        Ok(self.detach(index))
    }

    fn detach(&mut self, index: usize) -> LayerId {
        let id = self.order.remove(index);
        let previous = self.active;
        if index < self.active {
            self.active -= 1;
        }
        self.active = self.active.min(self.order.len().saturating_sub(1));

        tracing::debug!(?id, index, "removed layer");
        self.record(StackEvent::LayerRemoved { id, index });
        if self.active != previous {
            self.record(StackEvent::ActiveChanged { index: self.active });
        }
        id
    }

    /// Whether `id` lives in the arena but is not in the stack.
    pub fn is_detached(&self, id: LayerId) -> bool {
        self.layers.contains_key(id) && !self.order.contains(&id)
    }

    /// Free a detached layer. Attached layers are left alone.
    pub fn purge_layer(&mut self, id: LayerId) -> Option<Layer> {
        if !self.is_detached(id) {
            return None;
        }
        tracing::trace!(?id, "purged layer");
        self.layers.remove(id)
    }

    /// Move a layer from one index to another.
    ///
    /// The active layer stays active: its index follows it whether it is the
    /// moved layer or another layer moves across it.
    pub fn move_layer(&mut self, from: usize, to: usize) -> CanvasResult<Outcome> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(Outcome::Unchanged);
        }
        let active_id = self.order[self.active];
        let id = self.order.remove(from);
        self.order.insert(to, id);

        let previous = self.active;
        if let Some(index) = self.index_of(active_id) {
            self.active = index;
        }
        tracing::debug!(?id, from, to, "moved layer");
        self.record(StackEvent::LayerMoved { id, from, to });
        if self.active != previous {
            self.record(StackEvent::ActiveChanged { index: self.active });
        }
        Ok(Outcome::Applied)
    }

    /// Flatten the layer at `index` onto the one below it.
    ///
    /// Both layers lose their text descriptors. The upper layer is masked,
    /// its effects are baked in, and the result is drawn at its opacity and
    /// blend mode. A hidden upper layer contributes nothing, and a clip
    /// member merged onto its base stays inside the base's alpha. The upper layer is detached, not destroyed; its pixels
    /// are left as they were so history can restore it. Returns its id.
    pub fn merge_down(
        &mut self,
        index: usize,
        renderer: &dyn EffectsRenderer,
    ) -> CanvasResult<LayerId> {
        if index == 0 || index >= self.order.len() {
            return Err(CanvasError::index(index, self.order.len()));
        }
        let (upper_id, lower_id) = (self.order[index], self.order[index - 1]);
        let [upper, lower] = self
            .layers
            .get_disjoint_mut([upper_id, lower_id])
            .ok_or(CanvasError::UnknownLayer)?;

        let masked = upper.masked_content()?;
        let (baked, (dx, dy)): (Cow<'_, PixelBuffer>, _) = if upper.effects().is_empty() {
            (masked, (0, 0))
        } else {
            let margin = renderer.margin_for(upper.effects());
            match renderer.apply(upper.effects(), &masked) {
                Some(filtered) => (Cow::Owned(filtered), margin.origin()),
                None => {
                    tracing::warn!(layer = ?upper_id, "effects renderer failed, merging unfiltered");
                    (masked, (0, 0))
                }
            }
        };

        if upper.is_visible() {
            let op = if upper.is_clip_member() && !lower.is_clip_member() {
                CompositeOp::Atop
            } else {
                CompositeOp::Over
            };
            let (opacity, mode) = (upper.opacity(), upper.blend_mode());
            lower.content.composite(&baked, dx, dy, opacity, mode, op);
        }
        drop(baked);

        upper.rasterize();
        lower.rasterize();
        lower.invalidate();

        self.order.remove(index);
        let previous = self.active;
        self.active = index - 1;
        tracing::debug!(removed = ?upper_id, into = ?lower_id, "merged layer down");
        self.record(StackEvent::LayerRemoved { id: upper_id, index });
        self.record(StackEvent::LayersMerged {
            removed: upper_id,
            into: lower_id,
        });
        if self.active != previous {
            self.record(StackEvent::ActiveChanged { index: self.active });
        }
        Ok(upper_id)
    }

    pub fn set_opacity(&mut self, index: usize, opacity: f32) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_opacity(opacity))
    }

    pub fn toggle_visibility(&mut self, index: usize) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_visible(!layer.is_visible()))
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_visible(visible))
    }

    pub fn set_blend_mode(&mut self, index: usize, mode: BlendMode) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_blend_mode(mode))
    }

    pub fn set_clip_member(&mut self, index: usize, on: bool) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_flag(LayerFlags::CLIP_MEMBER, on))
    }

    pub fn set_locked(&mut self, index: usize, on: bool) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_flag(LayerFlags::LOCKED, on))
    }

    pub fn set_alpha_locked(&mut self, index: usize, on: bool) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_flag(LayerFlags::ALPHA_LOCKED, on))
    }

    pub fn set_reference(&mut self, index: usize, on: bool) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_flag(LayerFlags::REFERENCE, on))
    }

    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> CanvasResult<Outcome> {
        let name = name.into();
        self.update(index, |layer| layer.set_name(name))
    }

    pub fn set_effects(&mut self, index: usize, effects: Effects) -> CanvasResult<Outcome> {
        self.update(index, |layer| layer.set_effects(effects))
    }

    /// Record that a layer's pixels were edited through [`LayerStack::layer_mut`].
    pub fn notify_content_changed(&mut self, id: LayerId) {
        if self.layers.contains_key(id) {
            self.record(StackEvent::ContentChanged { id });
        }
    }

    /// Take every event recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<StackEvent> {
        std::mem::take(&mut self.events)
    }

    /// Counter bumped by every recorded event.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn update(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Layer) -> Outcome,
    ) -> CanvasResult<Outcome> {
        self.check_index(index)?;
        let id = self.order[index];
        let outcome = f(&mut self.layers[id]);
        if outcome.is_applied() {
            self.record(StackEvent::AttributesChanged { id });
        }
        Ok(outcome)
    }

    fn check_index(&self, index: usize) -> CanvasResult<()> {
        if index < self.order.len() {
            Ok(())
        } else {
            Err(CanvasError::index(index, self.order.len()))
        }
    }

    fn record(&mut self, event: StackEvent) {
        self.events.push(event);
        self.revision += 1;
    }
}
