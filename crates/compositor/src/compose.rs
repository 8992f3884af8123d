//! Flattening the stack into one image.

use crate::layer::Layer;
use crate::stack::LayerStack;
use common::CanvasResult;
use raster::{BlendMode, CompositeOp, EffectsRenderer, PixelBuffer};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::ops::Deref;
use std::sync::Arc;

/// A visible base layer and the clip members stacked directly above it.
///
/// Members are listed even when hidden; only a layer that is not a clip
/// member ends the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipRun {
    pub base: usize,
    pub members: SmallVec<[usize; 4]>,
}

impl ClipRun {
    #[inline]
    pub fn is_group(&self) -> bool {
        !self.members.is_empty()
    }
}

/// Pixels ready to place on the canvas.
enum Rendered<'a> {
    Borrowed(&'a PixelBuffer),
    Owned(PixelBuffer),
    Shared(Arc<PixelBuffer>),
}

impl Deref for Rendered<'_> {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        match self {
            Rendered::Borrowed(buffer) => buffer,
            Rendered::Owned(buffer) => buffer,
            Rendered::Shared(buffer) => buffer,
        }
    }
}

impl<'a> From<Cow<'a, PixelBuffer>> for Rendered<'a> {
    fn from(cow: Cow<'a, PixelBuffer>) -> Self {
        match cow {
            Cow::Borrowed(buffer) => Rendered::Borrowed(buffer),
            Cow::Owned(buffer) => Rendered::Owned(buffer),
        }
    }
}

impl LayerStack {
    /// Group the stack bottom-up into clip runs. Hidden layers cannot be a
    /// base; a clip member directly above one starts its own run.
    pub fn clip_runs(&self) -> Vec<ClipRun> {
        let mut runs = Vec::new();
        let mut cursor = 0;
        while cursor < self.order.len() {
            if !self.layer_at(cursor).is_visible() {
                cursor += 1;
                continue;
            }
            let base = cursor;
            cursor += 1;
            let mut members = SmallVec::new();
            while cursor < self.order.len() && self.layer_at(cursor).is_clip_member() {
                members.push(cursor);
                cursor += 1;
            }
            runs.push(ClipRun { base, members });
        }
        runs
    }

    /// Flatten every visible layer into a fresh canvas-sized buffer.
    ///
    /// Only reads layer state, apart from filling filter caches.
    pub fn compose(&self, renderer: &dyn EffectsRenderer) -> CanvasResult<PixelBuffer> {
        let mut canvas = PixelBuffer::with_size(self.size())?;
        let runs = self.clip_runs();
        tracing::trace!(runs = runs.len(), layers = self.len(), "compose");

        for run in &runs {
            let base = self.layer_at(run.base);
            if !run.is_group() {
                let (image, (dx, dy)) = self.render_layer(base, renderer)?;
                self.place(
                    &mut canvas,
                    &image,
                    dx,
                    dy,
                    base.opacity(),
                    base.blend_mode(),
                    CompositeOp::Over,
                );
                continue;
            }

            let mut group = base.masked_content()?.into_owned();
            for &index in &run.members {
                let member = self.layer_at(index);
                if !member.is_visible() {
                    continue;
                }
                let masked = member.masked_content()?;
                self.place(
                    &mut group,
                    &masked,
                    0,
                    0,
                    member.opacity(),
                    member.blend_mode(),
                    CompositeOp::Atop,
                );
            }

            let (image, (dx, dy)) = filter_live(base, Cow::Owned(group), renderer);
            self.place(
                &mut canvas,
                &image,
                dx,
                dy,
                1.0,
                base.blend_mode(),
                CompositeOp::Over,
            );
        }

        Ok(canvas)
    }

    fn layer_at(&self, index: usize) -> &Layer {
        &self.layers[self.order[index]]
    }

    /// A lone layer: masked content, then effects from the cache when it
    /// can be used, else rendered for this pass only.
    fn render_layer<'a>(
        &self,
        layer: &'a Layer,
        renderer: &dyn EffectsRenderer,
    ) -> CanvasResult<(Rendered<'a>, (i32, i32))> {
        if layer.effects().is_empty() {
            return Ok((layer.masked_content()?.into(), (0, 0)));
        }
        if self.config().effects_caching && !layer.has_mask() {
            return Ok(match layer.cached_filtered_image(renderer) {
                Some(filtered) => {
                    let origin = filtered.origin();
                    (Rendered::Shared(filtered.buffer), origin)
                }
                None => (Rendered::Borrowed(layer.content()), (0, 0)),
            });
        }
        Ok(filter_live(layer, layer.masked_content()?, renderer))
    }

    #[allow(clippy::too_many_arguments)]
    fn place(
        &self,
        dst: &mut PixelBuffer,
        src: &PixelBuffer,
        dx: i32,
        dy: i32,
        opacity: f32,
        mode: BlendMode,
        op: CompositeOp,
    ) {
        if self.config().parallel_compose {
            dst.composite_par(src, dx, dy, opacity, mode, op);
        } else {
            dst.composite(src, dx, dy, opacity, mode, op);
        }
    }
}

/// Run `layer`'s effects over `input` without touching the cache.
fn filter_live<'a>(
    layer: &Layer,
    input: Cow<'a, PixelBuffer>,
    renderer: &dyn EffectsRenderer,
) -> (Rendered<'a>, (i32, i32)) {
    if layer.effects().is_empty() {
        return (input.into(), (0, 0));
    }
    let margin = renderer.margin_for(layer.effects());
    match renderer.apply(layer.effects(), &input) {
        Some(filtered) => (Rendered::Owned(filtered), margin.origin()),
        None => {
            tracing::warn!(layer = ?layer.id(), "effects renderer failed, composing unfiltered");
            (input.into(), (0, 0))
        }
    }
}
