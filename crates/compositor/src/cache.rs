//! Filtered-image cache with generation-checked publishing.
//!
//! Every invalidation clears the stored image and bumps a generation counter
//! under the same lock. A filter result is only stored if the generation it
//! was started under is still current and no other result got there first.

use common::EdgeSizes;
use parking_lot::Mutex;
use raster::{Effects, EffectsRenderer, PixelBuffer};
use std::sync::mpsc;
use std::sync::Arc;

/// A layer's content after its effects, plus how far it extends past the
/// canvas on each side. Draw it at `(-margin.left, -margin.top)`.
#[derive(Clone, Debug)]
pub struct FilteredImage {
    pub buffer: Arc<PixelBuffer>,
    pub margin: EdgeSizes,
}

impl FilteredImage {
    /// Canvas-space position of the buffer's top-left pixel.
    #[inline]
    pub fn origin(&self) -> (i32, i32) {
        self.margin.origin()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    filtered: Option<FilteredImage>,
    generation: u64,
}

#[derive(Debug, Default)]
pub(crate) struct EffectsCache {
    state: Arc<Mutex<CacheState>>,
}

impl EffectsCache {
    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock();
        state.filtered = None;
        state.generation = state.generation.wrapping_add(1);
    }

    pub(crate) fn get(&self) -> Option<FilteredImage> {
        self.state.lock().filtered.clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.state.lock().filtered.is_some()
    }

    /// Store `image` if `generation` is current and the slot is empty.
    pub(crate) fn publish(&self, generation: u64, image: FilteredImage) -> bool {
        publish(&self.state, generation, image)
    }

    /// Run the filter on the rayon pool and publish when it finishes.
    pub(crate) fn fill_in_background(
        &self,
        renderer: Arc<dyn EffectsRenderer>,
        effects: Effects,
        content: PixelBuffer,
    ) -> PendingFilter {
        let (tx, rx) = mpsc::channel();
        let state = Arc::clone(&self.state);
        let generation = self.generation();

        rayon::spawn(move || {
            let margin = renderer.margin_for(&effects);
            let published = match renderer.apply(&effects, &content) {
                Some(buffer) => {
                    let image = FilteredImage {
                        buffer: Arc::new(buffer),
                        margin,
                    };
                    let stored = publish(&state, generation, image);
                    if !stored {
                        tracing::trace!(generation, "discarding stale filter result");
                    }
                    stored
                }
                None => {
                    tracing::warn!("effects renderer failed in background fill");
                    false
                }
            };
            let _ = tx.send(published);
        });

        PendingFilter { rx: Some(rx) }
    }
}

fn publish(state: &Mutex<CacheState>, generation: u64, image: FilteredImage) -> bool {
    let mut state = state.lock();
    if state.generation != generation || state.filtered.is_some() {
        return false;
    }
    state.filtered = Some(image);
    true
}

/// Handle to a background cache fill.
#[derive(Debug)]
pub struct PendingFilter {
    rx: Option<mpsc::Receiver<bool>>,
}

impl PendingFilter {
    /// A request that needed no work.
    pub(crate) fn ready() -> Self {
        Self { rx: None }
    }

    /// Block until the fill finishes. `true` if its result was stored.
    pub fn wait(self) -> bool {
        match self.rx {
            Some(rx) => rx.recv().unwrap_or(false),
            None => false,
        }
    }
}
