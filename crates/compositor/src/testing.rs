//! Renderer stubs shared by unit tests.

use common::{EdgeSizes, Size};
use parking_lot::{Condvar, Mutex};
use raster::{
    Effects, EffectsRenderer, PixelBuffer, SoftwareEffects, TextDescriptor, TextRenderer,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Software effects that count `apply` calls.
#[derive(Debug, Default)]
pub struct CountingEffects {
    calls: AtomicUsize,
}

impl CountingEffects {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EffectsRenderer for CountingEffects {
    fn apply(&self, effects: &Effects, buffer: &PixelBuffer) -> Option<PixelBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SoftwareEffects.apply(effects, buffer)
    }

    fn margin_for(&self, effects: &Effects) -> EdgeSizes {
        SoftwareEffects.margin_for(effects)
    }
}

/// Always fails to render.
#[derive(Debug, Default)]
pub struct FailingEffects;

impl EffectsRenderer for FailingEffects {
    fn apply(&self, _effects: &Effects, _buffer: &PixelBuffer) -> Option<PixelBuffer> {
        None
    }

    fn margin_for(&self, effects: &Effects) -> EdgeSizes {
        SoftwareEffects.margin_for(effects)
    }
}

/// Software effects that block in `apply` until [`GatedEffects::open`].
#[derive(Debug, Default)]
pub struct GatedEffects {
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedEffects {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl EffectsRenderer for GatedEffects {
    fn apply(&self, effects: &Effects, buffer: &PixelBuffer) -> Option<PixelBuffer> {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        drop(open);
        SoftwareEffects.apply(effects, buffer)
    }

    fn margin_for(&self, effects: &Effects) -> EdgeSizes {
        SoftwareEffects.margin_for(effects)
    }
}

/// Paints the whole canvas in the descriptor's color.
#[derive(Debug, Default)]
pub struct SolidText;

impl TextRenderer for SolidText {
    fn render(&self, descriptor: &TextDescriptor, size: Size) -> Option<PixelBuffer> {
        let mut out = PixelBuffer::with_size(size).ok()?;
        out.fill(descriptor.color);
        Some(out)
    }
}

#[derive(Debug, Default)]
pub struct FailingText;

impl TextRenderer for FailingText {
    fn render(&self, _descriptor: &TextDescriptor, _size: Size) -> Option<PixelBuffer> {
        None
    }
}
