//! Opaque layer state for an external undo manager.

use raster::{MaskBuffer, PixelBuffer, TextDescriptor};

/// Pixels, mask and text descriptor of one layer at a point in time.
///
/// Produced by [`crate::Layer::snapshot`] and consumed by
/// [`crate::Layer::restore`]. The history manager only stores these; it never
/// needs to understand drawing.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSnapshot {
    pub content: PixelBuffer,
    pub mask: Option<MaskBuffer>,
    pub text: Option<TextDescriptor>,
}

impl LayerSnapshot {
    /// Approximate heap footprint in bytes.
    pub fn byte_size(&self) -> usize {
        self.content.as_bytes().len() + self.mask.as_ref().map_or(0, |m| m.as_bytes().len())
    }
}
