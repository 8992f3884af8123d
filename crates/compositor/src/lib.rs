//! Layer stack and compositor for a raster painting canvas.
//!
//! The compositor owns per-layer pixel data and flattens it into one image:
//! - visibility and opacity
//! - blend modes
//! - layer masks and alpha locking
//! - clipping groups
//! - cached, non-destructive effects
//!
//! All mutation is expected to be serialized by the caller; `compose` only
//! reads layer state and returns a fresh buffer.

pub mod cache;
pub mod config;
pub mod drawing;
pub mod events;
pub mod layer;
pub mod snapshot;
pub mod stack;
pub mod compose;

#[cfg(test)]
mod testing;

pub use cache::{FilteredImage, PendingFilter};
pub use compose::ClipRun;
pub use config::StackConfig;
pub use drawing::{DrawTarget, DrawingScope};
pub use events::StackEvent;
pub use layer::{ContentMode, Layer, LayerFlags, LayerId, TextMode};
pub use snapshot::LayerSnapshot;
pub use stack::{LayerInfo, LayerStack};
