//! Common utilities and types shared by the raster and compositor crates.

pub mod color;
pub mod geometry;
pub mod error;

pub use color::Color;
pub use geometry::{EdgeSizes, PixelRect, Size};
pub use error::{CanvasError, CanvasResult, Outcome};
