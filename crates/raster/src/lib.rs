//! Pixel storage and per-pixel operations for the layer engine.
//!
//! This crate handles:
//! - Premultiplied RGBA buffers and single-channel masks
//! - Blend modes and compositing operators
//! - The mask-apply rule
//! - Effects and text rendering seams, with software implementations
//! - Image import

pub mod pixel;
pub mod pixel_buffer;
pub mod mask;
pub mod blend;
pub mod effects;
pub mod text;
pub mod import;

pub use blend::{BlendMode, CompositeOp};
pub use effects::{Effect, Effects, EffectsRenderer, SoftwareEffects};
pub use import::{buffer_from_image, fit_image_to_canvas, image_from_buffer};
pub use mask::{apply_mask, MaskBuffer, SelectionMask};
pub use pixel::Pixel;
pub use pixel_buffer::{AlphaPlane, PixelBuffer};
pub use text::{FontTextRenderer, TextDescriptor, TextRenderer};
