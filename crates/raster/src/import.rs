//! Conversion between `image` crate buffers and premultiplied pixel buffers.

use crate::blend::{BlendMode, CompositeOp};
use crate::pixel::Pixel;
use crate::pixel_buffer::PixelBuffer;
use common::{CanvasError, CanvasResult, Size};
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Premultiply a straight-alpha image into a new buffer of the same size.
pub fn buffer_from_image(image: &RgbaImage) -> CanvasResult<PixelBuffer> {
    let mut buffer = PixelBuffer::new(image.width(), image.height())?;
    for (x, y, px) in image.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        buffer.set_pixel(x, y, Pixel::from_color(common::Color::rgba(r, g, b, a)));
    }
    Ok(buffer)
}

/// Straight-alpha copy of a buffer.
pub fn image_from_buffer(buffer: &PixelBuffer) -> CanvasResult<RgbaImage> {
    RgbaImage::from_raw(buffer.width(), buffer.height(), buffer.to_straight_rgba())
        .ok_or_else(|| CanvasError::image("buffer size does not match sample count"))
}

/// Place an image on a transparent canvas-sized buffer.
///
/// The image is scaled to fit with its aspect ratio kept, never upscaled,
/// then centered. `max_edge` further caps the placed size.
pub fn fit_image_to_canvas(
    image: &RgbaImage,
    canvas: Size,
    max_edge: Option<u32>,
) -> CanvasResult<PixelBuffer> {
    let mut out = PixelBuffer::with_size(canvas)?;
    let source = Size::new(image.width(), image.height());
    if source.is_empty() || canvas.is_empty() {
        return Ok(out);
    }

    let mut bounds = canvas;
    if let Some(edge) = max_edge {
        bounds = Size::new(bounds.width.min(edge), bounds.height.min(edge));
    }
    let target = source.fit_within(bounds);

    // Resample premultiplied data so transparent pixels do not bleed color.
    let premultiplied = buffer_from_image(image)?;
    let placed = if target == source {
        premultiplied
    } else {
        let raw = RgbaImage::from_raw(source.width, source.height, premultiplied.as_bytes().to_vec())
            .ok_or_else(|| CanvasError::image("buffer size does not match sample count"))?;
        let resized = imageops::resize(&raw, target.width, target.height, FilterType::Triangle);
        PixelBuffer::from_premultiplied(target.width, target.height, resized.into_raw())?
    };

    let dx = ((canvas.width - target.width) / 2) as i32;
    let dy = ((canvas.height - target.height) / 2) as i32;
    out.composite(&placed, dx, dy, 1.0, BlendMode::Normal, CompositeOp::Over);
    Ok(out)
}
