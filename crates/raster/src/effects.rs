//! Non-destructive layer effects.

use crate::blend::{BlendMode, CompositeOp};
use crate::pixel::Pixel;
use crate::pixel_buffer::PixelBuffer;
use common::{Color, EdgeSizes};
use serde::{Deserialize, Serialize};

/// Largest filtered output [`SoftwareEffects`] will allocate.
pub const MAX_FILTER_PIXELS: usize = 1 << 28;

/// A single filter step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Effect {
    /// Box blur.
    Blur { radius: u32 },
    /// Brightness scale (1.0 = unchanged).
    Brightness { amount: f32 },
    /// Grayscale conversion.
    Grayscale { amount: f32 },
    /// Invert colors.
    Invert { amount: f32 },
    /// Drop shadow.
    DropShadow {
        offset_x: i32,
        offset_y: i32,
        blur: u32,
        color: Color,
    },
}

impl Effect {
    /// Extra border this step needs around its input.
    pub fn margin(&self) -> EdgeSizes {
        match *self {
            Effect::Blur { radius } => EdgeSizes::all(radius),
            Effect::DropShadow {
                offset_x,
                offset_y,
                blur,
                ..
            } => {
                let pos = |v: i32| if v > 0 { v.unsigned_abs() } else { 0 };
                let neg = |v: i32| if v < 0 { v.unsigned_abs() } else { 0 };
                EdgeSizes::new(
                    blur.saturating_add(neg(offset_y)),
                    blur.saturating_add(pos(offset_x)),
                    blur.saturating_add(pos(offset_y)),
                    blur.saturating_add(neg(offset_x)),
                )
            }
            Effect::Brightness { .. } | Effect::Grayscale { .. } | Effect::Invert { .. } => {
                EdgeSizes::ZERO
            }
        }
    }
}

/// Ordered list of effects attached to a layer. Empty means unfiltered.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Effects {
    steps: Vec<Effect>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, effect: Effect) -> Self {
        self.steps.push(effect);
        self
    }

    pub fn push(&mut self, effect: Effect) {
        self.steps.push(effect);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.steps.iter()
    }
}

impl From<Vec<Effect>> for Effects {
    fn from(steps: Vec<Effect>) -> Self {
        Self { steps }
    }
}

/// Renders an effects descriptor over a buffer.
///
/// `apply` must return a buffer of the input size grown by
/// `margin_for(effects)`, with the input's origin at `(left, top)`.
/// Returning `None` means the effects could not be rendered; callers fall
/// back to the unfiltered buffer.
pub trait EffectsRenderer: Send + Sync {
    fn apply(&self, effects: &Effects, buffer: &PixelBuffer) -> Option<PixelBuffer>;

    fn margin_for(&self, effects: &Effects) -> EdgeSizes;
}

/// CPU implementation of every [`Effect`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareEffects;

impl EffectsRenderer for SoftwareEffects {
    fn apply(&self, effects: &Effects, buffer: &PixelBuffer) -> Option<PixelBuffer> {
        let margin = self.margin_for(effects);
        let size = margin.expand(buffer.size());
        if size.pixel_count().map_or(true, |n| n > MAX_FILTER_PIXELS) {
            tracing::warn!(width = size.width, height = size.height, "filtered output too large");
            return None;
        }
        let mut out = PixelBuffer::with_size(size).ok()?;
        let (x, y) = margin.origin();
        out.composite(
            buffer,
            -x,
            -y,
            1.0,
            BlendMode::Normal,
            CompositeOp::Over,
        );

        for effect in effects.iter() {
            match *effect {
                Effect::Blur { radius } => box_blur(&mut out, radius),
                Effect::Brightness { amount } => {
                    let amount = amount.max(0.0);
                    out.map_pixels(|p| {
                        let ch = |c: u8| (c as f32 * amount).round().min(p.a as f32) as u8;
                        Pixel::new(ch(p.r), ch(p.g), ch(p.b), p.a)
                    });
                }
                Effect::Grayscale { amount } => {
                    let t = amount.clamp(0.0, 1.0);
                    out.map_pixels(|p| {
                        let luma = 0.2126 * p.r as f32 + 0.7152 * p.g as f32 + 0.0722 * p.b as f32;
                        let ch = |c: u8| (c as f32 + (luma - c as f32) * t).round() as u8;
                        Pixel::new(ch(p.r), ch(p.g), ch(p.b), p.a)
                    });
                }
                Effect::Invert { amount } => {
                    let t = amount.clamp(0.0, 1.0);
                    out.map_pixels(|p| {
                        let ch = |c: u8| {
                            let inv = (p.a - c) as f32;
                            (c as f32 + (inv - c as f32) * t).round() as u8
                        };
                        Pixel::new(ch(p.r), ch(p.g), ch(p.b), p.a)
                    });
                }
                Effect::DropShadow {
                    offset_x,
                    offset_y,
                    blur,
                    color,
                } => {
                    let mut shadow = PixelBuffer::with_size(out.size()).ok()?;
                    let tint = Pixel::from_color(color);
                    for y in 0..out.height() {
                        for x in 0..out.width() {
                            let a = out.get_pixel(x, y).a as u32;
                            if a == 0 {
                                continue;
                            }
                            let scale = |c: u8| ((c as u32 * a + 127) / 255) as u8;
                            let sx = x as i64 + offset_x as i64;
                            let sy = y as i64 + offset_y as i64;
                            if sx >= 0 && sy >= 0 {
                                shadow.set_pixel(
                                    sx as u32,
                                    sy as u32,
                                    Pixel::new(scale(tint.r), scale(tint.g), scale(tint.b), scale(tint.a)),
                                );
                            }
                        }
                    }
                    box_blur(&mut shadow, blur);
                    shadow.composite(&out, 0, 0, 1.0, BlendMode::Normal, CompositeOp::Over);
                    out = shadow;
                }
            }
        }

        Some(out)
    }

    fn margin_for(&self, effects: &Effects) -> EdgeSizes {
        effects
            .iter()
            .fold(EdgeSizes::ZERO, |acc, effect| acc + effect.margin())
    }
}

/// Separable box blur on premultiplied samples; samples outside are transparent.
fn box_blur(buffer: &mut PixelBuffer, radius: u32) {
    if radius == 0 {
        return;
    }
    let (w, h) = (buffer.width() as usize, buffer.height() as usize);
    let r = radius as usize;
    let window = 2 * radius as u64 + 1;
    let mut line = Vec::new();

    let mut pass = |len: usize, count: usize, index: &dyn Fn(usize, usize) -> usize, data: &mut [u8]| {
        for i in 0..count {
            line.clear();
            line.extend((0..len).map(|j| {
                let o = index(i, j);
                [data[o], data[o + 1], data[o + 2], data[o + 3]]
            }));
            let mut sums = [0u64; 4];
            for px in line.iter().take(r.min(len)) {
                for c in 0..4 {
                    sums[c] += px[c] as u64;
                }
            }
            for j in 0..len {
                if r < len - j {
                    for c in 0..4 {
                        sums[c] += line[j + r][c] as u64;
                    }
                }
                if j > r {
                    for c in 0..4 {
                        sums[c] -= line[j - r - 1][c] as u64;
                    }
                }
                let o = index(i, j);
                for c in 0..4 {
                    data[o + c] = ((sums[c] + window / 2) / window) as u8;
                }
            }
        }
    };

    let data = buffer.data_mut();
    pass(w, h, &|row, col| (row * w + col) * 4, data);
    pass(h, w, &|col, row| (row * w + col) * 4, data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{PixelRect, Size};

    fn dot(size: u32) -> PixelBuffer {
        let mut buffer = PixelBuffer::new(size, size).unwrap();
        buffer.fill_rect(PixelRect::new(size as i32 / 2, size as i32 / 2, 1, 1), Color::WHITE);
        buffer
    }

    #[test]
    fn test_empty_effects_copy_input() {
        let input = dot(3);
        let out = SoftwareEffects.apply(&Effects::new(), &input).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_blur_margin_and_size() {
        let effects = Effects::new().with(Effect::Blur { radius: 2 });
        assert_eq!(SoftwareEffects.margin_for(&effects), EdgeSizes::all(2));

        let out = SoftwareEffects.apply(&effects, &dot(3)).unwrap();
        assert_eq!(out.size(), Size::new(7, 7));
        assert!(out.is_premultiplied());
        // Energy spreads to the margin.
        assert!(out.get_pixel(1, 1).a > 0);
        assert!(out.get_pixel(3, 3).a < 255);
    }

    #[test]
    fn test_drop_shadow_margin() {
        let effect = Effect::DropShadow {
            offset_x: 3,
            offset_y: -2,
            blur: 1,
            color: Color::BLACK,
        };
        assert_eq!(effect.margin(), EdgeSizes::new(3, 4, 1, 1));

        let out = SoftwareEffects.apply(&Effects::new().with(effect), &dot(1)).unwrap();
        assert_eq!(out.size(), Size::new(6, 5));
        // Original pixel sits at (left, top).
        assert_eq!(out.get_pixel(1, 3), Pixel::new(255, 255, 255, 255));
        assert!(out.get_pixel(4, 1).a > 0);
    }

    #[test]
    fn test_extreme_offsets_saturate() {
        let effect = Effect::DropShadow {
            offset_x: i32::MIN,
            offset_y: i32::MIN,
            blur: u32::MAX,
            color: Color::BLACK,
        };
        assert_eq!(
            effect.margin(),
            EdgeSizes::new(u32::MAX, u32::MAX, u32::MAX, u32::MAX)
        );
        let shadow = Effect::DropShadow {
            offset_x: i32::MIN,
            offset_y: i32::MAX,
            blur: 0,
            color: Color::BLACK,
        };
        assert_eq!(shadow.margin(), EdgeSizes::new(0, 0, i32::MAX as u32, 1 << 31));
        assert!(SoftwareEffects.apply(&Effects::new().with(shadow), &dot(1)).is_none());
    }

    #[test]
    fn test_oversized_output_is_refused() {
        let effects = Effects::from(vec![
            Effect::Blur { radius: u32::MAX },
            Effect::Blur { radius: u32::MAX },
        ]);
        assert_eq!(SoftwareEffects.margin_for(&effects), EdgeSizes::all(u32::MAX));
        assert!(SoftwareEffects.apply(&effects, &dot(3)).is_none());
    }

    #[test]
    fn test_wide_blur_radius_on_small_buffer() {
        let mut buffer = dot(3);
        box_blur(&mut buffer, u32::MAX / 2);
        assert!(buffer.is_premultiplied());
    }

    #[test]
    fn test_color_effects_keep_invariant() {
        let mut input = PixelBuffer::new(4, 1).unwrap();
        input.set_pixel(0, 0, Pixel::new(10, 120, 40, 128));
        input.set_pixel(1, 0, Pixel::new(255, 0, 0, 255));
        let effects = Effects::from(vec![
            Effect::Brightness { amount: 3.0 },
            Effect::Grayscale { amount: 0.5 },
            Effect::Invert { amount: 1.0 },
        ]);
        let out = SoftwareEffects.apply(&effects, &input).unwrap();
        assert!(out.is_premultiplied());
        assert_eq!(out.get_pixel(3, 0), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_invert_opaque() {
        let mut input = PixelBuffer::new(1, 1).unwrap();
        input.fill(Color::RED);
        let effects = Effects::new().with(Effect::Invert { amount: 1.0 });
        let out = SoftwareEffects.apply(&effects, &input).unwrap();
        assert_eq!(out.get_pixel(0, 0), Pixel::new(0, 255, 255, 255));
    }

    #[test]
    fn test_effects_json() {
        let effects: Effects =
            serde_json::from_str(r#"[{"type":"blur","radius":3},{"type":"invert","amount":1.0}]"#)
                .unwrap();
        assert_eq!(
            effects,
            Effects::from(vec![Effect::Blur { radius: 3 }, Effect::Invert { amount: 1.0 }])
        );
    }
}
