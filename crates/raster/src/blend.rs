//! Blend modes and compositing of premultiplied buffers.

use crate::pixel::Pixel;
use crate::pixel_buffer::PixelBuffer;
use common::PixelRect;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Blend mode for combining a layer with the pixels beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    /// Normal colors, restricted to the destination's alpha.
    SourceAtop,
}

impl BlendMode {
    pub const ALL: [BlendMode; 13] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::SourceAtop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::SourceAtop => "source-atop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Separable blend function on straight channel values in [0, 1].
    fn channel(self, cb: f32, cs: f32) -> f32 {
        match self {
            BlendMode::Normal | BlendMode::SourceAtop => cs,
            BlendMode::Multiply => cb * cs,
            BlendMode::Screen => screen(cb, cs),
            BlendMode::Overlay => hard_light(cs, cb),
            BlendMode::Darken => cb.min(cs),
            BlendMode::Lighten => cb.max(cs),
            BlendMode::ColorDodge => {
                if cb <= 0.0 {
                    0.0
                } else if cs >= 1.0 {
                    1.0
                } else {
                    (cb / (1.0 - cs)).min(1.0)
                }
            }
            BlendMode::ColorBurn => {
                if cb >= 1.0 {
                    1.0
                } else if cs <= 0.0 {
                    0.0
                } else {
                    1.0 - ((1.0 - cb) / cs).min(1.0)
                }
            }
            BlendMode::HardLight => hard_light(cb, cs),
            BlendMode::SoftLight => soft_light(cb, cs),
            BlendMode::Difference => (cb - cs).abs(),
            BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
        }
    }
}

#[inline]
fn screen(cb: f32, cs: f32) -> f32 {
    cb + cs - cb * cs
}

#[inline]
fn hard_light(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        cb * 2.0 * cs
    } else {
        screen(cb, 2.0 * cs - 1.0)
    }
}

fn soft_light(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
    } else {
        let d = if cb <= 0.25 {
            ((16.0 * cb - 12.0) * cb + 4.0) * cb
        } else {
            cb.sqrt()
        };
        cb + (2.0 * cs - 1.0) * (d - cb)
    }
}

/// Porter-Duff operator used when placing a blended source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositeOp {
    /// Source over destination.
    #[default]
    Over,
    /// Source atop destination: the result keeps the destination's alpha.
    Atop,
}

/// Composite one premultiplied source pixel onto a destination pixel.
///
/// `opacity` scales the source before blending. Arithmetic is carried in
/// `f32` and rounded once at the end.
pub fn composite_pixel(
    dst: Pixel,
    src: Pixel,
    opacity: f32,
    mode: BlendMode,
    op: CompositeOp,
) -> Pixel {
    let opacity = opacity.clamp(0.0, 1.0);
    if src.a == 0 || opacity <= 0.0 {
        return dst;
    }
    let op = if mode == BlendMode::SourceAtop { CompositeOp::Atop } else { op };

    let sa = src.a as f32 / 255.0 * opacity;
    let da = dst.a as f32 / 255.0;
    let s = [src.r, src.g, src.b].map(|c| c as f32 / 255.0 * opacity);
    let d = [dst.r, dst.g, dst.b].map(|c| c as f32 / 255.0);

    let mut out = [0.0f32; 3];
    for i in 0..3 {
        let mixed = match mode {
            BlendMode::Normal | BlendMode::SourceAtop => s[i],
            _ => {
                let cs = s[i] / sa;
                let cb = if da > 0.0 { d[i] / da } else { 0.0 };
                (1.0 - da) * s[i] + da * sa * mode.channel(cb, cs)
            }
        };
        out[i] = match op {
            CompositeOp::Over => mixed + d[i] * (1.0 - sa),
            CompositeOp::Atop => mixed * da + d[i] * (1.0 - sa),
        };
    }
    let out_a = match op {
        CompositeOp::Over => sa + da * (1.0 - sa),
        CompositeOp::Atop => da,
    };

    let a = to_u8(out_a);
    Pixel::new(to_u8(out[0]), to_u8(out[1]), to_u8(out[2]), a)
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

impl PixelBuffer {
    /// Composite `src` with its top-left corner at `(dx, dy)`.
    pub fn composite(
        &mut self,
        src: &PixelBuffer,
        dx: i32,
        dy: i32,
        opacity: f32,
        mode: BlendMode,
        op: CompositeOp,
    ) {
        self.composite_impl(src, dx, dy, opacity, mode, op, false);
    }

    /// Same as [`PixelBuffer::composite`], splitting rows across the rayon pool.
    pub fn composite_par(
        &mut self,
        src: &PixelBuffer,
        dx: i32,
        dy: i32,
        opacity: f32,
        mode: BlendMode,
        op: CompositeOp,
    ) {
        self.composite_impl(src, dx, dy, opacity, mode, op, true);
    }

    #[allow(clippy::too_many_arguments)]
    fn composite_impl(
        &mut self,
        src: &PixelBuffer,
        dx: i32,
        dy: i32,
        opacity: f32,
        mode: BlendMode,
        op: CompositeOp,
        parallel: bool,
    ) {
        let placed = PixelRect::new(dx, dy, src.width(), src.height());
        let Some(region) = placed.intersection(&self.bounds()) else {
            return;
        };
        if opacity <= 0.0 {
            return;
        }

        let stride = self.stride();
        let src_stride = src.stride();
        let x0 = region.x as usize;
        let width = region.width as usize;
        let src_x0 = (region.x as i64 - dx as i64) as usize;
        let src_y0 = region.y as i64 - dy as i64;
        let src_bytes = src.as_bytes();

        let blend_row = |y: usize, row: &mut [u8]| {
            let sy = (y as i64 - region.y as i64 + src_y0) as usize;
            let src_row = &src_bytes[sy * src_stride + src_x0 * 4..][..width * 4];
            let dst_row = &mut row[x0 * 4..(x0 + width) * 4];
            for (d, s) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                let out = composite_pixel(
                    Pixel::from_slice(d),
                    Pixel::from_slice(s),
                    opacity,
                    mode,
                    op,
                );
                out.write_to(d);
            }
        };

        let rows = region.y as usize..region.y as usize + region.height as usize;
        let data = self.data_mut();
        if parallel {
            data.par_chunks_exact_mut(stride)
                .enumerate()
                .skip(rows.start)
                .take(rows.len())
                .for_each(|(y, row)| blend_row(y, row));
        } else {
            for (y, row) in data.chunks_exact_mut(stride).enumerate().skip(rows.start).take(rows.len()) {
                blend_row(y, row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Color;

    fn solid(w: u32, h: u32, color: Color) -> PixelBuffer {
        let mut b = PixelBuffer::new(w, h).unwrap();
        b.fill(color);
        b
    }

    #[test]
    fn test_normal_half_opacity_over_white() {
        let out = composite_pixel(
            Pixel::from_color(Color::WHITE),
            Pixel::from_color(Color::RED),
            0.5,
            BlendMode::Normal,
            CompositeOp::Over,
        );
        assert_eq!(out, Pixel::new(255, 128, 128, 255));
    }

    #[test]
    fn test_over_transparent_is_identity() {
        let src = Pixel::new(30, 60, 90, 120);
        let out = composite_pixel(Pixel::TRANSPARENT, src, 1.0, BlendMode::Normal, CompositeOp::Over);
        assert_eq!(out, src);
    }

    #[test]
    fn test_atop_respects_destination_alpha() {
        let src = Pixel::from_color(Color::RED);
        let out = composite_pixel(Pixel::TRANSPARENT, src, 1.0, BlendMode::Normal, CompositeOp::Atop);
        assert_eq!(out, Pixel::TRANSPARENT);

        let out = composite_pixel(Pixel::new(0, 0, 0, 128), src, 1.0, BlendMode::Normal, CompositeOp::Atop);
        assert_eq!(out.a, 128);
        assert_eq!(out.r, 128);
    }

    #[test]
    fn test_source_atop_mode_implies_atop() {
        let src = Pixel::from_color(Color::RED);
        let out = composite_pixel(Pixel::TRANSPARENT, src, 1.0, BlendMode::SourceAtop, CompositeOp::Over);
        assert_eq!(out, Pixel::TRANSPARENT);
    }

    #[test]
    fn test_multiply_and_screen() {
        let gray = Pixel::from_color(Color::rgb(128, 128, 128));
        let white = Pixel::from_color(Color::WHITE);
        let black = Pixel::from_color(Color::BLACK);

        let out = composite_pixel(white, gray, 1.0, BlendMode::Multiply, CompositeOp::Over);
        assert_eq!(out, gray);
        let out = composite_pixel(black, gray, 1.0, BlendMode::Screen, CompositeOp::Over);
        assert_eq!(out, gray);
        let out = composite_pixel(white, white, 1.0, BlendMode::Difference, CompositeOp::Over);
        assert_eq!(out, black);
    }

    #[test]
    fn test_all_modes_keep_invariant() {
        let samples = [
            Pixel::new(0, 0, 0, 0),
            Pixel::new(10, 200, 90, 200),
            Pixel::new(255, 255, 255, 255),
            Pixel::new(3, 1, 0, 7),
            Pixel::new(128, 0, 64, 128),
        ];
        for mode in BlendMode::ALL {
            for op in [CompositeOp::Over, CompositeOp::Atop] {
                for &d in &samples {
                    for &s in &samples {
                        for opacity in [0.0, 0.3, 1.0] {
                            let out = composite_pixel(d, s, opacity, mode, op);
                            assert!(out.is_premultiplied(), "{:?} {:?} {:?} {:?}", mode, op, d, s);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_blend_mode_names() {
        for mode in BlendMode::ALL {
            assert_eq!(BlendMode::from_name(mode.name()), Some(mode));
        }
        let json = serde_json::to_string(&BlendMode::SourceAtop).unwrap();
        assert_eq!(json, "\"source-atop\"");
    }

    #[test]
    fn test_composite_offset_and_clip() {
        let mut dst = solid(4, 4, Color::WHITE);
        let src = solid(2, 2, Color::BLUE);
        dst.composite(&src, 3, -1, 1.0, BlendMode::Normal, CompositeOp::Over);
        assert_eq!(dst.get_pixel(3, 0), Pixel::from_color(Color::BLUE));
        assert_eq!(dst.get_pixel(3, 1), Pixel::from_color(Color::WHITE));
        assert_eq!(dst.get_pixel(2, 0), Pixel::from_color(Color::WHITE));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mut a = solid(17, 9, Color::rgba(10, 200, 30, 180));
        let mut b = a.clone();
        let mut src = PixelBuffer::new(11, 13).unwrap();
        for y in 0..13 {
            for x in 0..11 {
                src.set_pixel(x, y, Pixel::new((x * 20) as u8, (y * 15) as u8, 40, 200));
            }
        }
        a.composite(&src, 3, -2, 0.7, BlendMode::Overlay, CompositeOp::Over);
        b.composite_par(&src, 3, -2, 0.7, BlendMode::Overlay, CompositeOp::Over);
        assert_eq!(a, b);
    }
}
