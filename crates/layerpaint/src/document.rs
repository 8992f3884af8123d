//! Builds a demo document from command-line options.

use anyhow::{Context, Result};
use common::{Color, PixelRect, Size};
use compositor::{LayerStack, StackConfig};
use raster::{BlendMode, Effect, Effects, FontTextRenderer, TextDescriptor};
use std::path::PathBuf;
use tracing::debug;

/// What to put in the generated document.
#[derive(Debug, Clone, Default)]
pub struct DocumentPlan {
    pub size: Size,
    pub layers: usize,
    pub clip: bool,
    pub blur: Option<u32>,
    pub top_blend: Option<BlendMode>,
    pub image: Option<PathBuf>,
    pub text: Option<String>,
    pub font: Option<PathBuf>,
}

const PALETTE: [Color; 4] = [
    Color::rgba(220, 60, 60, 230),
    Color::rgba(60, 160, 220, 200),
    Color::rgba(240, 200, 40, 180),
    Color::rgba(90, 200, 120, 255),
];

pub fn build(plan: &DocumentPlan, config: StackConfig) -> Result<LayerStack> {
    let mut stack = LayerStack::new(plan.size, config)?;

    if let Some(path) = &plan.image {
        let image = image::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .to_rgba8();
        stack.add_layer_from_image("Image", &image)?;
        debug!(path = %path.display(), "imported image");
    }

    let Size { width, height } = plan.size;
    for i in 0..plan.layers {
        stack.add_layer(format!("Layer {}", i + 1))?;
        let index = stack.active_index();

        let band = PixelRect::new(
            (width as usize * i / (plan.layers + 1)) as i32,
            (height as usize * i / (plan.layers * 2 + 1)) as i32,
            width / 2,
            height / 2,
        );
        stack
            .active_layer_mut()
            .begin_drawing(None)?
            .fill_rect(band, PALETTE[i % PALETTE.len()]);

        stack.set_blend_mode(index, BlendMode::ALL[i % BlendMode::ALL.len()])?;
        stack.set_opacity(index, 1.0 - 0.1 * (i % 5) as f32)?;
        if plan.clip && i % 2 == 1 {
            stack.set_clip_member(index, true)?;
        }
    }

    let top = stack.active_index();
    if let Some(radius) = plan.blur {
        stack.set_effects(top, Effects::new().with(Effect::Blur { radius }))?;
    }
    if let Some(mode) = plan.top_blend {
        stack.set_blend_mode(top, mode)?;
    }

    if let Some(text) = &plan.text {
        let path = plan
            .font
            .as_ref()
            .context("--text needs --font to render glyphs")?;
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let renderer = FontTextRenderer::from_bytes(&data)?;
        let descriptor = TextDescriptor::new(text.clone(), (height / 8).max(8) as f32, Color::BLACK)
            .at(8, 8);
        stack.add_text_layer(descriptor, &renderer)?;
    }

    Ok(stack)
}
