//! Layerpaint - headless driver for the layer compositor.

mod document;

use anyhow::{Context, Result};
use clap::Parser;
use common::{Color, Size};
use compositor::StackConfig;
use raster::{image_from_buffer, BlendMode, PixelBuffer, SoftwareEffects};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use document::DocumentPlan;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Layerpaint - compose a generated layer document
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Canvas width
    #[arg(long, default_value = "512")]
    width: u32,

    /// Canvas height
    #[arg(long, default_value = "512")]
    height: u32,

    /// Number of painted layers above the background
    #[arg(short, long, default_value = "4")]
    layers: usize,

    /// Turn every second painted layer into a clip member
    #[arg(long)]
    clip: bool,

    /// Blur radius applied to the top painted layer
    #[arg(long)]
    blur: Option<u32>,

    /// Blend mode of the top painted layer (e.g. multiply, screen)
    #[arg(long)]
    blend: Option<String>,

    /// Image to import as a layer
    #[arg(long)]
    image: Option<PathBuf>,

    /// Text to add as a text layer
    #[arg(long)]
    text: Option<String>,

    /// Font file used for --text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Stack configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Background color as hex, overriding the configuration
    #[arg(long)]
    background: Option<String>,

    /// Number of compose passes to time
    #[arg(long, default_value = "1")]
    repeat: u32,

    /// Save the composed image to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn plan(&self) -> Result<DocumentPlan> {
        let top_blend = match &self.blend {
            Some(name) => Some(
                BlendMode::from_name(name)
                    .with_context(|| format!("unknown blend mode {name}"))?,
            ),
            None => None,
        };
        Ok(DocumentPlan {
            size: Size::new(self.width, self.height),
            layers: self.layers,
            clip: self.clip,
            blur: self.blur,
            top_blend,
            image: self.image.clone(),
            text: self.text.clone(),
            font: self.font.clone(),
        })
    }

    fn stack_config(&self) -> Result<StackConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                StackConfig::from_json(&json)?
            }
            None => StackConfig::default(),
        };
        if let Some(hex) = &self.background {
            let color = Color::from_hex(hex).with_context(|| format!("invalid color {hex}"))?;
            config = config.with_background(color);
        }
        Ok(config)
    }
}

fn checksum(buffer: &PixelBuffer) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    buffer.as_bytes().hash(&mut hasher);
    hasher.finish()
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Layerpaint v{}", VERSION);

    let config = args.stack_config()?;
    let stack = document::build(&args.plan()?, config)?;
    info!(layers = stack.len(), runs = stack.clip_runs().len(), "document ready");

    let renderer = SoftwareEffects;
    let passes = args.repeat.max(1);
    let start = Instant::now();
    let mut composed = stack.compose(&renderer)?;
    for _ in 1..passes {
        composed = stack.compose(&renderer)?;
    }
    info!(
        passes,
        per_pass_ms = start.elapsed().as_secs_f64() * 1000.0 / passes as f64,
        "composed"
    );

    println!("{}x{} checksum {:016x}", composed.width(), composed.height(), checksum(&composed));

    if let Some(path) = &args.output {
        image_from_buffer(&composed)?
            .save(path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        info!("Saved to: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::parse_from(["layerpaint"]);
        assert_eq!(args.width, 512);
        assert_eq!(args.layers, 4);
        assert!(!args.clip);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_args_plan() {
        let args = Args::parse_from([
            "layerpaint", "--width", "64", "--clip", "--blur", "3", "--blend", "screen",
        ]);
        let plan = args.plan().unwrap();
        assert_eq!(plan.size, Size::new(64, 512));
        assert!(plan.clip);
        assert_eq!(plan.blur, Some(3));
        assert_eq!(plan.top_blend, Some(BlendMode::Screen));

        let args = Args::parse_from(["layerpaint", "--blend", "sparkle"]);
        assert!(args.plan().is_err());
    }

    #[test]
    fn test_default_config_without_file() {
        let args = Args::parse_from(["layerpaint"]);
        assert!(args.stack_config().unwrap().effects_caching);
    }

    #[test]
    fn test_background_override() {
        let args = Args::parse_from(["layerpaint", "--background", "#00ff00"]);
        assert_eq!(args.stack_config().unwrap().background, Color::GREEN);

        let args = Args::parse_from(["layerpaint", "--background", "nope"]);
        assert!(args.stack_config().is_err());
    }

    #[test]
    fn test_checksum_changes_with_pixels() {
        let mut buffer = PixelBuffer::new(2, 2).unwrap();
        let before = checksum(&buffer);
        buffer.fill(Color::RED);
        assert_ne!(before, checksum(&buffer));
    }
}
