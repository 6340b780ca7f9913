//! Headless Backdrop Blur
//!
//! Renders a synthetic UI layer, blurs three regions of it and writes each
//! composited frame to a PNG:
//! - a tinted toolbar across the top
//! - a floating card with a fade-out mask
//! - a round badge with grain
//!
//! Run with: cargo run -p frost_pipeline --example headless -- --out target/frost
//! Add `--gpu` to render on a wgpu device instead of the software backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use frost_core::{Color, IntOffset, IntSize, MaskBrush, MaskStop, Point, Rect, Size, Style};
use frost_gpu::{GpuBackend, SoftwareBackend, WgpuBackend, WgpuBackendConfig};
use frost_pipeline::{
    BackdropRenderer, CapturedFrame, ContentCanvas, FrameCapture, PipelineConfig, RegionUpdate,
    UiContent,
};
use image::RgbaImage;

#[derive(Parser, Debug)]
#[command(about = "Render backdrop blur regions to PNG files")]
struct Args {
    /// Output directory
    #[arg(long, default_value = "frost-out")]
    out: PathBuf,

    /// Use a wgpu device instead of the software backend
    #[arg(long)]
    gpu: bool,

    /// Blur radius of the card, in dp
    #[arg(long, default_value_t = 12.0)]
    blur: f32,

    /// Optional TOML file with a pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

/// A colorful fake UI: gradient background, a grid of tiles and some stripes
struct DemoScene {
    size: IntSize,
}

impl UiContent for DemoScene {
    fn size(&self) -> IntSize {
        self.size
    }

    fn draw(&self, canvas: &mut ContentCanvas) {
        let (w, h) = (self.size.width, self.size.height);
        for y in 0..h {
            for x in 0..w {
                let t = x as f32 / w as f32;
                let u = y as f32 / h as f32;
                canvas.set_pixel(x, y, Color::rgb(0.1 + 0.5 * t, 0.2 + 0.3 * u, 0.6 - 0.3 * t));
            }
        }

        let palette = [
            Color::from_hex(0xff6b6b),
            Color::from_hex(0xfeca57),
            Color::from_hex(0x48dbfb),
            Color::from_hex(0x1dd1a1),
        ];
        for row in 0..6 {
            for col in 0..8 {
                let color = palette[(row + col) % palette.len()];
                canvas.fill_rect(
                    Rect::new(24.0 + col as f32 * 72.0, 64.0 + row as f32 * 64.0, 48.0, 40.0),
                    color,
                );
            }
        }

        for i in 0..12 {
            canvas.fill_rect(
                Rect::new(0.0, 8.0 + i as f32 * 4.0, w as f32, 1.0),
                Color::WHITE.with_alpha(0.8),
            );
        }
    }
}

fn save_png(path: &Path, frame: &CapturedFrame) -> Result<()> {
    let img = RgbaImage::from_raw(frame.size.width, frame.size.height, frame.pixels.clone())
        .context("frame buffer has the wrong length")?;
    img.save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}

fn start(config: PipelineConfig, gpu: bool, content: Arc<dyn UiContent>) -> Result<BackdropRenderer> {
    if gpu {
        let backend = WgpuBackend::new_blocking(WgpuBackendConfig::default())?;
        tracing::info!("rendering with {}", backend.name());
        Ok(BackdropRenderer::new(config, backend, content)?)
    } else {
        Ok(BackdropRenderer::new(config, SoftwareBackend::new(), content)?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            PipelineConfig::from_toml_str(&source)?
        }
        None => PipelineConfig::default(),
    };

    let content = Arc::new(DemoScene {
        size: IntSize::new(640, 480),
    });
    let renderer = start(config, args.gpu, content)?;

    let toolbar = FrameCapture::new();
    let card = FrameCapture::new();
    let badge = FrameCapture::new();
    renderer.attach("toolbar", Size::new(640.0, 56.0), toolbar.clone());
    renderer.attach("card", Size::new(280.0, 200.0), card.clone());
    renderer.attach("badge", Size::new(96.0, 96.0), badge.clone());

    let updates = [
        renderer.update_style("toolbar", Style::new(20.0).tint(Color::WHITE.with_alpha(0.5))),
        renderer.update_region(
            "card",
            RegionUpdate::new()
                .offset(IntOffset::new(180, 140))
                .style(Style::new(args.blur).tint(Color::BLACK.with_alpha(0.35)))
                .mask(Some(MaskBrush::vertical_fade(1.0, 0.0))),
        ),
        renderer.update_region(
            "badge",
            RegionUpdate::new()
                .offset(IntOffset::new(500, 340))
                .style(Style::new(8.0).noise(0.15))
                .mask(Some(MaskBrush::radial(
                    Point::new(48.0, 48.0),
                    48.0,
                    vec![MaskStop::new(0.95, 1.0), MaskStop::new(1.0, 0.0)],
                ))),
        ),
    ];
    for update in updates {
        update.wait()?;
    }

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    for (name, capture) in [("toolbar", &toolbar), ("card", &card), ("badge", &badge)] {
        let frame = capture
            .latest()
            .with_context(|| format!("{} was never presented", name))?;
        save_png(&args.out.join(format!("{}.png", name)), &frame)?;
    }

    if let Some(stats) = renderer.stats() {
        tracing::info!(
            "{} renders, {} draw calls, {} live textures ({} KiB)",
            stats.renders,
            stats.gpu.draw_calls,
            stats.gpu.live_textures,
            stats.gpu.live_bytes / 1024
        );
    }
    renderer.destroy();
    Ok(())
}
