//! Frost Backdrop Blur Pipeline
//!
//! Blurs arbitrary rectangular regions of a live UI layer and composites them into
//! per-region destination surfaces.
//!
//! # Features
//!
//! - **Shared capture**: the UI content is captured once per change at full and
//!   downsampled resolution; every region samples the same downsampled texture
//! - **Render objects**: per-region geometry, style, mask and single-flight redraws
//! - **Effect chain**: separable Gaussian blur in linear light, mask, tint and grain
//! - **Render thread**: a dedicated GPU command thread with coalesced updates and
//!   completion signals handed back to the UI thread
//!
//! # Example
//!
//! ```ignore
//! use frost_pipeline::{BackdropRenderer, FrameCapture, PipelineConfig};
//! use frost_gpu::SoftwareBackend;
//!
//! let renderer = BackdropRenderer::new(PipelineConfig::default(), SoftwareBackend::new(), content)?;
//! let capture = FrameCapture::new();
//! renderer.attach("toolbar", Size::new(320.0, 48.0), capture.clone());
//! renderer.update_style("toolbar", Style::new(16.0).tint(Color::WHITE.with_alpha(0.3))).wait()?;
//! ```

pub mod completion;
pub mod config;
pub mod content;
pub mod effects;
pub mod error;
pub mod mask;
pub mod noise;
pub mod pipeline;
pub mod presentation;
pub mod render_object;
mod render_thread;
pub mod renderer;
pub mod shared_layer;

pub use completion::{Completion, CompletionSender, RenderCanceled};
pub use config::PipelineConfig;
pub use content::{ContentCanvas, UiContent};
pub use effects::{BlurParams, EffectCoordinator, EffectState, SizedTexture};
pub use error::{PipelineError, Result};
pub use mask::{rasterize_mask, MaskRenderer};
pub use noise::noise_pass;
pub use pipeline::{FrameInfo, Pipeline, PipelineStats, RegionUpdate};
pub use presentation::{CapturedFrame, FrameCapture, PresentationTarget};
pub use render_object::{map_to_low_res, ObjectKey, RenderObject, RenderState};
pub use renderer::BackdropRenderer;
pub use shared_layer::SharedSourceLayer;
