//! Shared source capture
//!
//! Captures the UI content once per change into a full-resolution texture and a
//! downsampled copy. Every render object samples the downsampled texture; nothing
//! but [`SharedSourceLayer::refresh`] ever writes to either.

use frost_core::{Color, IntSize};
use frost_gpu::{DrawPass, GpuBackend, GpuError, Program, SubTexture, TextureId};

use crate::content::{ContentCanvas, UiContent};

struct CaptureTextures {
    /// Upload target bridging the content canvas to the GPU
    intermediate: TextureId,
    high_res: TextureId,
    low_res: TextureId,
    size: IntSize,
    low_res_size: IntSize,
}

enum LayerState {
    Uninitialized,
    Ready(CaptureTextures),
    Destroyed,
}

/// Full-resolution and downsampled captures of the UI content
pub struct SharedSourceLayer {
    downsample_factor: u32,
    state: LayerState,
    canvas: ContentCanvas,
    frame: u64,
}

impl SharedSourceLayer {
    pub fn new(downsample_factor: u32) -> Self {
        Self {
            downsample_factor: downsample_factor.max(1),
            state: LayerState::Uninitialized,
            canvas: ContentCanvas::new(IntSize::ZERO),
            frame: 0,
        }
    }

    /// Allocate both capture textures for content of `size`
    ///
    /// Returns `Ok(false)` without touching the GPU when `size` is empty. Calling it
    /// on a ready layer reallocates for the new size.
    pub fn initialize(
        &mut self,
        backend: &mut dyn GpuBackend,
        size: IntSize,
    ) -> Result<bool, GpuError> {
        assert!(
            !matches!(self.state, LayerState::Destroyed),
            "SharedSourceLayer::initialize called after destroy"
        );
        if size.is_empty() {
            tracing::debug!("shared layer not initialized: content size is empty");
            return Ok(false);
        }

        let low_res_size = size.downsampled(self.downsample_factor);
        let textures = Self::allocate(backend, size, low_res_size)?;
        if let LayerState::Ready(old) = std::mem::replace(&mut self.state, LayerState::Uninitialized)
        {
            Self::release(backend, old);
        }
        self.canvas.resize(size);
        self.state = LayerState::Ready(textures);

        tracing::debug!(
            "shared layer ready: {}x{} (low-res {}x{})",
            size.width,
            size.height,
            low_res_size.width,
            low_res_size.height
        );
        Ok(true)
    }

    /// Recreate the capture textures for new content size
    pub fn resize(&mut self, backend: &mut dyn GpuBackend, size: IntSize) -> Result<bool, GpuError> {
        assert!(
            self.is_ready(),
            "SharedSourceLayer::resize called on an uninitialized or destroyed layer"
        );
        self.initialize(backend, size)
    }

    fn allocate(
        backend: &mut dyn GpuBackend,
        size: IntSize,
        low_res_size: IntSize,
    ) -> Result<CaptureTextures, GpuError> {
        let intermediate = backend.create_texture("Frost Capture Surface", size)?;
        let high_res = match backend.create_texture("Frost High-Res Capture", size) {
            Ok(id) => id,
            Err(e) => {
                backend.destroy_texture(intermediate);
                return Err(e);
            }
        };
        let low_res = match backend.create_texture("Frost Low-Res Capture", low_res_size) {
            Ok(id) => id,
            Err(e) => {
                backend.destroy_texture(intermediate);
                backend.destroy_texture(high_res);
                return Err(e);
            }
        };
        Ok(CaptureTextures {
            intermediate,
            high_res,
            low_res,
            size,
            low_res_size,
        })
    }

    fn release(backend: &mut dyn GpuBackend, textures: CaptureTextures) {
        backend.destroy_texture(textures.intermediate);
        backend.destroy_texture(textures.high_res);
        backend.destroy_texture(textures.low_res);
    }

    /// Capture the current content into both textures
    ///
    /// Draws the content into the capture surface, copies it into the high-res
    /// texture with a full-target pass, then clears the low-res texture and blits the
    /// high-res texture into it with linear filtering. Returns the new frame number.
    ///
    /// # Panics
    ///
    /// If the layer is not initialized or was destroyed.
    pub fn refresh(
        &mut self,
        backend: &mut dyn GpuBackend,
        content: &dyn UiContent,
    ) -> Result<u64, GpuError> {
        let textures = match &self.state {
            LayerState::Ready(textures) => textures,
            LayerState::Uninitialized => {
                panic!("SharedSourceLayer::refresh called before initialize")
            }
            LayerState::Destroyed => panic!("SharedSourceLayer::refresh called after destroy"),
        };

        let _span = tracing::trace_span!("shared_layer_refresh", frame = self.frame + 1).entered();

        self.canvas.clear(Color::TRANSPARENT);
        content.draw(&mut self.canvas);
        backend.write_texture(textures.intermediate, self.canvas.pixels())?;

        backend.draw(&DrawPass {
            label: "Frost Capture Copy",
            program: Program::Copy,
            source: Some(SubTexture::full(textures.intermediate)),
            mask: None,
            target: textures.high_res,
        })?;

        backend.clear(textures.low_res, Color::TRANSPARENT)?;
        backend.blit(SubTexture::full(textures.high_res), textures.low_res)?;

        self.frame += 1;
        Ok(self.frame)
    }

    /// Release all capture textures
    ///
    /// # Panics
    ///
    /// If called twice.
    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        match std::mem::replace(&mut self.state, LayerState::Destroyed) {
            LayerState::Ready(textures) => Self::release(backend, textures),
            LayerState::Uninitialized => {}
            LayerState::Destroyed => panic!("SharedSourceLayer::destroy called twice"),
        }
        self.canvas.resize(IntSize::ZERO);
        tracing::debug!("shared layer destroyed after {} frames", self.frame);
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, LayerState::Ready(_))
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, LayerState::Destroyed)
    }

    /// Scale from full-resolution to downsampled coordinates
    pub fn scale(&self) -> f32 {
        1.0 / self.downsample_factor as f32
    }

    /// Number of refreshes performed
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Full-resolution content size, zero until initialized
    pub fn size(&self) -> IntSize {
        match &self.state {
            LayerState::Ready(t) => t.size,
            _ => IntSize::ZERO,
        }
    }

    pub fn low_res_size(&self) -> IntSize {
        match &self.state {
            LayerState::Ready(t) => t.low_res_size,
            _ => IntSize::ZERO,
        }
    }

    pub fn high_res_texture(&self) -> Option<TextureId> {
        match &self.state {
            LayerState::Ready(t) => Some(t.high_res),
            _ => None,
        }
    }

    pub fn low_res_texture(&self) -> Option<TextureId> {
        match &self.state {
            LayerState::Ready(t) => Some(t.low_res),
            _ => None,
        }
    }
}
