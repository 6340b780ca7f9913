//! Effect chain: crop, separable blur, mask, tint, noise
//!
//! For one render object the coordinator records:
//!
//! 1. horizontal blur of the object's region of the shared downsampled texture,
//!    padded by `support` rows above and below so the vertical pass sees real
//!    backdrop instead of clamped edges
//! 2. vertical blur of the padded intermediate, cropping the padding away
//! 3. composite into the destination frame: linear upsample, mask on alpha, tint
//!    on RGB
//! 4. optional noise overlay on the destination
//!
//! Intermediate textures live in the object's [`EffectState`] and are only
//! reallocated when the region size or the blur support changes.

use frost_core::{IntSize, Rect};
use frost_gpu::{
    blur_support, BlurAxis, DrawPass, GpuBackend, GpuError, Program, SubTexture, TextureId,
    UvRect,
};

use crate::noise::noise_pass;
use crate::render_object::RenderObject;

/// A texture with the size it was allocated at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizedTexture {
    pub id: TextureId,
    pub size: IntSize,
}

/// Cached GPU resources of one render object
#[derive(Debug, Default)]
pub struct EffectState {
    /// Horizontal blur output (region width x padded height)
    pub horizontal: Option<SizedTexture>,
    /// Vertical blur output (region size)
    pub vertical: Option<SizedTexture>,
    /// Composited frame handed to the presentation target
    pub destination: Option<SizedTexture>,
    /// Noise strength of the last recorded frame
    pub noise_alpha: f32,
}

impl EffectState {
    /// Release the blur intermediates, keeping the last presented frame
    pub fn release_intermediates(&mut self, backend: &mut dyn GpuBackend) {
        for slot in [&mut self.horizontal, &mut self.vertical] {
            if let Some(texture) = slot.take() {
                backend.destroy_texture(texture.id);
            }
        }
    }

    pub fn release(&mut self, backend: &mut dyn GpuBackend) {
        self.release_intermediates(backend);
        if let Some(texture) = self.destination.take() {
            backend.destroy_texture(texture.id);
        }
        self.noise_alpha = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.is_none() && self.vertical.is_none() && self.destination.is_none()
    }
}

/// Return the texture in `slot`, reallocating it when the size differs
///
/// The replacement is allocated before the old texture is released so a failed
/// allocation leaves the slot untouched.
fn ensure_texture(
    backend: &mut dyn GpuBackend,
    slot: &mut Option<SizedTexture>,
    label: &str,
    size: IntSize,
) -> Result<TextureId, GpuError> {
    if let Some(existing) = slot {
        if existing.size == size {
            return Ok(existing.id);
        }
    }
    let id = backend.create_texture(label, size)?;
    if let Some(old) = slot.replace(SizedTexture { id, size }) {
        backend.destroy_texture(old.id);
    }
    Ok(id)
}

/// Blur parameters in downsampled texels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurParams {
    pub sigma: f32,
    pub support: u32,
}

impl BlurParams {
    /// Convert a style's dp radius: `sigma = radius_px * scale`, `support = 3 * round(sigma)`
    pub fn new(blur_radius_px: f32, scale: f32) -> Self {
        let sigma = (blur_radius_px * scale).max(0.0);
        Self {
            sigma,
            support: blur_support(sigma),
        }
    }
}

/// Records the effect passes of render objects
pub struct EffectCoordinator {
    density: f32,
}

impl EffectCoordinator {
    pub fn new(density: f32) -> Self {
        Self { density }
    }

    /// Record every pass for `object` and return its destination frame
    ///
    /// `mask` is the object's rasterized mask texture, if any. On error the object's
    /// blur intermediates are released; the previously presented frame is kept.
    pub fn apply_effects(
        &mut self,
        backend: &mut dyn GpuBackend,
        object: &mut RenderObject,
        mask: Option<TextureId>,
    ) -> Result<SizedTexture, GpuError> {
        let result = self.record(backend, object, mask);
        if result.is_err() {
            object.effects.release_intermediates(backend);
        }
        result
    }

    fn record(
        &mut self,
        backend: &mut dyn GpuBackend,
        object: &mut RenderObject,
        mask: Option<TextureId>,
    ) -> Result<SizedTexture, GpuError> {
        let _span = tracing::trace_span!("apply_effects", id = %object.id()).entered();

        let style = *object.style();
        let blur = BlurParams::new(style.blur_radius_px(self.density), object.scale());
        let region = object.low_res_region_size();
        let frame_size = object.frame_size();
        let layer = object.low_res_layer();
        let low_res_rect = object.low_res_rect();
        let support = blur.support;

        let source_size = backend
            .texture_size(layer.texture)
            .ok_or(GpuError::UnknownTexture)?;

        let padded = IntSize::new(region.width, region.height + 2 * support);
        let horizontal = ensure_texture(
            backend,
            &mut object.effects.horizontal,
            "Frost Horizontal Blur",
            padded,
        )?;
        let vertical = ensure_texture(
            backend,
            &mut object.effects.vertical,
            "Frost Vertical Blur",
            region,
        )?;
        let destination = ensure_texture(
            backend,
            &mut object.effects.destination,
            "Frost Destination Frame",
            frame_size,
        )?;

        // Same region grown by `support` texels on both vertical edges
        let padded_rect = Rect::new(
            low_res_rect.x(),
            low_res_rect.y() - support as f32,
            low_res_rect.width(),
            low_res_rect.height() + 2.0 * support as f32,
        );

        tracing::trace!(
            "{}: blur sigma {:.2} support {} region {}x{}",
            object.id(),
            blur.sigma,
            support,
            region.width,
            region.height
        );

        backend.draw(&DrawPass {
            label: "Frost Horizontal Blur",
            program: Program::Blur {
                axis: BlurAxis::Horizontal,
                sigma: blur.sigma,
                support,
            },
            source: Some(SubTexture::new(
                layer.texture,
                UvRect::from_texels(padded_rect, source_size),
            )),
            mask: None,
            target: horizontal,
        })?;

        let padded_height = padded.height as f32;
        backend.draw(&DrawPass {
            label: "Frost Vertical Blur",
            program: Program::Blur {
                axis: BlurAxis::Vertical,
                sigma: blur.sigma,
                support,
            },
            source: Some(SubTexture::new(
                horizontal,
                UvRect::new(
                    0.0,
                    support as f32 / padded_height,
                    1.0,
                    (support + region.height) as f32 / padded_height,
                ),
            )),
            mask: None,
            target: vertical,
        })?;

        backend.draw(&DrawPass {
            label: "Frost Composite",
            program: Program::Composite {
                tint: style.tint,
                masked: mask.is_some(),
            },
            source: Some(SubTexture::full(vertical)),
            mask: mask.map(SubTexture::full),
            target: destination,
        })?;

        if let Some(pass) = noise_pass(destination, style.noise_alpha) {
            backend.draw(&pass)?;
        }
        object.effects.noise_alpha = style.noise_alpha;

        Ok(SizedTexture {
            id: destination,
            size: frame_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_params_from_radius() {
        // 8px radius at half resolution is sigma 4, support 12
        let params = BlurParams::new(8.0, 0.5);
        assert_eq!(params.sigma, 4.0);
        assert_eq!(params.support, 12);
        assert_eq!(BlurParams::new(0.0, 0.5).support, 0);
    }

    #[test]
    fn test_huge_radius_is_capped() {
        let params = BlurParams::new(3.0e9, 0.5);
        assert_eq!(params.support, frost_gpu::MAX_BLUR_SUPPORT);
    }
}
