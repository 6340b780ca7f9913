//! GPU uniform layouts
//!
//! `#[repr(C)]` + `bytemuck::Pod` mirrors of the WGSL uniform blocks.

use crate::backend::{BlurAxis, DrawPass, Program, UvRect};

/// Uniform block shared by every pass program (matches `PassUniforms` in WGSL)
///
/// Memory layout (80 bytes):
/// - source_rect: `vec4<f32>` (16 bytes)
/// - mask_rect: `vec4<f32>` (16 bytes)
/// - tint: `vec4<f32>` (16 bytes)
/// - texel_step: `vec2<f32>` (8 bytes)
/// - sigma, support, noise_alpha, masked (16 bytes)
/// - _padding: `vec2<f32>` (8 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassUniforms {
    pub source_rect: [f32; 4],
    pub mask_rect: [f32; 4],
    pub tint: [f32; 4],
    pub texel_step: [f32; 2],
    pub sigma: f32,
    pub support: u32,
    pub noise_alpha: f32,
    pub masked: u32,
    pub _padding: [f32; 2],
}

impl PassUniforms {
    /// Uniforms for `pass`, given the pixel size of its source texture
    pub fn for_pass(pass: &DrawPass, source_size: (u32, u32)) -> Self {
        let mut uniforms = PassUniforms {
            source_rect: pass
                .source
                .map(|s| s.uv)
                .unwrap_or(UvRect::FULL)
                .to_array(),
            mask_rect: pass.mask.map(|m| m.uv).unwrap_or(UvRect::FULL).to_array(),
            ..Default::default()
        };

        match pass.program {
            Program::Copy => {}
            Program::Blur {
                axis,
                sigma,
                support,
            } => {
                let (w, h) = (source_size.0.max(1) as f32, source_size.1.max(1) as f32);
                uniforms.texel_step = match axis {
                    BlurAxis::Horizontal => [1.0 / w, 0.0],
                    BlurAxis::Vertical => [0.0, 1.0 / h],
                };
                uniforms.sigma = sigma;
                uniforms.support = support;
            }
            Program::Composite { tint, masked } => {
                uniforms.tint = tint.to_array();
                uniforms.masked = masked as u32;
            }
            Program::Noise { alpha } => {
                uniforms.noise_alpha = alpha;
            }
        }
        uniforms
    }
}
