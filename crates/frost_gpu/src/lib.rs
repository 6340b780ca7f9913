//! Frost GPU Resource Layer
//!
//! The minimal GPU surface used by the backdrop blur pipeline.
//!
//! # Features
//!
//! - **Backend trait**: texture allocation, uploads, linear blits and full-target draws
//! - **Pass programs**: copy, separable Gaussian blur in linear light, mask + tint
//!   composite, procedural grain
//! - **wgpu backend**: pipelines and uniforms on a wgpu device, submission tracking
//!   through `on_submitted_work_done`
//! - **Software backend**: CPU reference rasterizer with identical pass semantics,
//!   configurable texture origin and simulated allocation failures

pub mod backend;
pub mod error;
pub mod kernel;
pub mod primitives;
pub mod shaders;
pub mod software;
pub mod wgpu_backend;

pub use backend::{
    texture_bytes, BlurAxis, DrawPass, GpuBackend, GpuStats, Program, SubTexture,
    SubmissionIndex, TextureId, TextureOrigin, UvRect,
};
pub use error::{GpuError, Result};
pub use kernel::{blur_support, gaussian_kernel, MAX_BLUR_SUPPORT};
pub use primitives::PassUniforms;
pub use shaders::PASS_SHADER;
pub use software::SoftwareBackend;
pub use wgpu_backend::{WgpuBackend, WgpuBackendConfig, TEXTURE_FORMAT};
