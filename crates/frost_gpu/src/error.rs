//! GPU error types

use thiserror::Error;

/// Errors raised by a [`GpuBackend`](crate::GpuBackend)
#[derive(Error, Debug)]
pub enum GpuError {
    /// Texture allocation failed
    #[error("Out of GPU memory allocating a {width}x{height} texture")]
    OutOfMemory { width: u32, height: u32 },

    /// Zero-sized texture or a size over the device limit
    #[error("Invalid texture size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    /// Handle was already destroyed or belongs to another backend
    #[error("Unknown texture handle")]
    UnknownTexture,

    /// Failed to request GPU adapter
    #[error("No suitable GPU adapter found")]
    AdapterNotFound,

    /// Failed to request GPU device
    #[error("Failed to request GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    /// Pixel readback failed
    #[error("Texture readback failed: {0}")]
    Readback(String),
}

impl GpuError {
    /// True for failures the pipeline can absorb by skipping a frame
    pub fn is_allocation_failure(&self) -> bool {
        matches!(
            self,
            GpuError::OutOfMemory { .. } | GpuError::InvalidSize { .. }
        )
    }
}

/// Result type for GPU operations
pub type Result<T> = std::result::Result<T, GpuError>;
