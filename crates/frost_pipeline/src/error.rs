//! Pipeline error types

use frost_gpu::GpuError;
use thiserror::Error;

/// Errors returned while constructing or configuring a pipeline
///
/// Failures during rendering never surface here; they are logged and the affected
/// region is skipped for that frame.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// GPU backend failure while allocating the shared capture textures
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Failed to start the GPU command thread
    #[error("Failed to spawn render thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// Invalid configuration file
    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
