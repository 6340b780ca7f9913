//! Pipeline configuration
//!
//! Plain struct with defaults. Hosts that keep their settings in TOML can embed a
//! `[frost]`-style table and parse it with [`PipelineConfig::from_toml_str`].

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Configuration for a [`Pipeline`](crate::Pipeline) and its render thread
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Integer ratio between the full-resolution capture and the blur source
    pub downsample_factor: u32,
    /// Physical pixels per density-independent pixel, used for blur radii
    pub density: f32,
    /// Name of the GPU command thread
    pub thread_name: String,
    /// How often the render thread polls for finished GPU work while renders are
    /// in flight, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            downsample_factor: 2,
            density: 1.0,
            thread_name: "frost-gpu".to_string(),
            poll_interval_ms: 2,
        }
    }
}

impl PipelineConfig {
    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(source)?;
        Ok(config.validated())
    }

    /// Clamp out-of-range values
    pub fn validated(mut self) -> Self {
        if self.downsample_factor == 0 {
            tracing::warn!("downsample_factor 0 is invalid, using 1");
            self.downsample_factor = 1;
        }
        if !(self.density.is_finite() && self.density > 0.0) {
            tracing::warn!("density {} is invalid, using 1.0", self.density);
            self.density = 1.0;
        }
        if self.thread_name.is_empty() {
            self.thread_name = Self::default().thread_name;
        }
        self
    }

    /// Scale from full-resolution to downsampled coordinates
    pub fn scale(&self) -> f32 {
        1.0 / self.downsample_factor.max(1) as f32
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.downsample_factor, 2);
        assert_eq!(config.scale(), 0.5);
        assert_eq!(config.thread_name, "frost-gpu");
    }

    #[test]
    fn test_from_toml_fills_missing_keys() {
        let config = PipelineConfig::from_toml_str(
            r#"
            downsample_factor = 4
            density = 2.75
            "#,
        )
        .unwrap();
        assert_eq!(config.downsample_factor, 4);
        assert_eq!(config.density, 2.75);
        assert_eq!(config.poll_interval_ms, 2);
    }

    #[test]
    fn test_validation_clamps() {
        let config = PipelineConfig::from_toml_str("downsample_factor = 0\ndensity = -1.0").unwrap();
        assert_eq!(config.downsample_factor, 1);
        assert_eq!(config.density, 1.0);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("downsample_factor = \"two\"").unwrap_err();
        assert!(matches!(err, crate::PipelineError::Config(_)));
    }
}
