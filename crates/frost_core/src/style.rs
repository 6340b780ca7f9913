//! Visual style of a backdrop blur region

use crate::color::Color;

/// Blur, tint and noise applied to one region
///
/// Compared structurally: updating a region with an equal style is a no-op and
/// never reaches the GPU.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Style {
    /// Blur radius in density-independent pixels
    pub blur_radius: f32,
    /// Tint mixed over the blurred backdrop, weighted by `tint.a²`
    pub tint: Color,
    /// Strength of the grain overlay (0.0-1.0)
    pub noise_alpha: f32,
}

impl Default for Style {
    /// Pass-through: no blur, no tint, no noise
    fn default() -> Self {
        Self {
            blur_radius: 0.0,
            tint: Color::TRANSPARENT,
            noise_alpha: 0.0,
        }
    }
}

impl Style {
    /// Create a style with the given blur radius and no tint or noise
    pub fn new(blur_radius: f32) -> Self {
        Self::default().blur(blur_radius)
    }

    /// Set blur radius (dp, negative values clamp to zero)
    pub fn blur(mut self, blur_radius: f32) -> Self {
        self.blur_radius = blur_radius.max(0.0);
        self
    }

    /// Set tint color
    pub fn tint(mut self, color: Color) -> Self {
        self.tint = color;
        self
    }

    /// Set noise amount (clamped to 0.0-1.0)
    pub fn noise(mut self, noise_alpha: f32) -> Self {
        self.noise_alpha = noise_alpha.clamp(0.0, 1.0);
        self
    }

    /// Blur radius converted to physical pixels
    pub fn blur_radius_px(&self, density: f32) -> f32 {
        (self.blur_radius * density).max(0.0)
    }

    /// Weight of the tint in the final mix
    ///
    /// Quadratic in the tint's own alpha, which gives a softer ramp than linear
    /// alpha blending.
    pub fn tint_weight(&self) -> f32 {
        let a = self.tint.a.clamp(0.0, 1.0);
        a * a
    }

    /// True when the noise pass has to run
    pub fn has_noise(&self) -> bool {
        self.noise_alpha > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pass_through() {
        let style = Style::default();
        assert_eq!(style.blur_radius, 0.0);
        assert_eq!(style.tint, Color::TRANSPARENT);
        assert!(!style.has_noise());
        assert_eq!(style.tint_weight(), 0.0);
    }

    #[test]
    fn test_structural_equality() {
        let a = Style::new(8.0).tint(Color::CYAN.with_alpha(0.2)).noise(0.1);
        let b = Style::new(8.0).tint(Color::CYAN.with_alpha(0.2)).noise(0.1);
        assert_eq!(a, b);
        assert_ne!(a, b.noise(0.2));
    }

    #[test]
    fn test_builder_clamps() {
        let style = Style::new(-3.0).noise(4.0);
        assert_eq!(style.blur_radius, 0.0);
        assert_eq!(style.noise_alpha, 1.0);
    }

    #[test]
    fn test_blur_radius_px_uses_density() {
        let style = Style::new(10.0);
        assert_eq!(style.blur_radius_px(2.5), 25.0);
    }

    #[test]
    fn test_tint_weight_is_quadratic() {
        let style = Style::default().tint(Color::RED.with_alpha(0.5));
        assert!((style.tint_weight() - 0.25).abs() < f32::EPSILON);
    }
}
