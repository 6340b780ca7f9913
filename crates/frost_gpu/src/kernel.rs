//! Blur kernel and noise math
//!
//! The WGSL programs in [`crate::shaders`] evaluate the same formulas per fragment;
//! the software backend calls these directly.

/// Upper bound on taps per side, keeps the fragment loop bounded for huge radii
pub const MAX_BLUR_SUPPORT: u32 = 192;

/// Taps per side for a Gaussian of standard deviation `sigma`
///
/// `3 * round(sigma)`, so anything below half a texel degrades to a plain copy.
pub fn blur_support(sigma: f32) -> u32 {
    if !sigma.is_finite() || sigma <= 0.0 {
        return 0;
    }
    let sigma = sigma.round().min(MAX_BLUR_SUPPORT as f32) as u32;
    sigma.saturating_mul(3).min(MAX_BLUR_SUPPORT)
}

/// Unnormalized Gaussian weight of a tap `x` texels from the center
pub fn gaussian_weight(x: f32, sigma: f32) -> f32 {
    if sigma <= 0.0 {
        return if x == 0.0 { 1.0 } else { 0.0 };
    }
    (-0.5 * x * x / (sigma * sigma)).exp()
}

/// Normalized weights for taps `0..=support` (the kernel is symmetric)
pub fn gaussian_kernel(sigma: f32, support: u32) -> Vec<f32> {
    let half: Vec<f32> = (0..=support)
        .map(|i| gaussian_weight(i as f32, sigma))
        .collect();
    let total: f32 = half[0] + 2.0 * half[1..].iter().sum::<f32>();
    half.into_iter().map(|w| w / total).collect()
}

/// PCG hash (one round), matches `pcg_hash` in the noise shader
pub fn pcg_hash(input: u32) -> u32 {
    let state = input
        .wrapping_mul(747_796_405)
        .wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Grain value in [0, 1] for the pixel at (x, y), measured from the visual top-left
pub fn noise_value(x: u32, y: u32) -> f32 {
    pcg_hash(x ^ pcg_hash(y)) as f32 / u32::MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_is_three_rounded_sigmas() {
        assert_eq!(blur_support(0.0), 0);
        assert_eq!(blur_support(0.4), 0);
        assert_eq!(blur_support(0.6), 3);
        assert_eq!(blur_support(4.0), 12);
        assert_eq!(blur_support(-2.0), 0);
        assert_eq!(blur_support(f32::NAN), 0);
        assert_eq!(blur_support(10_000.0), MAX_BLUR_SUPPORT);
        assert_eq!(blur_support(2.0e9), MAX_BLUR_SUPPORT);
        assert_eq!(blur_support(f32::MAX), MAX_BLUR_SUPPORT);
    }

    #[test]
    fn test_kernel_is_normalized() {
        for sigma in [0.0, 1.0, 4.0, 9.5] {
            let support = blur_support(sigma);
            let kernel = gaussian_kernel(sigma, support);
            let total = kernel[0] + 2.0 * kernel[1..].iter().sum::<f32>();
            assert!((total - 1.0).abs() < 1e-5, "sigma {} sums to {}", sigma, total);
        }
    }

    #[test]
    fn test_zero_sigma_kernel_is_identity() {
        assert_eq!(gaussian_kernel(0.0, 0), vec![1.0]);
    }

    #[test]
    fn test_noise_is_deterministic_and_bounded() {
        assert_eq!(noise_value(3, 7), noise_value(3, 7));
        assert_ne!(noise_value(3, 7), noise_value(7, 3));
        for y in 0..16 {
            for x in 0..16 {
                let n = noise_value(x, y);
                assert!((0.0..=1.0).contains(&n));
            }
        }
    }
}
