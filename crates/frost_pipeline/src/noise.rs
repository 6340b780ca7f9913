//! Grain overlay
//!
//! Stateless: the pattern is a hash of the destination pixel position, so the pass
//! only needs the target and a strength.

use frost_gpu::{DrawPass, Program, TextureId};

/// Noise pass over `target`, or `None` when `alpha` is zero
pub fn noise_pass(target: TextureId, alpha: f32) -> Option<DrawPass> {
    if alpha.is_nan() || alpha <= 0.0 {
        return None;
    }
    Some(DrawPass {
        label: "Frost Noise",
        program: Program::Noise {
            alpha: alpha.min(1.0),
        },
        source: None,
        mask: None,
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use frost_core::IntSize;
    use frost_gpu::{GpuBackend, SoftwareBackend};

    #[test]
    fn test_zero_alpha_skips_pass() {
        let mut backend = SoftwareBackend::new();
        let target = backend.create_texture("t", IntSize::new(1, 1)).unwrap();
        assert!(noise_pass(target, 0.0).is_none());
        assert!(noise_pass(target, f32::NAN).is_none());
        assert_eq!(
            noise_pass(target, 3.0).map(|p| p.program),
            Some(Program::Noise { alpha: 1.0 })
        );
    }
}
