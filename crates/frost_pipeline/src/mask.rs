//! Mask rasterization and caching
//!
//! Masks are rasterized on the CPU into a white RGBA texture whose alpha carries the
//! mask value, sized to the region. Gradient evaluation follows the usual stop
//! interpolation: values before the first stop and after the last stop clamp, and
//! the spread mode decides how the parameter wraps outside `0..1`.

use std::f32::consts::TAU;
use std::hash::{Hash, Hasher};

use frost_core::{GradientSpace, GradientSpread, IntSize, MaskBrush, MaskStop, Point};
use frost_gpu::{GpuBackend, GpuError, TextureId};
use rustc_hash::FxHasher;

/// Apply spread mode to a gradient parameter
fn apply_spread_mode(t: f32, spread: GradientSpread) -> f32 {
    match spread {
        GradientSpread::Pad => t.clamp(0.0, 1.0),
        GradientSpread::Repeat => t.rem_euclid(1.0),
        GradientSpread::Reflect => {
            let t_mod = t.abs() % 2.0;
            if t_mod > 1.0 {
                2.0 - t_mod
            } else {
                t_mod
            }
        }
    }
}

/// Sample the stop list at parameter t
fn sample_stops(stops: &[MaskStop], t: f32) -> f32 {
    let (first, last) = match (stops.first(), stops.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };

    if t <= first.offset {
        return first.alpha;
    }
    if t >= last.offset {
        return last.alpha;
    }

    for pair in stops.windows(2) {
        let (s0, s1) = (&pair[0], &pair[1]);
        if t >= s0.offset && t <= s1.offset {
            let range = s1.offset - s0.offset;
            if range < 0.0001 {
                return s0.alpha;
            }
            let local_t = (t - s0.offset) / range;
            return s0.alpha + (s1.alpha - s0.alpha) * local_t;
        }
    }

    last.alpha
}

/// Map a pixel center into gradient space
fn to_gradient_space(p: Point, size: IntSize, space: GradientSpace) -> Point {
    match space {
        GradientSpace::UserSpace => p,
        GradientSpace::ObjectBoundingBox => Point::new(
            p.x / size.width.max(1) as f32,
            p.y / size.height.max(1) as f32,
        ),
    }
}

/// Mask value in [0, 1] at pixel center `p` of a region of `size`
pub fn mask_alpha_at(brush: &MaskBrush, p: Point, size: IntSize) -> f32 {
    let value = match brush {
        MaskBrush::Solid(alpha) => *alpha,
        MaskBrush::Linear {
            start,
            end,
            stops,
            space,
            spread,
        } => {
            let p = to_gradient_space(p, size, *space);
            let (dx, dy) = (end.x - start.x, end.y - start.y);
            let len_sq = dx * dx + dy * dy;
            let t = if len_sq > 0.0 {
                ((p.x - start.x) * dx + (p.y - start.y) * dy) / len_sq
            } else {
                0.0
            };
            sample_stops(stops, apply_spread_mode(t, *spread))
        }
        MaskBrush::Radial {
            center,
            radius,
            stops,
            space,
            spread,
        } => {
            let p = to_gradient_space(p, size, *space);
            let distance = ((p.x - center.x).powi(2) + (p.y - center.y).powi(2)).sqrt();
            let t = if *radius > 0.0 { distance / radius } else { 1.0 };
            sample_stops(stops, apply_spread_mode(t, *spread))
        }
        MaskBrush::Conic {
            center,
            start_angle,
            stops,
            space,
        } => {
            let p = to_gradient_space(p, size, *space);
            let angle = (p.y - center.y).atan2(p.x - center.x) - start_angle;
            sample_stops(stops, angle.rem_euclid(TAU) / TAU)
        }
    };
    value.clamp(0.0, 1.0)
}

/// Rasterize `brush` into top-down RGBA8 rows (white, alpha = mask)
pub fn rasterize_mask(brush: &MaskBrush, size: IntSize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size.area() * 4) as usize);
    for y in 0..size.height {
        for x in 0..size.width {
            let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
            let alpha = mask_alpha_at(brush, center, size);
            pixels.extend_from_slice(&[255, 255, 255, (alpha * 255.0).round() as u8]);
        }
    }
    pixels
}

fn cache_key(brush: &MaskBrush, size: IntSize) -> u64 {
    let mut hasher = FxHasher::default();
    brush.hash(&mut hasher);
    size.hash(&mut hasher);
    hasher.finish()
}

struct CachedMask {
    key: u64,
    brush: MaskBrush,
    texture: TextureId,
    size: IntSize,
}

impl CachedMask {
    fn matches(&self, key: u64, brush: &MaskBrush, size: IntSize) -> bool {
        self.key == key && self.size == size && self.brush == *brush
    }
}

/// Rasterizes one render object's mask and keeps the texture until it changes
#[derive(Default)]
pub struct MaskRenderer {
    current: Option<CachedMask>,
    rasterized: u64,
}

impl MaskRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texture for `brush` at `size`, rasterizing only when the pair changed
    pub fn render_mask(
        &mut self,
        backend: &mut dyn GpuBackend,
        brush: &MaskBrush,
        size: IntSize,
    ) -> Result<TextureId, GpuError> {
        let key = cache_key(brush, size);
        if let Some(current) = &self.current {
            if current.matches(key, brush, size) {
                return Ok(current.texture);
            }
        }

        let _span = tracing::trace_span!("render_mask", width = size.width, height = size.height)
            .entered();
        let pixels = rasterize_mask(brush, size);

        let texture = match &self.current {
            Some(current) if current.size == size => current.texture,
            _ => {
                let texture = backend.create_texture("Frost Mask", size)?;
                self.release_current_mask(backend);
                texture
            }
        };
        backend.write_texture(texture, &pixels)?;

        self.current = Some(CachedMask {
            key,
            brush: brush.clone(),
            texture,
            size,
        });
        self.rasterized += 1;
        Ok(texture)
    }

    /// Free the cached mask texture immediately
    pub fn release_current_mask(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(current) = self.current.take() {
            backend.destroy_texture(current.texture);
        }
    }

    pub fn current_texture(&self) -> Option<TextureId> {
        self.current.as_ref().map(|c| c.texture)
    }

    /// Number of times a mask was rasterized
    pub fn rasterized(&self) -> u64 {
        self.rasterized
    }

    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        self.release_current_mask(backend);
    }
}
