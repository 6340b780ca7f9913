//! Declarative mask descriptions
//!
//! A mask modulates the alpha of a blurred region. Masks are described as
//! solid fills or gradients over opacity stops; the pipeline rasterizes them into
//! a texture the size of the region and caches the result by content hash.

use std::hash::{Hash, Hasher};

use crate::geometry::Point;

/// Opacity stop of a mask gradient
#[derive(Clone, Copy, Debug)]
pub struct MaskStop {
    /// Position along the gradient (0.0 to 1.0)
    pub offset: f32,
    /// Mask opacity at this stop (0.0 = fully hidden, 1.0 = fully visible)
    pub alpha: f32,
}

impl MaskStop {
    pub fn new(offset: f32, alpha: f32) -> Self {
        Self {
            offset: offset.clamp(0.0, 1.0),
            alpha: alpha.clamp(0.0, 1.0),
        }
    }
}

/// Coordinate space of gradient geometry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GradientSpace {
    /// Coordinates are region-local pixels
    #[default]
    UserSpace,
    /// Coordinates are relative to the region bounds (0.0-1.0)
    ObjectBoundingBox,
}

/// How a gradient continues outside its defined range
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GradientSpread {
    /// Clamp to the edge stops
    #[default]
    Pad,
    /// Mirror the gradient
    Reflect,
    /// Repeat the gradient
    Repeat,
}

/// Mask shape over a region
#[derive(Clone, Debug)]
pub enum MaskBrush {
    /// Uniform opacity over the whole region
    Solid(f32),
    /// Linear gradient between two points
    Linear {
        start: Point,
        end: Point,
        stops: Vec<MaskStop>,
        space: GradientSpace,
        spread: GradientSpread,
    },
    /// Radial gradient from a center outward
    Radial {
        center: Point,
        radius: f32,
        stops: Vec<MaskStop>,
        space: GradientSpace,
        spread: GradientSpread,
    },
    /// Angular gradient around a center, clockwise from `start_angle` (radians)
    Conic {
        center: Point,
        start_angle: f32,
        stops: Vec<MaskStop>,
        space: GradientSpace,
    },
}

impl MaskBrush {
    /// Fully transparent mask: hides the region entirely
    pub fn clear() -> Self {
        MaskBrush::Solid(0.0)
    }

    /// Vertical fade from `top` opacity to `bottom` opacity across the region
    pub fn vertical_fade(top: f32, bottom: f32) -> Self {
        MaskBrush::Linear {
            start: Point::new(0.0, 0.0),
            end: Point::new(0.0, 1.0),
            stops: vec![MaskStop::new(0.0, top), MaskStop::new(1.0, bottom)],
            space: GradientSpace::ObjectBoundingBox,
            spread: GradientSpread::Pad,
        }
    }

    /// Linear gradient in region-local pixels
    pub fn linear(start: Point, end: Point, stops: Vec<MaskStop>) -> Self {
        MaskBrush::Linear {
            start,
            end,
            stops,
            space: GradientSpace::UserSpace,
            spread: GradientSpread::Pad,
        }
    }

    /// Radial gradient in region-local pixels
    pub fn radial(center: Point, radius: f32, stops: Vec<MaskStop>) -> Self {
        MaskBrush::Radial {
            center,
            radius,
            stops,
            space: GradientSpace::UserSpace,
            spread: GradientSpread::Pad,
        }
    }
}

// Masks key a texture cache, so equality and hashing are bitwise over the floats.

fn hash_point<H: Hasher>(p: &Point, state: &mut H) {
    p.x.to_bits().hash(state);
    p.y.to_bits().hash(state);
}

fn hash_stops<H: Hasher>(stops: &[MaskStop], state: &mut H) {
    stops.len().hash(state);
    for stop in stops {
        stop.offset.to_bits().hash(state);
        stop.alpha.to_bits().hash(state);
    }
}

fn stops_eq(a: &[MaskStop], b: &[MaskStop]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.offset.to_bits() == y.offset.to_bits() && x.alpha.to_bits() == y.alpha.to_bits()
        })
}

fn point_eq(a: &Point, b: &Point) -> bool {
    a.x.to_bits() == b.x.to_bits() && a.y.to_bits() == b.y.to_bits()
}

impl Hash for MaskBrush {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MaskBrush::Solid(alpha) => alpha.to_bits().hash(state),
            MaskBrush::Linear {
                start,
                end,
                stops,
                space,
                spread,
            } => {
                hash_point(start, state);
                hash_point(end, state);
                hash_stops(stops, state);
                space.hash(state);
                spread.hash(state);
            }
            MaskBrush::Radial {
                center,
                radius,
                stops,
                space,
                spread,
            } => {
                hash_point(center, state);
                radius.to_bits().hash(state);
                hash_stops(stops, state);
                space.hash(state);
                spread.hash(state);
            }
            MaskBrush::Conic {
                center,
                start_angle,
                stops,
                space,
            } => {
                hash_point(center, state);
                start_angle.to_bits().hash(state);
                hash_stops(stops, state);
                space.hash(state);
            }
        }
    }
}

impl PartialEq for MaskBrush {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MaskBrush::Solid(a), MaskBrush::Solid(b)) => a.to_bits() == b.to_bits(),
            (
                MaskBrush::Linear {
                    start: s0,
                    end: e0,
                    stops: st0,
                    space: sp0,
                    spread: sr0,
                },
                MaskBrush::Linear {
                    start: s1,
                    end: e1,
                    stops: st1,
                    space: sp1,
                    spread: sr1,
                },
            ) => {
                point_eq(s0, s1)
                    && point_eq(e0, e1)
                    && stops_eq(st0, st1)
                    && sp0 == sp1
                    && sr0 == sr1
            }
            (
                MaskBrush::Radial {
                    center: c0,
                    radius: r0,
                    stops: st0,
                    space: sp0,
                    spread: sr0,
                },
                MaskBrush::Radial {
                    center: c1,
                    radius: r1,
                    stops: st1,
                    space: sp1,
                    spread: sr1,
                },
            ) => {
                point_eq(c0, c1)
                    && r0.to_bits() == r1.to_bits()
                    && stops_eq(st0, st1)
                    && sp0 == sp1
                    && sr0 == sr1
            }
            (
                MaskBrush::Conic {
                    center: c0,
                    start_angle: a0,
                    stops: st0,
                    space: sp0,
                },
                MaskBrush::Conic {
                    center: c1,
                    start_angle: a1,
                    stops: st1,
                    space: sp1,
                },
            ) => {
                point_eq(c0, c1) && a0.to_bits() == a1.to_bits() && stops_eq(st0, st1) && sp0 == sp1
            }
            _ => false,
        }
    }
}

impl Eq for MaskBrush {}
