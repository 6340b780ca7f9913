//! Frost Core Types
//!
//! Plain value types shared by the Frost backdrop blur pipeline:
//!
//! - **Geometry**: points, sizes and rectangles in full-resolution and downsampled space
//! - **Color**: display-space RGBA with sRGB transfer functions
//! - **Style**: blur radius, tint and noise of a region
//! - **Masks**: declarative solid and gradient opacity masks
//!
//! Nothing in this crate touches the GPU.

pub mod color;
pub mod geometry;
pub mod id;
pub mod mask;
pub mod style;

pub use color::{linear_to_srgb, srgb_to_linear, Color};
pub use geometry::{IntOffset, IntSize, Point, Rect, Size};
pub use id::RenderObjectId;
pub use mask::{GradientSpace, GradientSpread, MaskBrush, MaskStop};
pub use style::Style;
