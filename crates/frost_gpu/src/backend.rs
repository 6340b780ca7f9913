//! GPU resource abstraction
//!
//! The effect passes only need a handful of operations: allocate render-target
//! textures, upload pixels, blit with linear filtering and draw a full-target quad
//! with one of the fixed [`Program`]s. [`GpuBackend`] is that surface. It is object
//! safe so the pipeline can run against the wgpu device or the CPU reference
//! rasterizer interchangeably.
//!
//! # Coordinate conventions
//!
//! UV rectangles are expressed in *texture memory* space: `v = 0` is memory row 0.
//! Whether row 0 is the visual top or the visual bottom of the image depends on the
//! backend's [`TextureOrigin`]. Pixel uploads and readbacks are always top-down; the
//! backend performs any flip. Every draw maps the target's memory space linearly
//! onto the source UV rectangle, so a consistent origin across all textures keeps
//! the visible result independent of the convention.

use frost_core::{Color, IntSize, Rect};

use crate::error::Result;

slotmap::new_key_type! {
    /// Handle to a texture owned by a backend
    pub struct TextureId;
}

/// Where texture memory row 0 sits in the image
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureOrigin {
    /// Row 0 is the top of the image (wgpu, Metal, D3D)
    #[default]
    TopLeft,
    /// Row 0 is the bottom of the image (OpenGL framebuffers)
    BottomLeft,
}

impl TextureOrigin {
    /// Memory row of visual row `y` in a texture `height` rows tall
    pub fn memory_row(&self, y: u32, height: u32) -> u32 {
        match self {
            TextureOrigin::TopLeft => y,
            TextureOrigin::BottomLeft => height - 1 - y,
        }
    }

    /// Memory-space Y of the top edge of a visual span `[y, y + h)`
    pub fn memory_y(&self, y: f32, h: f32, texture_height: f32) -> f32 {
        match self {
            TextureOrigin::TopLeft => y,
            TextureOrigin::BottomLeft => texture_height - y - h,
        }
    }
}

/// Normalized rectangle into a texture (memory space)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl UvRect {
    /// The whole texture
    pub const FULL: UvRect = UvRect {
        u0: 0.0,
        v0: 0.0,
        u1: 1.0,
        v1: 1.0,
    };

    pub const fn new(u0: f32, v0: f32, u1: f32, v1: f32) -> Self {
        Self { u0, v0, u1, v1 }
    }

    /// Normalize a memory-space texel rectangle against the texture size
    pub fn from_texels(rect: Rect, texture: IntSize) -> Self {
        let w = texture.width.max(1) as f32;
        let h = texture.height.max(1) as f32;
        Self {
            u0: rect.x() / w,
            v0: rect.y() / h,
            u1: rect.right() / w,
            v1: rect.bottom() / h,
        }
    }

    pub fn width(&self) -> f32 {
        self.u1 - self.u0
    }

    pub fn height(&self) -> f32 {
        self.v1 - self.v0
    }

    /// Point at normalized position (s, t) inside this rectangle
    pub fn lerp(&self, s: f32, t: f32) -> (f32, f32) {
        (self.u0 + self.width() * s, self.v0 + self.height() * t)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.u0, self.v0, self.u1, self.v1]
    }
}

impl Default for UvRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// A texture restricted to a UV rectangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubTexture {
    pub texture: TextureId,
    pub uv: UvRect,
}

impl SubTexture {
    pub fn new(texture: TextureId, uv: UvRect) -> Self {
        Self { texture, uv }
    }

    /// View of the whole texture
    pub fn full(texture: TextureId) -> Self {
        Self {
            texture,
            uv: UvRect::FULL,
        }
    }
}

/// Direction of one separable blur pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlurAxis {
    Horizontal,
    Vertical,
}

/// Fixed fragment programs available to a draw
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Program {
    /// Linear-filtered copy of the source
    Copy,
    /// One axis of a Gaussian blur, accumulated in linear light
    ///
    /// Taps are one source texel apart, `support` on each side of the center.
    Blur {
        axis: BlurAxis,
        sigma: f32,
        support: u32,
    },
    /// Mask multiply on alpha followed by a tint mix on RGB weighted by `tint.a²`
    Composite { tint: Color, masked: bool },
    /// Procedural grain blended into the target's RGB, target alpha preserved
    Noise { alpha: f32 },
}

impl Program {
    /// Programs that read the target instead of replacing it
    pub fn blends_onto_target(&self) -> bool {
        matches!(self, Program::Noise { .. })
    }
}

/// A full-target quad draw
#[derive(Clone, Copy, Debug)]
pub struct DrawPass {
    pub label: &'static str,
    pub program: Program,
    /// Sampled input, unused by [`Program::Noise`]
    pub source: Option<SubTexture>,
    /// Mask input for [`Program::Composite`]
    pub mask: Option<SubTexture>,
    pub target: TextureId,
}

/// Monotonic index of a queue submission
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionIndex(pub u64);

/// Counters exposed for diagnostics and tests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuStats {
    pub draw_calls: u64,
    pub blits: u64,
    pub clears: u64,
    pub uploads: u64,
    pub submissions: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub live_textures: usize,
    pub live_bytes: u64,
}

/// Minimal GPU surface used by the capture and effect passes
///
/// All textures are RGBA8 with straight alpha and can be sampled, rendered to,
/// uploaded to and read back. Commands are recorded in call order and become
/// visible to the GPU at the next [`submit`](GpuBackend::submit).
pub trait GpuBackend: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn texture_origin(&self) -> TextureOrigin;

    /// Allocate a texture; contents are transparent black
    fn create_texture(&mut self, label: &str, size: IntSize) -> Result<TextureId>;

    /// Release a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, texture: TextureId);

    fn texture_size(&self, texture: TextureId) -> Option<IntSize>;

    /// Replace the texture contents with top-down RGBA8 rows
    fn write_texture(&mut self, texture: TextureId, pixels: &[u8]) -> Result<()>;

    fn clear(&mut self, texture: TextureId, color: Color) -> Result<()>;

    /// Linear-filtered scale of `source` onto the whole of `target`
    fn blit(&mut self, source: SubTexture, target: TextureId) -> Result<()>;

    fn draw(&mut self, pass: &DrawPass) -> Result<()>;

    /// Flush recorded work to the GPU queue
    fn submit(&mut self) -> SubmissionIndex;

    /// Latest submission known to have finished executing
    fn poll(&mut self) -> Option<SubmissionIndex>;

    /// Top-down RGBA8 contents, blocking until pending work has finished
    fn read_pixels(&mut self, texture: TextureId) -> Result<Vec<u8>>;

    fn stats(&self) -> GpuStats;
}

/// Bytes used by an RGBA8 texture of `size`
pub fn texture_bytes(size: IntSize) -> u64 {
    size.area() * 4
}
