//! Per-region bookkeeping
//!
//! A render object is one blur region: its rectangle in full-resolution space, the
//! same rectangle mapped into the downsampled capture, its style and mask, its
//! destination target and the state of its redraws.

use std::fmt;

use frost_core::{IntOffset, IntSize, MaskBrush, Point, Rect, RenderObjectId, Size, Style};
use frost_gpu::{SubTexture, SubmissionIndex, TextureId, TextureOrigin, UvRect};

use crate::completion::Waiter;
use crate::effects::EffectState;
use crate::presentation::PresentationTarget;

slotmap::new_key_type! {
    /// Arena key of a render object
    pub struct ObjectKey;
}

/// Redraw state of one render object
///
/// At most one render per object is in flight. An invalidation that arrives while
/// rendering is remembered and triggers exactly one more render when the current
/// one lands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderState {
    #[default]
    Clean,
    Dirty,
    Rendering,
    RenderingAndDirtyAgain,
}

impl RenderState {
    /// State after a new redraw request
    pub fn invalidate(self) -> Self {
        match self {
            RenderState::Clean | RenderState::Dirty => RenderState::Dirty,
            RenderState::Rendering | RenderState::RenderingAndDirtyAgain => {
                RenderState::RenderingAndDirtyAgain
            }
        }
    }

    /// State after the GPU work of the current render finished
    pub fn finish(self) -> Self {
        match self {
            RenderState::RenderingAndDirtyAgain => RenderState::Dirty,
            _ => RenderState::Clean,
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, RenderState::Dirty)
    }
}

/// Map a full-resolution rect into the memory space of the downsampled texture
///
/// The result is `high_res * scale`, with Y measured from memory row 0 of a texture
/// `low_res_size` tall stored with `origin`.
pub fn map_to_low_res(
    high_res: Rect,
    scale: f32,
    low_res_size: IntSize,
    origin: TextureOrigin,
) -> Rect {
    let scaled = high_res.scale(scale);
    let y = origin.memory_y(scaled.y(), scaled.height(), low_res_size.height as f32);
    scaled.with_origin(Point::new(scaled.x(), y))
}

/// A render submitted to the GPU but not yet finished
pub(crate) struct InFlight {
    pub(crate) submission: SubmissionIndex,
    pub(crate) frame: TextureId,
    pub(crate) size: IntSize,
    pub(crate) waiters: Vec<Waiter>,
}

/// One blur region
pub struct RenderObject {
    id: RenderObjectId,
    high_res_rect: Rect,
    low_res_rect: Rect,
    low_res_layer: SubTexture,
    low_res_size: IntSize,
    scale: f32,
    origin: TextureOrigin,
    style: Style,
    mask: Option<MaskBrush>,
    target: Box<dyn PresentationTarget>,
    pub(crate) effects: EffectState,
    pub(crate) state: RenderState,
    /// Waiting for the next render to start
    pub(crate) waiters: Vec<Waiter>,
    pub(crate) in_flight: Option<InFlight>,
}

impl RenderObject {
    /// Create a region at the origin of full-resolution space
    ///
    /// `low_res` is the shared downsampled texture and its size.
    pub fn new(
        id: RenderObjectId,
        size: Size,
        low_res: (TextureId, IntSize),
        scale: f32,
        origin: TextureOrigin,
        target: Box<dyn PresentationTarget>,
    ) -> Self {
        let high_res_rect = Rect::from_origin_size(Point::ZERO, size);
        let low_res_rect = map_to_low_res(high_res_rect, scale, low_res.1, origin);
        Self {
            id,
            high_res_rect,
            low_res_rect,
            low_res_layer: SubTexture::new(low_res.0, UvRect::from_texels(low_res_rect, low_res.1)),
            low_res_size: low_res.1,
            scale,
            origin,
            style: Style::default(),
            mask: None,
            target,
            effects: EffectState::default(),
            state: RenderState::Dirty,
            waiters: Vec::new(),
            in_flight: None,
        }
    }

    pub fn id(&self) -> &RenderObjectId {
        &self.id
    }

    /// Region in full-resolution space, top-left origin
    pub fn high_res_rect(&self) -> Rect {
        self.high_res_rect
    }

    /// Region in the memory space of the downsampled texture
    pub fn low_res_rect(&self) -> Rect {
        self.low_res_rect
    }

    /// View of the shared downsampled texture restricted to this region
    pub fn low_res_layer(&self) -> SubTexture {
        self.low_res_layer
    }

    /// Pixel size of the downsampled region, at least 1x1
    pub fn low_res_region_size(&self) -> IntSize {
        self.low_res_rect.size.ceil_int()
    }

    /// Pixel size of the destination frame, at least 1x1
    pub fn frame_size(&self) -> IntSize {
        self.high_res_rect.size.ceil_int()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn mask(&self) -> Option<&MaskBrush> {
        self.mask.as_ref()
    }

    pub fn render_state(&self) -> RenderState {
        self.state
    }

    /// Zero-sized regions never draw
    pub fn is_inert(&self) -> bool {
        self.high_res_rect.is_empty()
    }

    /// Move the region so its top-left corner sits at `offset` (root coordinates)
    ///
    /// Updates both rectangles together.
    pub fn set_offset(&mut self, offset: IntOffset) {
        self.high_res_rect = self.high_res_rect.with_origin(offset.to_point());
        self.remap();
    }

    /// Point at a new downsampled texture, e.g. after the content was resized
    pub fn rebind_low_res(&mut self, texture: TextureId, size: IntSize, scale: f32) {
        self.low_res_size = size;
        self.scale = scale;
        self.low_res_layer.texture = texture;
        self.remap();
    }

    fn remap(&mut self) {
        self.low_res_rect =
            map_to_low_res(self.high_res_rect, self.scale, self.low_res_size, self.origin);
        self.low_res_layer.uv = UvRect::from_texels(self.low_res_rect, self.low_res_size);
    }

    /// Replace the style; returns false when it is structurally unchanged
    pub fn set_style(&mut self, style: Style) -> bool {
        if self.style == style {
            return false;
        }
        self.style = style;
        true
    }

    pub(crate) fn set_mask(&mut self, mask: Option<MaskBrush>) {
        self.mask = mask;
    }

    /// Request a redraw, queueing `waiter` for its completion
    pub(crate) fn invalidate(&mut self, waiter: Option<Waiter>) {
        self.state = self.state.invalidate();
        self.waiters.extend(waiter);
    }

    pub(crate) fn target_mut(&mut self) -> &mut dyn PresentationTarget {
        self.target.as_mut()
    }
}

impl fmt::Debug for RenderObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderObject")
            .field("id", &self.id)
            .field("rect", &self.high_res_rect)
            .field("layer_size", &self.low_res_region_size())
            .field("style", &self.style)
            .field("state", &self.state)
            .finish()
    }
}
