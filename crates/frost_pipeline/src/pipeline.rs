//! Pipeline orchestrator
//!
//! Owns the GPU backend, the shared capture and every render object. All methods run
//! on the GPU command thread (see [`BackdropRenderer`](crate::BackdropRenderer)); the
//! pipeline can also be driven directly for headless use and tests.
//!
//! A frame goes through three steps:
//!
//! 1. updates (`update_*`, `request_render`, `content_changed`) mark objects dirty and
//!    queue their completion signals
//! 2. [`Pipeline::render_dirty`] records the effect chain of every dirty object and
//!    submits them together
//! 3. [`Pipeline::poll_completions`] presents the frames whose GPU work finished and
//!    resolves their completions

use std::sync::Arc;

use frost_core::{IntOffset, IntSize, MaskBrush, RenderObjectId, Size, Style};
use frost_gpu::{GpuBackend, GpuStats, SubmissionIndex, TextureId};
use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap};
use tokio::sync::watch;

use crate::completion::{CompletionSender, RenderLatch, Waiter};
use crate::config::PipelineConfig;
use crate::content::UiContent;
use crate::effects::EffectCoordinator;
use crate::error::Result;
use crate::mask::MaskRenderer;
use crate::presentation::PresentationTarget;
use crate::render_object::{InFlight, ObjectKey, RenderObject, RenderState};
use crate::shared_layer::SharedSourceLayer;

/// Published after every refresh of the shared capture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Refresh counter, 0 before the first capture
    pub frame: u64,
    /// Content size of the capture
    pub size: IntSize,
}

/// Any combination of offset, style and mask changes, applied as one redraw
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionUpdate {
    pub offset: Option<IntOffset>,
    pub style: Option<Style>,
    /// `Some(None)` removes the mask
    pub mask: Option<Option<MaskBrush>>,
}

impl RegionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(mut self, offset: IntOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn mask(mut self, mask: Option<MaskBrush>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.offset.is_none() && self.style.is_none() && self.mask.is_none()
    }
}

/// Pipeline counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub gpu: GpuStats,
    /// Registered render objects
    pub render_objects: usize,
    /// Renders submitted but not yet presented
    pub in_flight: usize,
    /// Shared capture refreshes
    pub frames: u64,
    /// Render object frames submitted
    pub renders: u64,
    /// Render object frames skipped after a GPU failure
    pub skipped: u64,
}

/// Registry of render objects plus the shared capture they sample
pub struct Pipeline {
    config: PipelineConfig,
    backend: Box<dyn GpuBackend>,
    content: Arc<dyn UiContent>,
    shared: SharedSourceLayer,
    objects: SlotMap<ObjectKey, RenderObject>,
    ids: FxHashMap<RenderObjectId, ObjectKey>,
    masks: SecondaryMap<ObjectKey, MaskRenderer>,
    effects: EffectCoordinator,
    frames: watch::Sender<FrameInfo>,
    destroyed: bool,
    renders: u64,
    skipped: u64,
}

impl Pipeline {
    /// Create the pipeline and capture the content once if it already has a size
    pub fn new(
        config: PipelineConfig,
        backend: Box<dyn GpuBackend>,
        content: Arc<dyn UiContent>,
    ) -> Result<Self> {
        let config = config.validated();
        let (frames, _) = watch::channel(FrameInfo::default());

        tracing::info!(
            "frost pipeline on {} backend (downsample {}x, density {})",
            backend.name(),
            config.downsample_factor,
            config.density
        );

        let mut pipeline = Self {
            shared: SharedSourceLayer::new(config.downsample_factor),
            effects: EffectCoordinator::new(config.density),
            config,
            backend,
            content,
            objects: SlotMap::with_key(),
            ids: FxHashMap::default(),
            masks: SecondaryMap::new(),
            frames,
            destroyed: false,
            renders: 0,
            skipped: 0,
        };

        let size = pipeline.content.size();
        if pipeline.shared.initialize(pipeline.backend.as_mut(), size)? {
            let frame = pipeline
                .shared
                .refresh(pipeline.backend.as_mut(), pipeline.content.as_ref())?;
            pipeline.publish_frame(frame);
        }
        Ok(pipeline)
    }

    fn check_alive(&self) {
        assert!(!self.destroyed, "Pipeline used after destroy");
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether the shared capture has been allocated
    pub fn is_initialized(&self) -> bool {
        self.shared.is_ready()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    pub fn shared_layer(&self) -> &SharedSourceLayer {
        &self.shared
    }

    /// Subscribe to frame-available notifications
    pub fn frames(&self) -> watch::Receiver<FrameInfo> {
        self.frames.subscribe()
    }

    pub fn object(&self, id: &RenderObjectId) -> Option<&RenderObject> {
        self.ids.get(id).and_then(|key| self.objects.get(*key))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn publish_frame(&mut self, frame: u64) {
        let info = FrameInfo {
            frame,
            size: self.shared.size(),
        };
        self.frames.send_replace(info);
    }

    /// Re-capture the UI content and redraw every region
    ///
    /// Reallocates the capture when the content size changed. Zero-sized content is
    /// skipped until it reports a real size.
    pub fn content_changed(&mut self) {
        self.check_alive();
        let size = self.content.size();
        if size.is_empty() {
            tracing::debug!("content_changed skipped: content size is empty");
            return;
        }

        if !self.shared.is_ready() || self.shared.size() != size {
            match self.shared.initialize(self.backend.as_mut(), size) {
                Ok(true) => self.rebind_objects(),
                Ok(false) => return,
                Err(e) => {
                    tracing::warn!("Failed to allocate shared capture {}x{}: {}", size.width, size.height, e);
                    return;
                }
            }
        }

        match self
            .shared
            .refresh(self.backend.as_mut(), self.content.as_ref())
        {
            Ok(frame) => {
                self.publish_frame(frame);
                for object in self.objects.values_mut() {
                    object.invalidate(None);
                }
            }
            Err(e) => tracing::warn!("Failed to refresh shared capture: {}", e),
        }
    }

    fn rebind_objects(&mut self) {
        let Some(texture) = self.shared.low_res_texture() else {
            return;
        };
        let size = self.shared.low_res_size();
        let scale = self.shared.scale();
        for object in self.objects.values_mut() {
            object.rebind_low_res(texture, size, scale);
        }
    }

    /// Build a render object for a region of `size` at offset zero
    ///
    /// # Panics
    ///
    /// If the shared capture is not initialized yet.
    pub fn create_render_object(
        &self,
        id: RenderObjectId,
        size: Size,
        target: Box<dyn PresentationTarget>,
    ) -> RenderObject {
        let texture = match self.shared.low_res_texture() {
            Some(texture) if !self.destroyed => texture,
            _ => panic!("render object {} created before the shared layer was initialized", id),
        };
        RenderObject::new(
            id,
            size,
            (texture, self.shared.low_res_size()),
            self.shared.scale(),
            self.backend.texture_origin(),
            target,
        )
    }

    /// Register `object`, replacing and releasing any object with the same id
    pub fn add_render_object(&mut self, object: RenderObject) {
        self.check_alive();
        let id = object.id().clone();
        if let Some(old) = self.ids.remove(&id) {
            tracing::debug!("replacing render object {}", id);
            self.release_object(old);
        }
        let key = self.objects.insert(object);
        self.ids.insert(id, key);
    }

    /// Create and register a render object bound to `target`
    pub fn attach(&mut self, id: RenderObjectId, size: Size, target: Box<dyn PresentationTarget>) {
        self.check_alive();
        tracing::debug!("attach {} ({}x{})", id, size.width, size.height);
        let object = self.create_render_object(id, size, target);
        self.add_render_object(object);
    }

    /// Remove a render object; unknown ids are ignored
    pub fn remove_render_object(&mut self, id: &RenderObjectId) {
        self.check_alive();
        match self.ids.remove(id) {
            Some(key) => {
                tracing::debug!("detach {}", id);
                self.release_object(key);
            }
            None => tracing::trace!("detach of unknown render object {}", id),
        }
    }

    pub fn detach(&mut self, id: &RenderObjectId) {
        self.remove_render_object(id);
    }

    /// Release everything owned by the object at `key`
    ///
    /// Pending single completions are canceled; shared latches count down.
    fn release_object(&mut self, key: ObjectKey) {
        let Some(mut object) = self.objects.remove(key) else {
            return;
        };
        if let Some(mut mask) = self.masks.remove(key) {
            mask.destroy(self.backend.as_mut());
        }
        object.effects.release(self.backend.as_mut());
        object.target_mut().detach();
        object.waiters.clear();
        object.in_flight = None;
    }

    fn lookup(&self, id: &RenderObjectId) -> Option<ObjectKey> {
        let key = self.ids.get(id).copied();
        if key.is_none() {
            tracing::trace!("update for unknown render object {}", id);
        }
        key
    }

    /// Move a region; `done` resolves when the redraw lands
    pub fn update_offset(&mut self, id: &RenderObjectId, offset: IntOffset, done: CompletionSender) {
        self.update_region(id, RegionUpdate::new().offset(offset), done);
    }

    /// Change a region's style; an unchanged style resolves `done` without drawing
    pub fn update_style(&mut self, id: &RenderObjectId, style: Style, done: CompletionSender) {
        self.update_region(id, RegionUpdate::new().style(style), done);
    }

    /// Set or clear a region's mask
    pub fn update_mask(&mut self, id: &RenderObjectId, mask: Option<MaskBrush>, done: CompletionSender) {
        self.update_region(id, RegionUpdate::new().mask(mask), done);
    }

    /// Apply every change in `update` and schedule a single redraw
    ///
    /// Unknown ids and updates that change nothing resolve `done` immediately.
    pub fn update_region(&mut self, id: &RenderObjectId, update: RegionUpdate, done: CompletionSender) {
        self.check_alive();
        let Some(key) = self.lookup(id) else {
            done.complete();
            return;
        };

        let mut changed = false;
        if let Some(mask) = update.mask {
            changed |= self.apply_mask(key, mask);
        }

        let Some(object) = self.objects.get_mut(key) else {
            done.complete();
            return;
        };
        if let Some(offset) = update.offset {
            object.set_offset(offset);
            changed = true;
        }
        if let Some(style) = update.style {
            changed |= object.set_style(style);
        }

        if changed {
            object.invalidate(Some(Waiter::Once(done)));
        } else {
            tracing::trace!("{}: update changed nothing", id);
            done.complete();
        }
    }

    /// Set or release the mask of `key`; false when nothing changed
    ///
    /// The brush is stored even when rasterizing fails; `render_dirty` retries it
    /// before the next draw.
    fn apply_mask(&mut self, key: ObjectKey, mask: Option<MaskBrush>) -> bool {
        let Some(object) = self.objects.get_mut(key) else {
            return false;
        };
        match mask {
            Some(brush) => {
                if let Some(renderer) = self.masks.entry(key).map(|e| e.or_default()) {
                    if let Err(e) =
                        renderer.render_mask(self.backend.as_mut(), &brush, object.frame_size())
                    {
                        tracing::warn!("{}: failed to render mask, retrying on next draw: {}", object.id(), e);
                    }
                }
                object.set_mask(Some(brush));
                true
            }
            None => {
                if let Some(mut renderer) = self.masks.remove(key) {
                    renderer.release_current_mask(self.backend.as_mut());
                }
                let had_mask = object.mask().is_some();
                object.set_mask(None);
                had_mask
            }
        }
    }

    /// Redraw every registered region; `done` resolves once all of them landed
    pub fn request_render(&mut self, done: CompletionSender) {
        self.check_alive();
        if self.objects.is_empty() {
            done.complete();
            return;
        }
        let latch = RenderLatch::new(done);
        for object in self.objects.values_mut() {
            object.invalidate(Some(Waiter::Latch(latch.guard())));
        }
    }

    /// Record and submit the effect chain of every dirty render object
    ///
    /// Returns the number of objects submitted. Objects whose passes fail are
    /// skipped for this frame, keep their last presented frame and have their
    /// completions resolved.
    pub fn render_dirty(&mut self) -> usize {
        if self.destroyed || !self.shared.is_ready() {
            return 0;
        }

        let mut submitted: Vec<(ObjectKey, TextureId, IntSize)> = Vec::new();
        for (key, object) in self.objects.iter_mut() {
            if !object.state.is_dirty() {
                continue;
            }
            if object.is_inert() {
                object.state = RenderState::Clean;
                object.waiters.drain(..).for_each(Waiter::complete);
                continue;
            }

            let mask = match object.mask() {
                Some(brush) => match self.masks.entry(key).map(|e| e.or_default()) {
                    Some(renderer) => renderer
                        .render_mask(self.backend.as_mut(), brush, object.frame_size())
                        .map(Some),
                    None => Ok(None),
                },
                None => Ok(None),
            };
            let result = match mask {
                Ok(mask) => self
                    .effects
                    .apply_effects(self.backend.as_mut(), object, mask),
                Err(e) => Err(e),
            };
            match result {
                Ok(frame) => {
                    object.state = RenderState::Rendering;
                    submitted.push((key, frame.id, frame.size));
                }
                Err(e) => {
                    if e.is_allocation_failure() {
                        tracing::warn!("{}: skipping frame, out of GPU memory: {}", object.id(), e);
                    } else {
                        tracing::warn!("{}: skipping frame: {}", object.id(), e);
                    }
                    self.skipped += 1;
                    object.state = RenderState::Clean;
                    object.waiters.drain(..).for_each(Waiter::complete);
                }
            }
        }

        if submitted.is_empty() {
            return 0;
        }

        let submission = self.backend.submit();
        for (key, frame, size) in &submitted {
            if let Some(object) = self.objects.get_mut(*key) {
                let waiters = std::mem::take(&mut object.waiters);
                object.in_flight = Some(InFlight {
                    submission,
                    frame: *frame,
                    size: *size,
                    waiters,
                });
            }
        }
        self.renders += submitted.len() as u64;
        tracing::trace!("submitted {} render objects as {:?}", submitted.len(), submission);
        submitted.len()
    }

    /// Present every render whose GPU work finished and resolve its completions
    ///
    /// Returns the number of frames presented.
    pub fn poll_completions(&mut self) -> usize {
        if self.destroyed {
            return 0;
        }
        let Some(completed) = self.backend.poll() else {
            return 0;
        };

        let mut presented = 0;
        for object in self.objects.values_mut() {
            if !Self::is_complete(object.in_flight.as_ref(), completed) {
                continue;
            }
            let Some(in_flight) = object.in_flight.take() else {
                continue;
            };
            if let Err(e) =
                object
                    .target_mut()
                    .present(self.backend.as_mut(), in_flight.frame, in_flight.size)
            {
                tracing::warn!("{}: failed to present frame: {}", object.id(), e);
            }
            in_flight.waiters.into_iter().for_each(Waiter::complete);
            object.state = object.state.finish();
            presented += 1;
        }
        presented
    }

    fn is_complete(in_flight: Option<&InFlight>, completed: SubmissionIndex) -> bool {
        in_flight.is_some_and(|f| f.submission <= completed)
    }

    /// Whether any render is dirty or waiting on the GPU
    pub fn has_work(&self) -> bool {
        if self.destroyed || !self.shared.is_ready() {
            return false;
        }
        self.objects
            .values()
            .any(|o| o.in_flight.is_some() || o.state.is_dirty())
    }

    /// Render and poll until nothing is dirty or in flight
    pub fn flush(&mut self) {
        while self.has_work() {
            self.render_dirty();
            if self.poll_completions() == 0 && self.has_work() {
                std::thread::sleep(self.config.poll_interval());
            }
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            gpu: self.backend.stats(),
            render_objects: self.objects.len(),
            in_flight: self
                .objects
                .values()
                .filter(|o| o.in_flight.is_some())
                .count(),
            frames: self.shared.frame(),
            renders: self.renders,
            skipped: self.skipped,
        }
    }

    /// Release every render object and the shared capture
    ///
    /// Pending completions are canceled; `request_render` latches fire.
    ///
    /// # Panics
    ///
    /// If called twice.
    pub fn destroy(&mut self) {
        assert!(!self.destroyed, "Pipeline::destroy called twice");
        let keys: Vec<ObjectKey> = self.objects.keys().collect();
        for key in keys {
            self.release_object(key);
        }
        self.ids.clear();
        self.shared.destroy(self.backend.as_mut());
        self.destroyed = true;

        let stats = self.backend.stats();
        tracing::info!(
            "frost pipeline destroyed ({} renders, {} live textures)",
            self.renders,
            stats.live_textures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Completion;
    use crate::content::ContentCanvas;
    use crate::presentation::FrameCapture;
    use frost_core::{Color, Rect};
    use frost_gpu::SoftwareBackend;

    struct Fill(IntSize);

    impl UiContent for Fill {
        fn size(&self) -> IntSize {
            self.0
        }

        fn draw(&self, canvas: &mut ContentCanvas) {
            canvas.fill_rect(Rect::new(0.0, 0.0, 1e6, 1e6), Color::BLUE);
        }
    }

    fn pipeline(size: IntSize) -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            Box::new(SoftwareBackend::new()),
            Arc::new(Fill(size)),
        )
        .unwrap()
    }

    #[test]
    fn test_new_captures_content() {
        let pipeline = pipeline(IntSize::new(32, 32));
        assert!(pipeline.is_initialized());
        assert_eq!(pipeline.frames().borrow().frame, 1);
    }

    #[test]
    fn test_empty_content_is_uninitialized() {
        let mut pipeline = pipeline(IntSize::ZERO);
        assert!(!pipeline.is_initialized());
        pipeline.content_changed();
        assert!(!pipeline.is_initialized());
        assert_eq!(pipeline.backend().stats().textures_created, 0);
    }

    #[test]
    fn test_update_unknown_id_completes() {
        let mut pipeline = pipeline(IntSize::new(32, 32));
        let (done, completion) = Completion::channel();
        pipeline.update_offset(&"missing".into(), IntOffset::new(1, 1), done);
        assert_eq!(completion.wait(), Ok(()));
    }

    #[test]
    fn test_attach_renders_and_presents() {
        let mut pipeline = pipeline(IntSize::new(32, 32));
        let capture = FrameCapture::new();
        pipeline.attach("a".into(), Size::new(8.0, 8.0), Box::new(capture.clone()));

        let (done, mut completion) = Completion::channel();
        pipeline.request_render(done);
        assert_eq!(pipeline.render_dirty(), 1);
        assert!(completion.try_wait().is_none());
        assert_eq!(pipeline.poll_completions(), 1);
        assert_eq!(completion.try_wait(), Some(Ok(())));
        assert_eq!(capture.presented(), 1);
        assert!(!pipeline.has_work());
    }

    #[test]
    fn test_invalidate_while_rendering_renders_again() {
        let mut pipeline = pipeline(IntSize::new(32, 32));
        let capture = FrameCapture::new();
        let id: RenderObjectId = "a".into();
        pipeline.attach(id.clone(), Size::new(8.0, 8.0), Box::new(capture.clone()));
        pipeline.render_dirty();

        let (done, _completion) = Completion::channel();
        pipeline.update_offset(&id, IntOffset::new(4, 4), done);
        assert_eq!(
            pipeline.object(&id).unwrap().render_state(),
            RenderState::RenderingAndDirtyAgain
        );

        pipeline.poll_completions();
        assert_eq!(pipeline.object(&id).unwrap().render_state(), RenderState::Dirty);
        pipeline.flush();
        assert_eq!(capture.presented(), 2);
    }

    #[test]
    fn test_destroy_cancels_pending() {
        let mut pipeline = pipeline(IntSize::new(32, 32));
        let capture = FrameCapture::new();
        let id: RenderObjectId = "a".into();
        pipeline.attach(id.clone(), Size::new(8.0, 8.0), Box::new(capture.clone()));

        let (done, completion) = Completion::channel();
        pipeline.update_style(&id, Style::new(4.0), done);
        pipeline.destroy();

        assert_eq!(completion.wait(), Err(crate::RenderCanceled));
        assert!(capture.is_detached());
        assert_eq!(pipeline.backend().stats().live_textures, 0);
    }

    #[test]
    #[should_panic(expected = "before the shared layer was initialized")]
    fn test_attach_before_initialized_panics() {
        let mut pipeline = pipeline(IntSize::ZERO);
        pipeline.attach("a".into(), Size::new(8.0, 8.0), Box::new(FrameCapture::new()));
    }
}
