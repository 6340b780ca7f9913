//! UI-facing handle
//!
//! [`BackdropRenderer`] owns the GPU command thread. Every call is non-blocking: it
//! queues a command and returns a [`Completion`] that resolves once the resulting
//! redraw has been presented.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use frost_core::{IntOffset, MaskBrush, RenderObjectId, Size, Style};
use frost_gpu::GpuBackend;
use tokio::sync::{oneshot, watch};

use crate::completion::{Completion, CompletionSender};
use crate::config::PipelineConfig;
use crate::content::UiContent;
use crate::error::{PipelineError, Result};
use crate::pipeline::{FrameInfo, Pipeline, PipelineStats, RegionUpdate};
use crate::presentation::PresentationTarget;
use crate::render_thread::{self, Command};

/// Handle to a backdrop blur pipeline running on its own thread
pub struct BackdropRenderer {
    commands: mpsc::Sender<Command>,
    frames: watch::Receiver<FrameInfo>,
    thread: Option<JoinHandle<()>>,
}

impl BackdropRenderer {
    /// Build the pipeline on the calling thread, then hand it to a new render thread
    ///
    /// GPU failures while capturing the initial content are returned here.
    pub fn new(
        config: PipelineConfig,
        backend: impl GpuBackend + 'static,
        content: Arc<dyn UiContent>,
    ) -> Result<Self> {
        let config = config.validated();
        let thread_name = config.thread_name.clone();
        let pipeline = Pipeline::new(config, Box::new(backend), content)?;
        let frames = pipeline.frames();

        let (commands, receiver) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || render_thread::run(pipeline, receiver))
            .map_err(PipelineError::ThreadSpawn)?;

        Ok(Self {
            commands,
            frames,
            thread: Some(thread),
        })
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("render thread is gone, dropping command");
        }
    }

    fn send_with_completion(&self, command: impl FnOnce(CompletionSender) -> Command) -> Completion {
        let (done, completion) = Completion::channel();
        self.send(command(done));
        completion
    }

    /// Whether the shared capture has produced a frame
    ///
    /// Regions may only be attached once this is true.
    pub fn is_initialized(&self) -> bool {
        self.frames.borrow().frame > 0
    }

    /// Subscribe to frame-available notifications
    pub fn frames(&self) -> watch::Receiver<FrameInfo> {
        self.frames.clone()
    }

    /// The UI content changed; re-capture it and redraw every region
    pub fn content_changed(&self) {
        self.send(Command::ContentChanged);
    }

    /// Start blurring a region of `size` behind `target`
    ///
    /// An existing region with the same id is replaced.
    ///
    /// # Panics
    ///
    /// If the shared capture is not initialized yet.
    pub fn attach(
        &self,
        id: impl Into<RenderObjectId>,
        size: Size,
        target: impl PresentationTarget + 'static,
    ) {
        let id = id.into();
        assert!(
            self.is_initialized(),
            "render object {} attached before the shared layer was initialized",
            id
        );
        self.send(Command::Attach {
            id,
            size,
            target: Box::new(target),
        });
    }

    /// Stop blurring a region; its pending completions resolve as canceled
    pub fn detach(&self, id: impl Into<RenderObjectId>) {
        self.send(Command::Detach(id.into()));
    }

    pub fn update_offset(&self, id: impl Into<RenderObjectId>, offset: IntOffset) -> Completion {
        let id = id.into();
        self.send_with_completion(|done| Command::UpdateOffset { id, offset, done })
    }

    pub fn update_style(&self, id: impl Into<RenderObjectId>, style: Style) -> Completion {
        let id = id.into();
        self.send_with_completion(|done| Command::UpdateStyle { id, style, done })
    }

    pub fn update_mask(&self, id: impl Into<RenderObjectId>, mask: Option<MaskBrush>) -> Completion {
        let id = id.into();
        self.send_with_completion(|done| Command::UpdateMask { id, mask, done })
    }

    /// Apply offset, style and mask changes together in one redraw
    pub fn update_region(&self, id: impl Into<RenderObjectId>, update: RegionUpdate) -> Completion {
        let id = id.into();
        self.send_with_completion(|done| Command::UpdateRegion { id, update, done })
    }

    /// Redraw every region; resolves after all of them were presented
    pub fn request_render(&self) -> Completion {
        self.send_with_completion(Command::RequestRender)
    }

    /// Pipeline counters, or `None` if the render thread has stopped
    ///
    /// Blocks until the render thread answers; do not call from async code.
    pub fn stats(&self) -> Option<PipelineStats> {
        let (reply, receiver) = oneshot::channel();
        self.send(Command::Stats(reply));
        receiver.blocking_recv().ok()
    }

    /// Release every region and the shared capture, then stop the render thread
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.commands.send(Command::Destroy);
        if thread.join().is_err() {
            tracing::error!("render thread panicked");
        }
    }
}

impl Drop for BackdropRenderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
