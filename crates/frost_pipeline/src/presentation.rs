//! Destination surfaces for composited regions

use std::sync::{Arc, Mutex};

use frost_core::IntSize;
use frost_gpu::{GpuBackend, GpuError, TextureId};

/// Where a render object's finished frames go
///
/// Owned by the render object and driven from the GPU command thread. `present` is
/// only ever called with a fully composited frame whose GPU work has completed.
pub trait PresentationTarget: Send {
    /// Show `frame`; implementations copy or read it back before returning
    fn present(
        &mut self,
        backend: &mut dyn GpuBackend,
        frame: TextureId,
        size: IntSize,
    ) -> Result<(), GpuError>;

    /// The render object is going away; release the surface
    fn detach(&mut self);
}

/// A frame read back to the CPU
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedFrame {
    pub size: IntSize,
    /// Top-down RGBA8
    pub pixels: Vec<u8>,
    /// Count of frames presented to this target so far
    pub sequence: u64,
}

impl CapturedFrame {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.size.width + x) * 4) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

#[derive(Default)]
struct CaptureState {
    latest: Option<CapturedFrame>,
    presented: u64,
    detached: bool,
}

/// Target that reads every presented frame back into memory
///
/// Used for headless rendering and tests. Clones share the same storage, so keep
/// one clone to inspect frames while the other is owned by the render object.
#[derive(Clone, Default)]
pub struct FrameCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl FrameCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently presented frame
    pub fn latest(&self) -> Option<CapturedFrame> {
        self.lock().latest.clone()
    }

    /// Number of frames presented
    pub fn presented(&self) -> u64 {
        self.lock().presented
    }

    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PresentationTarget for FrameCapture {
    fn present(
        &mut self,
        backend: &mut dyn GpuBackend,
        frame: TextureId,
        size: IntSize,
    ) -> Result<(), GpuError> {
        let pixels = backend.read_pixels(frame)?;
        let mut state = self.lock();
        state.presented += 1;
        let sequence = state.presented;
        state.latest = Some(CapturedFrame {
            size,
            pixels,
            sequence,
        });
        Ok(())
    }

    fn detach(&mut self) {
        self.lock().detached = true;
    }
}
