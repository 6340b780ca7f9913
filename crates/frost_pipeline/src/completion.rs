//! Completion signals handed back to the UI thread
//!
//! Every update returns a [`Completion`] that resolves once the redraw carrying the
//! update has finished on the GPU. If the render object goes away first (detached,
//! pipeline destroyed) the completion resolves to [`RenderCanceled`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;

/// The render a completion was waiting on will never happen
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("render canceled before completion")]
pub struct RenderCanceled;

/// Receiving half of a completion signal
#[derive(Debug)]
pub struct Completion {
    receiver: oneshot::Receiver<()>,
}

/// Sending half, owned by whoever finishes the work
#[derive(Debug)]
pub struct CompletionSender {
    sender: oneshot::Sender<()>,
}

impl Completion {
    pub fn channel() -> (CompletionSender, Completion) {
        let (sender, receiver) = oneshot::channel();
        (CompletionSender { sender }, Completion { receiver })
    }

    /// An already resolved completion
    pub fn ready() -> Completion {
        let (sender, completion) = Self::channel();
        sender.complete();
        completion
    }

    /// Block the calling thread until the render lands
    ///
    /// Must not be called from inside an async runtime; `.await` the completion
    /// there instead.
    pub fn wait(self) -> Result<(), RenderCanceled> {
        self.receiver.blocking_recv().map_err(|_| RenderCanceled)
    }

    /// Non-blocking check: `None` while still pending
    pub fn try_wait(&mut self) -> Option<Result<(), RenderCanceled>> {
        match self.receiver.try_recv() {
            Ok(()) => Some(Ok(())),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(RenderCanceled)),
        }
    }
}

impl Future for Completion {
    type Output = Result<(), RenderCanceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| RenderCanceled))
    }
}

impl CompletionSender {
    /// Signal success; a dropped receiver is not an error
    pub fn complete(self) {
        let _ = self.sender.send(());
    }
}

/// Count-down latch shared by every object taking part in one `request_render`
///
/// Each participant holds a [`LatchGuard`]; the completion fires when the last
/// guard is released, whether its render finished or its object was removed.
pub(crate) struct RenderLatch {
    state: Arc<LatchState>,
}

struct LatchState {
    sender: Option<CompletionSender>,
}

impl Drop for LatchState {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.complete();
        }
    }
}

/// One participant's share of a [`RenderLatch`]
pub(crate) struct LatchGuard {
    _state: Arc<LatchState>,
}

impl RenderLatch {
    pub(crate) fn new(sender: CompletionSender) -> Self {
        Self {
            state: Arc::new(LatchState {
                sender: Some(sender),
            }),
        }
    }

    pub(crate) fn guard(&self) -> LatchGuard {
        LatchGuard {
            _state: Arc::clone(&self.state),
        }
    }
}

/// Something waiting for an object's next finished render
pub(crate) enum Waiter {
    Once(CompletionSender),
    Latch(LatchGuard),
}

impl Waiter {
    pub(crate) fn complete(self) {
        match self {
            Waiter::Once(sender) => sender.complete(),
            Waiter::Latch(guard) => drop(guard),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_sender_cancels() {
        let (sender, completion) = Completion::channel();
        drop(sender);
        assert_eq!(completion.wait(), Err(RenderCanceled));
    }

    #[test]
    fn test_ready_resolves() {
        assert_eq!(Completion::ready().wait(), Ok(()));
    }

    #[test]
    fn test_latch_fires_after_last_guard() {
        let (sender, mut completion) = Completion::channel();
        let latch = RenderLatch::new(sender);
        let a = Waiter::Latch(latch.guard());
        let b = Waiter::Latch(latch.guard());
        drop(latch);

        a.complete();
        assert!(completion.try_wait().is_none());
        b.complete();
        assert_eq!(completion.try_wait(), Some(Ok(())));
    }

    #[test]
    fn test_completion_is_awaitable() {
        let (sender, completion) = Completion::channel();
        sender.complete();
        assert_eq!(pollster::block_on(completion), Ok(()));
    }
}
