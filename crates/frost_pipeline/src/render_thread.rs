//! GPU command thread
//!
//! The only thread that touches the backend. It drains every queued command before
//! rendering so that updates arriving together land in the same frame, then renders
//! dirty objects and polls for finished submissions. While renders are in flight it
//! wakes every `poll_interval`; otherwise it blocks on the command channel.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};

use frost_core::{IntOffset, MaskBrush, RenderObjectId, Size, Style};
use tokio::sync::oneshot;

use crate::completion::CompletionSender;
use crate::pipeline::{Pipeline, PipelineStats, RegionUpdate};
use crate::presentation::PresentationTarget;

/// Work sent from the UI thread
pub(crate) enum Command {
    ContentChanged,
    Attach {
        id: RenderObjectId,
        size: Size,
        target: Box<dyn PresentationTarget>,
    },
    Detach(RenderObjectId),
    UpdateOffset {
        id: RenderObjectId,
        offset: IntOffset,
        done: CompletionSender,
    },
    UpdateStyle {
        id: RenderObjectId,
        style: Style,
        done: CompletionSender,
    },
    UpdateMask {
        id: RenderObjectId,
        mask: Option<MaskBrush>,
        done: CompletionSender,
    },
    UpdateRegion {
        id: RenderObjectId,
        update: RegionUpdate,
        done: CompletionSender,
    },
    RequestRender(CompletionSender),
    Stats(oneshot::Sender<PipelineStats>),
    Destroy,
}

enum Flow {
    Continue,
    Stop,
}

fn handle(pipeline: &mut Pipeline, command: Command) -> Flow {
    match command {
        Command::ContentChanged => pipeline.content_changed(),
        Command::Attach { id, size, target } => pipeline.attach(id, size, target),
        Command::Detach(id) => pipeline.detach(&id),
        Command::UpdateOffset { id, offset, done } => pipeline.update_offset(&id, offset, done),
        Command::UpdateStyle { id, style, done } => pipeline.update_style(&id, style, done),
        Command::UpdateMask { id, mask, done } => pipeline.update_mask(&id, mask, done),
        Command::UpdateRegion { id, update, done } => pipeline.update_region(&id, update, done),
        Command::RequestRender(done) => pipeline.request_render(done),
        Command::Stats(reply) => {
            let _ = reply.send(pipeline.stats());
        }
        Command::Destroy => return Flow::Stop,
    }
    Flow::Continue
}

/// Render everything dirty, presenting what finished, until nothing new lands
fn render(pipeline: &mut Pipeline) {
    loop {
        pipeline.render_dirty();
        if pipeline.poll_completions() == 0 {
            break;
        }
    }
}

/// Thread body; returns after `Destroy` or when every sender is gone
pub(crate) fn run(mut pipeline: Pipeline, commands: Receiver<Command>) {
    let poll_interval = pipeline.config().poll_interval();
    tracing::info!("render thread started");

    'run: loop {
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if let Flow::Stop = handle(&mut pipeline, command) {
                        break 'run;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'run,
            }
        }

        render(&mut pipeline);

        let next = if pipeline.has_work() {
            match commands.recv_timeout(poll_interval) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };
        if let Some(command) = next {
            if let Flow::Stop = handle(&mut pipeline, command) {
                break;
            }
        }
    }

    pipeline.destroy();
    tracing::info!("render thread stopped");
}
