//! Bus worker: one mailbox, one sequential handler.
//!
//! Provides a generic `BusWorker` that drains request frames from an mpsc
//! mailbox through a `FrameHandler`, one frame at a time in arrival order,
//! and publishes each reply frame to the shared [`PendingReplies`] table.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::pending::PendingReplies;

// ---------------------------------------------------------------------------
// FrameHandler trait
// ---------------------------------------------------------------------------

/// Request handler executed by a `BusWorker`.
///
/// `handle` is never called concurrently for the same worker: the next frame
/// is taken from the mailbox only after the previous call has returned.
#[async_trait]
pub trait FrameHandler: Send + 'static {
    /// Process one request frame, returning the reply frame to publish.
    ///
    /// `None` means there is nobody to reply to (e.g. the frame carried no
    /// readable correlation id).
    async fn handle(&mut self, frame: Bytes) -> Option<Bytes>;

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BusWorker
// ---------------------------------------------------------------------------

/// Handle to a spawned worker task.
///
/// The worker task:
/// 1. Receives frames on its mailbox
/// 2. Calls `FrameHandler::handle()` for each, awaiting it fully
/// 3. Resolves the matching caller through `PendingReplies::complete_frame()`
/// 4. Calls `FrameHandler::shutdown()` when stopped or when every mailbox
///    sender is gone
pub struct BusWorker {
    mailbox: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl BusWorker {
    /// Spawns the worker task with a mailbox of `capacity` frames.
    pub fn start<H: FrameHandler>(
        name: impl Into<String>,
        mut handler: H,
        capacity: usize,
        replies: Arc<PendingReplies>,
    ) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::channel::<Bytes>(capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            debug!(worker = %name, "bus worker started");
            loop {
                tokio::select! {
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Some(reply) = handler.handle(frame).await {
                            replies.complete_frame(&reply);
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }

            handler.shutdown().await;
            debug!(worker = %name, "bus worker stopped");
        });

        Self {
            mailbox: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// A sender for this worker's mailbox, or `None` once stopped.
    #[must_use]
    pub fn mailbox(&self) -> Option<mpsc::Sender<Bytes>> {
        self.mailbox.clone()
    }

    /// Stop the worker, letting the frame in progress finish first.
    ///
    /// Frames still queued are dropped; their callers time out.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.mailbox.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
