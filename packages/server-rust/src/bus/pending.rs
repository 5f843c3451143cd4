//! Table of callers waiting for a reply, keyed by correlation id.
//!
//! Uses `DashMap` so many request tasks can insert and remove concurrently
//! without a global lock. An entry is removed exactly once: either by the
//! reply that resolves it or by the [`PendingWait`] guard when the caller
//! stops waiting (timeout, delivery failure, or the caller's future being
//! dropped).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use peoplebus_core::{decode_reply, ReplyEnvelope, RequestId};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Shared correlation table between the dispatcher and the workers.
#[derive(Debug, Default)]
pub struct PendingReplies {
    waits: DashMap<RequestId, oneshot::Sender<ReplyEnvelope>>,
}

impl PendingReplies {
    #[must_use]
    pub fn new() -> Self {
        Self {
            waits: DashMap::new(),
        }
    }

    /// Opens a wait for `request_id`.
    ///
    /// Returns `None` if a wait with the same id is already open.
    #[must_use]
    pub fn register(self: &Arc<Self>, request_id: RequestId) -> Option<PendingWait> {
        match self.waits.entry(request_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Some(PendingWait {
                    rx,
                    guard: PendingGuard {
                        table: Arc::clone(self),
                        request_id,
                    },
                })
            }
        }
    }

    /// Resolves the wait matching the reply's request id.
    ///
    /// Returns `false` and records an anomaly when no wait is open for that
    /// id (unknown, duplicate, or late reply).
    pub fn complete(&self, reply: ReplyEnvelope) -> bool {
        let Some((request_id, tx)) = self.waits.remove(reply.request_id()) else {
            warn!(
                request_id = %reply.request_id(),
                "discarding reply with no pending request (unknown, duplicate or late)"
            );
            metrics::counter!("peoplebus_reply_anomalies_total", "kind" => "unmatched")
                .increment(1);
            return false;
        };

        if tx.send(reply).is_err() {
            debug!(%request_id, "caller stopped waiting before the reply was handed over");
        }
        true
    }

    /// Decodes a reply frame and resolves the matching wait.
    ///
    /// Undecodable frames are logged and dropped.
    pub fn complete_frame(&self, frame: &[u8]) -> bool {
        match decode_reply(frame) {
            Ok(reply) => self.complete(reply),
            Err(err) => {
                warn!(error = %err, "discarding malformed reply frame");
                metrics::counter!("peoplebus_reply_anomalies_total", "kind" => "malformed")
                    .increment(1);
                false
            }
        }
    }

    /// Whether a wait is currently open for `request_id`.
    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.waits.contains_key(request_id)
    }

    /// Number of open waits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }
}

/// A caller's handle on its open wait.
///
/// Dropping it (without or after receiving the reply) removes the table
/// entry if the reply has not already done so.
#[derive(Debug)]
pub struct PendingWait {
    rx: oneshot::Receiver<ReplyEnvelope>,
    guard: PendingGuard,
}

impl PendingWait {
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.guard.request_id
    }

    /// Waits for the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait was removed without a reply being sent.
    pub async fn wait(self) -> Result<ReplyEnvelope, oneshot::error::RecvError> {
        let Self { rx, guard } = self;
        let reply = rx.await;
        drop(guard);
        reply
    }
}

/// RAII guard that releases the table slot on every exit path.
#[derive(Debug)]
struct PendingGuard {
    table: Arc<PendingReplies>,
    request_id: RequestId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.waits.remove(&self.request_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
