//! Request/reply dispatch to worker mailboxes.
//!
//! Each [`OperationKind`] is an address with zero or more worker mailboxes
//! bound to it. [`Dispatcher::send`] hands a request frame to exactly one of
//! them (round-robin, skipping closed mailboxes) and suspends the calling
//! task until the matching reply arrives or the timeout elapses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use peoplebus_core::{EnvelopeError, OperationKind, ReplyEnvelope, RequestEnvelope, RequestId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::pending::PendingReplies;

/// Sender half of a worker mailbox.
pub type Mailbox = mpsc::Sender<Bytes>;

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Dispatch-level failures. None of these is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no reply to request {request_id} within {timeout_ms}ms")]
    Timeout {
        request_id: RequestId,
        timeout_ms: u64,
    },
    #[error("could not deliver request to {address}: {reason}")]
    DeliveryFailure {
        address: &'static str,
        reason: &'static str,
    },
    #[error("request {0} is already awaiting a reply")]
    DuplicateRequestId(RequestId),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl DispatchError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::DeliveryFailure { .. } => "delivery_failure",
            Self::DuplicateRequestId(_) => "duplicate_id",
            Self::Envelope(_) => "malformed",
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Mailboxes bound to one address plus its round-robin cursor.
#[derive(Debug, Default)]
struct Route {
    mailboxes: Vec<Mailbox>,
    cursor: AtomicUsize,
}

impl Route {
    /// Live mailboxes, starting at the next round-robin position.
    fn rotation(&self) -> Vec<Mailbox> {
        let live: Vec<&Mailbox> = self.mailboxes.iter().filter(|m| !m.is_closed()).collect();
        if live.is_empty() {
            return Vec::new();
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % live.len();
        live.iter()
            .cycle()
            .skip(start)
            .take(live.len())
            .map(|m| Mailbox::clone(m))
            .collect()
    }
}

/// Routes request envelopes to worker mailboxes and matches the replies.
///
/// Shared via `Arc` between all HTTP request tasks. The pending-reply table
/// is shared with the workers, which publish their replies into it.
#[derive(Debug)]
pub struct Dispatcher {
    routes: RwLock<HashMap<OperationKind, Route>>,
    pending: Arc<PendingReplies>,
}

impl Dispatcher {
    /// Creates a dispatcher with no workers bound.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            pending: Arc::new(PendingReplies::new()),
        }
    }

    /// Binds a worker mailbox to `kind`, dropping mailboxes of workers
    /// that have since stopped.
    pub fn register(&self, kind: OperationKind, mailbox: Mailbox) {
        let mut routes = self.routes.write();
        let mailboxes = &mut routes.entry(kind).or_default().mailboxes;
        mailboxes.retain(|m| !m.is_closed());
        mailboxes.push(mailbox);
        debug!(address = kind.address(), bound = mailboxes.len(), "worker bound");
    }

    /// The reply table workers publish into.
    #[must_use]
    pub fn replies(&self) -> Arc<PendingReplies> {
        Arc::clone(&self.pending)
    }

    /// Number of live workers bound to `kind`.
    #[must_use]
    pub fn worker_count(&self, kind: OperationKind) -> usize {
        self.routes.read().get(&kind).map_or(0, |route| {
            route.mailboxes.iter().filter(|m| !m.is_closed()).count()
        })
    }

    /// Number of requests currently awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `request_id` is still awaiting a reply.
    #[must_use]
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains(request_id)
    }

    /// Sends `envelope` to one worker and waits for its reply.
    ///
    /// Fails immediately with [`DispatchError::DeliveryFailure`] when no live
    /// worker is bound to the envelope's address. On timeout the pending
    /// entry is released and a late reply is discarded. Dropping the
    /// returned future releases the entry as well; the worker still runs.
    ///
    /// # Errors
    ///
    /// See [`DispatchError`].
    pub async fn send(
        &self,
        envelope: RequestEnvelope,
        timeout: Duration,
    ) -> Result<ReplyEnvelope, DispatchError> {
        let kind = envelope.kind();
        let started = Instant::now();
        let result = self.dispatch(envelope, timeout).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.outcome(),
        };
        metrics::counter!(
            "peoplebus_dispatch_total",
            "operation" => kind.address(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("peoplebus_dispatch_duration_seconds", "operation" => kind.address())
            .record(started.elapsed().as_secs_f64());

        result
    }

    async fn dispatch(
        &self,
        envelope: RequestEnvelope,
        timeout: Duration,
    ) -> Result<ReplyEnvelope, DispatchError> {
        let address = envelope.kind().address();
        let request_id = envelope.request_id().clone();

        let candidates = self
            .routes
            .read()
            .get(&envelope.kind())
            .map(Route::rotation)
            .unwrap_or_default();
        if candidates.is_empty() {
            warn!(%request_id, address, "no worker bound");
            return Err(DispatchError::DeliveryFailure {
                address,
                reason: "no worker registered",
            });
        }

        let frame = Bytes::from(envelope.to_bytes()?);
        let wait = self
            .pending
            .register(request_id.clone())
            .ok_or_else(|| DispatchError::DuplicateRequestId(request_id.clone()))?;

        let exchange = async move {
            deliver(address, &candidates, frame).await?;
            debug!(request_id = %wait.request_id(), address, "request delivered");
            wait.wait().await.map_err(|_| DispatchError::DeliveryFailure {
                address,
                reason: "reply channel closed",
            })
        };

        if let Ok(result) = tokio::time::timeout(timeout, exchange).await {
            result
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let timeout_ms = timeout.as_millis() as u64;
            warn!(%request_id, address, timeout_ms, "request timed out");
            Err(DispatchError::Timeout {
                request_id,
                timeout_ms,
            })
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Puts `frame` into the first mailbox that accepts it.
///
/// A full mailbox applies backpressure (the send waits); a closed one is
/// skipped.
async fn deliver(
    address: &'static str,
    candidates: &[Mailbox],
    frame: Bytes,
) -> Result<(), DispatchError> {
    for mailbox in candidates {
        if mailbox.send(frame.clone()).await.is_ok() {
            return Ok(());
        }
        debug!(address, "skipping closed worker mailbox");
    }
    Err(DispatchError::DeliveryFailure {
        address,
        reason: "every bound worker has stopped",
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
