//! Repository workers: bus workers that run person operations.
//!
//! Every worker is bound to all three operation addresses and owns one
//! mailbox, so the requests it receives are handled strictly in arrival
//! order. The blocking storage call runs on tokio's blocking pool and is
//! awaited before the next frame is taken.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use peoplebus_core::{decode_request, EnvelopeError, OperationKind, ReplyEnvelope};
use tracing::{debug, error, warn};

use super::operations::{execute, OperationFailure};
use super::PersonRepository;
use crate::bus::{BusConfig, BusWorker, Dispatcher, FrameHandler};

// ---------------------------------------------------------------------------
// RepositoryHandler
// ---------------------------------------------------------------------------

/// Message of the error reply sent for a request that names an id but is
/// otherwise unusable.
pub const MALFORMED_REQUEST: &str = "Malformed request.";

/// Frame handler that decodes a request, runs it, and encodes the reply.
pub struct RepositoryHandler {
    name: String,
    repository: Arc<dyn PersonRepository>,
}

impl RepositoryHandler {
    #[must_use]
    pub fn new(name: impl Into<String>, repository: Arc<dyn PersonRepository>) -> Self {
        Self {
            name: name.into(),
            repository,
        }
    }
}

#[async_trait]
impl FrameHandler for RepositoryHandler {
    async fn handle(&mut self, frame: Bytes) -> Option<Bytes> {
        let envelope = match decode_request(&frame) {
            Ok(envelope) => envelope,
            Err(err) => return self.reject(&err),
        };
        let request_id = envelope.request_id().clone();
        let kind = envelope.kind();
        debug!(worker = %self.name, %request_id, address = kind.address(), "handling request");

        let repository = Arc::clone(&self.repository);
        let outcome =
            tokio::task::spawn_blocking(move || execute(repository.as_ref(), envelope.operation()))
                .await
                .unwrap_or(Err(OperationFailure::Panicked));

        let reply = match outcome {
            Ok(result) => ReplyEnvelope::ok(request_id, result),
            Err(failure) => {
                log_failure(&self.name, kind, &failure);
                ReplyEnvelope::err(request_id, failure.reply_message(kind))
            }
        };

        encode_reply(&self.name, &reply)
    }

    async fn shutdown(&mut self) {
        debug!(worker = %self.name, "repository worker shutting down");
    }
}

impl RepositoryHandler {
    /// Answers a request that could not be decoded, when its id is known.
    fn reject(&self, err: &EnvelopeError) -> Option<Bytes> {
        let Some(request_id) = err.request_id() else {
            error!(worker = %self.name, error = %err, "dropping undecodable request frame");
            return None;
        };
        warn!(worker = %self.name, %request_id, error = %err, "rejecting malformed request");
        encode_reply(
            &self.name,
            &ReplyEnvelope::err(request_id.clone(), MALFORMED_REQUEST),
        )
    }
}

fn encode_reply(worker: &str, reply: &ReplyEnvelope) -> Option<Bytes> {
    match reply.to_bytes() {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(err) => {
            error!(worker, error = %err, "unable to encode reply");
            None
        }
    }
}

fn log_failure(worker: &str, kind: OperationKind, failure: &OperationFailure) {
    match failure {
        OperationFailure::Validation(err) => {
            debug!(worker, address = kind.address(), error = %err, "rejected invalid request");
        }
        other => {
            error!(
                worker,
                address = kind.address(),
                error = %other,
                "repository operation failed; returning error reply"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// A set of interchangeable repository workers sharing one repository handle.
pub struct WorkerPool {
    workers: Vec<BusWorker>,
}

impl WorkerPool {
    /// Starts `config.worker_count` workers and binds each to every
    /// operation address on `dispatcher`.
    pub fn spawn(
        config: &BusConfig,
        repository: Arc<dyn PersonRepository>,
        dispatcher: &Dispatcher,
    ) -> Self {
        let workers = (0..config.worker_count)
            .map(|index| {
                let name = format!("repository-{index}");
                let handler = RepositoryHandler::new(name.clone(), Arc::clone(&repository));
                let worker =
                    BusWorker::start(name, handler, config.mailbox_capacity, dispatcher.replies());
                if let Some(mailbox) = worker.mailbox() {
                    for kind in OperationKind::ALL {
                        dispatcher.register(kind, mailbox.clone());
                    }
                }
                worker
            })
            .collect();

        Self { workers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stops every worker, letting in-progress operations finish.
    pub async fn shutdown(mut self) {
        for worker in &mut self.workers {
            worker.stop().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use peoplebus_core::{encode_request, new_correlation_id, stamp, Person, PersonId, ReplyStatus};
    use serde_json::json;

    use super::*;
    use crate::repository::{MemoryPersonRepository, PersistenceError};

    /// Memory repository that records overlapping calls and can be told to
    /// fail or panic.
    #[derive(Default)]
    struct InstrumentedRepository {
        inner: MemoryPersonRepository,
        active: AtomicU32,
        max_active: AtomicU32,
        fail: bool,
        panic: bool,
    }

    impl InstrumentedRepository {
        fn enter(&self) -> Result<(), PersistenceError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            assert!(!self.panic, "storage engine exploded");
            if self.fail {
                return Err(PersistenceError::Backend("disk full".into()));
            }
            Ok(())
        }
    }

    impl PersonRepository for InstrumentedRepository {
        fn persist(&self, person: Person) -> Result<Person, PersistenceError> {
            self.enter()?;
            self.inner.persist(person)
        }

        fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, PersistenceError> {
            self.enter()?;
            self.inner.find_by_id(id)
        }

        fn list_all(&self) -> Result<Vec<Person>, PersistenceError> {
            self.enter()?;
            self.inner.list_all()
        }
    }

    fn config(workers: usize) -> BusConfig {
        BusConfig {
            worker_count: workers,
            ..BusConfig::default()
        }
    }

    async fn send(
        dispatcher: &Dispatcher,
        kind: OperationKind,
        entity_id: Option<&str>,
        payload: Option<serde_json::Value>,
    ) -> ReplyEnvelope {
        let request = encode_request(kind, entity_id, payload).unwrap();
        let envelope = stamp(request, new_correlation_id());
        dispatcher
            .send(envelope, Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn spawn_binds_every_address() {
        let dispatcher = Dispatcher::new();
        let repository = Arc::new(MemoryPersonRepository::new());
        let pool = WorkerPool::spawn(&config(3), repository, &dispatcher);

        assert_eq!(pool.len(), 3);
        for kind in OperationKind::ALL {
            assert_eq!(dispatcher.worker_count(kind), 3);
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn create_find_and_list_through_the_bus() {
        let dispatcher = Dispatcher::new();
        let repository = Arc::new(MemoryPersonRepository::new());
        let pool = WorkerPool::spawn(&config(2), repository, &dispatcher);

        let payload = json!({"name": "Ada"});
        let created = send(&dispatcher, OperationKind::Create, None, Some(payload)).await;
        assert_eq!(created.result(), Some(r#"{"id":1,"name":"Ada"}"#));

        let found = send(&dispatcher, OperationKind::FindById, Some("1"), None).await;
        assert_eq!(found.result(), Some(r#"{"id":1,"name":"Ada"}"#));

        let missing = send(&dispatcher, OperationKind::FindById, Some("2"), None).await;
        assert!(missing.is_empty_result());

        let listed = send(&dispatcher, OperationKind::List, None, None).await;
        assert_eq!(listed.result(), Some(r#"[{"id":1,"name":"Ada"}]"#));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn persistence_fault_becomes_error_reply() {
        let dispatcher = Dispatcher::new();
        let repository = Arc::new(InstrumentedRepository {
            fail: true,
            ..InstrumentedRepository::default()
        });
        let pool = WorkerPool::spawn(&config(1), repository, &dispatcher);

        let reply = send(&dispatcher, OperationKind::List, None, None).await;
        assert_eq!(reply.status(), ReplyStatus::Err);
        assert_eq!(reply.message(), Some("Unable to read people from the database."));

        // The worker is still alive after the fault.
        let again = send(&dispatcher, OperationKind::List, None, None).await;
        assert_eq!(again.status(), ReplyStatus::Err);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_storage_does_not_kill_worker() {
        let dispatcher = Dispatcher::new();
        let repository = Arc::new(InstrumentedRepository {
            panic: true,
            ..InstrumentedRepository::default()
        });
        let pool = WorkerPool::spawn(&config(1), repository, &dispatcher);

        for _ in 0..2 {
            let reply = send(&dispatcher, OperationKind::List, None, None).await;
            assert_eq!(reply.status(), ReplyStatus::Err);
        }
        assert_eq!(dispatcher.worker_count(OperationKind::List), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn single_worker_serves_concurrent_callers_sequentially() {
        let dispatcher = Arc::new(Dispatcher::new());
        let repository = Arc::new(InstrumentedRepository::default());
        let pool = WorkerPool::spawn(
            &config(1),
            Arc::clone(&repository) as Arc<dyn PersonRepository>,
            &dispatcher,
        );

        let mut tasks = Vec::new();
        for i in 0..8 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                let payload = json!({ "name": format!("person-{i}") });
                let request = encode_request(OperationKind::Create, None, Some(payload)).unwrap();
                let id = new_correlation_id();
                let reply = dispatcher
                    .send(stamp(request, id.clone()), Duration::from_secs(10))
                    .await
                    .unwrap();
                (i, id, reply)
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for task in tasks {
            let (i, id, reply) = task.await.unwrap();
            assert_eq!(reply.request_id(), &id);
            let person: Person = serde_json::from_str(reply.result().unwrap()).unwrap();
            assert_eq!(person.name, format!("person-{i}"));
            assert!(ids.insert(id));
        }

        assert_eq!(repository.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending_count(), 0);
        pool.shutdown().await;
    }

    fn handler() -> RepositoryHandler {
        RepositoryHandler::new("repository-test", Arc::new(MemoryPersonRepository::new()))
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped() {
        assert!(handler().handle(Bytes::from_static(b"\xc1")).await.is_none());
    }

    #[tokio::test]
    async fn malformed_request_with_readable_id_gets_error_reply() {
        let frames = [
            json!({"request-id": "r-1", "operation": {"type": "find-by-id", "entity-id": ""}}),
            json!({"request-id": "r-2", "operation": {"type": "create"}}),
            json!({"request-id": "r-3", "operation": {"type": "delete"}}),
        ];
        for frame in frames {
            let bytes = rmp_serde::to_vec_named(&frame).unwrap();
            let reply = handler().handle(Bytes::from(bytes)).await.unwrap();
            let reply = peoplebus_core::decode_reply(&reply).unwrap();

            assert_eq!(reply.request_id().as_str(), frame["request-id"]);
            assert_eq!(reply.status(), ReplyStatus::Err);
            assert_eq!(reply.message(), Some(MALFORMED_REQUEST));
        }
    }

    #[tokio::test]
    async fn malformed_request_resolves_waiting_caller() {
        let dispatcher = Dispatcher::new();
        let repository = Arc::new(MemoryPersonRepository::new());
        let pool = WorkerPool::spawn(&config(1), repository, &dispatcher);
        let replies = dispatcher.replies();

        let id = new_correlation_id();
        let wait = replies.register(id.clone()).unwrap();
        let frame = rmp_serde::to_vec_named(&json!({
            "request-id": id.as_str(),
            "operation": {"type": "find-by-id", "entity-id": "  "}
        }))
        .unwrap();
        let mailbox = pool.workers[0].mailbox().unwrap();
        mailbox.send(Bytes::from(frame)).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(1), wait.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.request_id(), &id);
        assert_eq!(reply.status(), ReplyStatus::Err);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_unbinds_workers() {
        let dispatcher = Dispatcher::new();
        let repository = Arc::new(MemoryPersonRepository::new());
        let pool = WorkerPool::spawn(&config(2), repository, &dispatcher);
        pool.shutdown().await;

        assert_eq!(dispatcher.worker_count(OperationKind::Create), 0);
    }
}
