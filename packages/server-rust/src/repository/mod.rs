//! Person persistence and the repository workers that serve the bus.
//!
//! - [`PersonRepository`]: the storage interface workers call into
//! - [`memory`]: ordered in-memory backend
//! - [`redb`](mod@crate::repository::redb): embedded on-disk backend (feature `redb`)
//! - [`operations`]: Create / `FindById` / List executed against a repository
//! - [`pool`]: bus workers bound to all three operation addresses

pub mod memory;
pub mod operations;
pub mod pool;
#[cfg(feature = "redb")]
pub mod redb;

use peoplebus_core::{Person, PersonId};

pub use memory::MemoryPersonRepository;
pub use operations::{execute, OperationFailure};
pub use pool::{RepositoryHandler, WorkerPool};
#[cfg(feature = "redb")]
pub use self::redb::RedbPersonRepository;

/// Storage-layer failures. Workers turn these into error replies.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("stored person {id} is unreadable: {source}")]
    Corrupt {
        id: PersonId,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to serialize person: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("person id space exhausted")]
    IdSpaceExhausted,
}

/// Blocking person storage.
///
/// Called from the blocking thread pool, one operation at a time per
/// worker. Implementations must be safe to share between workers.
pub trait PersonRepository: Send + Sync + 'static {
    /// Stores a new person and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write cannot be completed.
    fn persist(&self, person: Person) -> Result<Person, PersistenceError>;

    /// Looks a person up by id. Absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the read cannot be completed.
    fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, PersistenceError>;

    /// Returns every stored person in id order.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the read cannot be completed.
    fn list_all(&self) -> Result<Vec<Person>, PersistenceError>;
}
