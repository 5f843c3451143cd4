//! In-memory [`PersonRepository`] backed by a `BTreeMap`.
//!
//! Ids are assigned sequentially from 1. Suitable for development, tests,
//! and runs without a database file.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use peoplebus_core::{Person, PersonId};

use super::{PersistenceError, PersonRepository};

#[derive(Debug, Default)]
struct Inner {
    people: BTreeMap<PersonId, Person>,
    last_id: PersonId,
}

/// Ordered in-memory person storage.
#[derive(Debug, Default)]
pub struct MemoryPersonRepository {
    inner: RwLock<Inner>,
}

impl MemoryPersonRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().people.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().people.is_empty()
    }
}

impl PersonRepository for MemoryPersonRepository {
    fn persist(&self, person: Person) -> Result<Person, PersistenceError> {
        let mut inner = self.inner.write();
        let id = inner
            .last_id
            .checked_add(1)
            .ok_or(PersistenceError::IdSpaceExhausted)?;
        let saved = person.with_id(id);
        inner.people.insert(id, saved.clone());
        inner.last_id = id;
        Ok(saved)
    }

    fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, PersistenceError> {
        Ok(self.inner.read().people.get(&id).cloned())
    }

    fn list_all(&self) -> Result<Vec<Person>, PersistenceError> {
        Ok(self.inner.read().people.values().cloned().collect())
    }
}
