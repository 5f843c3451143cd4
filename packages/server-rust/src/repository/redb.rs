//! [`PersonRepository`] on an embedded `redb` database file.
//!
//! One table, `people`, maps the numeric id to the person's JSON text. New
//! ids are the current last key plus one, computed inside the write
//! transaction so concurrent workers never hand out the same id.

use std::path::Path;

use peoplebus_core::{Person, PersonId};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::info;

use super::{PersistenceError, PersonRepository};

const PEOPLE: TableDefinition<u64, &str> = TableDefinition::new("people");

fn backend(err: impl Into<redb::Error>) -> PersistenceError {
    PersistenceError::Backend(Box::new(err.into()))
}

fn decode(id: PersonId, json: &str) -> Result<Person, PersistenceError> {
    serde_json::from_str(json).map_err(|source| PersistenceError::Corrupt { id, source })
}

/// Person storage in a single `redb` file.
pub struct RedbPersonRepository {
    db: Database,
}

impl RedbPersonRepository {
    /// Opens (or creates) the database at `path` and ensures the `people`
    /// table exists.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Backend`] if the file cannot be opened or
    /// initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(backend)?;

        let txn = db.begin_write().map_err(backend)?;
        txn.open_table(PEOPLE).map_err(backend)?;
        txn.commit().map_err(backend)?;

        info!(path = %path.display(), "person database opened");
        Ok(Self { db })
    }
}

impl PersonRepository for RedbPersonRepository {
    fn persist(&self, person: Person) -> Result<Person, PersistenceError> {
        let txn = self.db.begin_write().map_err(backend)?;
        let saved = {
            let mut table = txn.open_table(PEOPLE).map_err(backend)?;
            let id = match table.last().map_err(backend)? {
                Some((last, _)) => last
                    .value()
                    .checked_add(1)
                    .ok_or(PersistenceError::IdSpaceExhausted)?,
                None => 1,
            };
            let saved = person.with_id(id);
            let json = serde_json::to_string(&saved)?;
            table.insert(id, json.as_str()).map_err(backend)?;
            saved
        };
        txn.commit().map_err(backend)?;
        Ok(saved)
    }

    fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, PersistenceError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(PEOPLE).map_err(backend)?;
        let stored = table.get(id).map_err(backend)?;
        stored.map(|json| decode(id, json.value())).transpose()
    }

    fn list_all(&self) -> Result<Vec<Person>, PersistenceError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(PEOPLE).map_err(backend)?;

        let mut people = Vec::new();
        for entry in table.iter().map_err(backend)? {
            let (id, json) = entry.map_err(backend)?;
            people.push(decode(id.value(), json.value())?);
        }
        Ok(people)
    }
}
