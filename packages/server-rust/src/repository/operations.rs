//! The three repository operations, executed against a [`PersonRepository`].
//!
//! Every failure is caught here and reported as an [`OperationFailure`]; the
//! caller turns it into an `err` reply. Absence is not a failure: a missing
//! person is `{}` and an empty collection is `[]`.

use peoplebus_core::{
    parse_person_id, Operation, OperationKind, Person, ValidationError, EMPTY_ARRAY, EMPTY_OBJECT,
};
use serde_json::Value as JsonValue;

use super::{PersistenceError, PersonRepository};

/// Why an operation produced an error reply.
#[derive(Debug, thiserror::Error)]
pub enum OperationFailure {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("unable to serialize result: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("repository operation panicked")]
    Panicked,
}

impl OperationFailure {
    /// Message placed in the error reply and shown to HTTP callers.
    ///
    /// Validation problems are described; storage internals are not.
    #[must_use]
    pub fn reply_message(&self, kind: OperationKind) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Persistence(_) | Self::Panicked => match kind {
                OperationKind::Create => "Unable to save person to the database.".to_string(),
                OperationKind::FindById | OperationKind::List => {
                    "Unable to read people from the database.".to_string()
                }
            },
            Self::Serialization(_) => "Unable to convert repository result to JSON.".to_string(),
        }
    }
}

/// Runs `operation` and returns the JSON `result` text for an `ok` reply.
///
/// # Errors
///
/// Returns [`OperationFailure`] for invalid input or storage faults.
pub fn execute<R>(repository: &R, operation: &Operation) -> Result<String, OperationFailure>
where
    R: PersonRepository + ?Sized,
{
    match operation {
        Operation::Create { payload } => create(repository, payload.clone()),
        Operation::FindById { entity_id } => find_by_id(repository, entity_id),
        Operation::List => list(repository),
    }
}

fn create<R>(repository: &R, payload: JsonValue) -> Result<String, OperationFailure>
where
    R: PersonRepository + ?Sized,
{
    let person = Person::from_payload(payload)?;
    let saved = repository.persist(person)?;
    Ok(serde_json::to_string(&saved)?)
}

fn find_by_id<R>(repository: &R, entity_id: &str) -> Result<String, OperationFailure>
where
    R: PersonRepository + ?Sized,
{
    let id = parse_person_id(entity_id)?;
    match repository.find_by_id(id)? {
        Some(person) => Ok(serde_json::to_string(&person)?),
        None => Ok(EMPTY_OBJECT.to_string()),
    }
}

fn list<R>(repository: &R) -> Result<String, OperationFailure>
where
    R: PersonRepository + ?Sized,
{
    let people = repository.list_all()?;
    if people.is_empty() {
        return Ok(EMPTY_ARRAY.to_string());
    }
    Ok(serde_json::to_string(&people)?)
}
