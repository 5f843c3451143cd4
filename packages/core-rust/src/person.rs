//! The `Person` record managed by the repository.
//!
//! The bus treats people as opaque JSON. Only the repository workers convert
//! payloads into [`Person`], and only `name` is required.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Identifier assigned by the repository on create.
pub type PersonId = u64;

/// A person as stored by the repository.
///
/// Fields other than `id` and `name` are kept verbatim in `attributes` and
/// written back alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PersonId>,
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, JsonValue>,
}

/// A payload that cannot become a [`Person`].
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("person payload must be a JSON object")]
    NotAnObject,
    #[error("person id is assigned by the repository and must not be supplied")]
    IdSupplied,
    #[error("person name must not be blank")]
    BlankName,
    #[error("person payload is invalid: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("'{0}' is not a valid person id")]
    InvalidId(String),
}

impl Person {
    /// Creates an unsaved person with no extra attributes.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            attributes: Map::new(),
        }
    }

    /// Converts a create payload into an unsaved person.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the payload is not an object,
    /// carries a non-null `id`, lacks a string `name`, or the name is blank.
    pub fn from_payload(payload: JsonValue) -> Result<Self, ValidationError> {
        let JsonValue::Object(mut fields) = payload else {
            return Err(ValidationError::NotAnObject);
        };
        match fields.remove("id") {
            None | Some(JsonValue::Null) => {}
            Some(_) => return Err(ValidationError::IdSupplied),
        }
        let person: Person = serde_json::from_value(JsonValue::Object(fields))?;
        if person.name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }
        Ok(person)
    }

    /// Returns a copy carrying the given repository id.
    #[must_use]
    pub fn with_id(mut self, id: PersonId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Parses the textual entity id of a find request.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidId`] for anything but a base-10 `u64`.
pub fn parse_person_id(raw: &str) -> Result<PersonId, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidId(raw.to_string()))
}
