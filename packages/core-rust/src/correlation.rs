//! Correlation identifiers that tie a reply envelope to its request.
//!
//! Identifiers are random UUID v4 values rendered as text. They are never
//! derived from a counter, so they cannot be guessed or enumerated by a
//! client that has seen earlier ones.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::{Request, RequestEnvelope};

/// Opaque request identifier carried end-to-end through the bus.
///
/// The inner text is only ever compared for equality; nothing parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wraps an identifier received from the wire.
    #[must_use]
    pub fn from_wire(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates a fresh correlation id (128 random bits, hyphenated).
#[must_use]
pub fn new_correlation_id() -> RequestId {
    RequestId(Uuid::new_v4().hyphenated().to_string())
}

/// Attaches `id` to an unstamped request, producing a dispatchable envelope.
///
/// The request content is moved as-is; the id cannot be changed afterwards.
#[must_use]
pub fn stamp(request: Request, id: RequestId) -> RequestEnvelope {
    RequestEnvelope::new(id, request.into_operation())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::envelope::{encode_request, OperationKind};

    #[test]
    fn ids_are_uuid_v4_text() {
        let id = new_correlation_id();
        let parsed = Uuid::parse_str(id.as_str()).expect("valid uuid");
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn ten_thousand_ids_do_not_collide() {
        let ids: HashSet<RequestId> = (0..10_000).map(|_| new_correlation_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn consecutive_ids_are_not_sequential() {
        let a = Uuid::parse_str(new_correlation_id().as_str()).unwrap().as_u128();
        let b = Uuid::parse_str(new_correlation_id().as_str()).unwrap().as_u128();
        assert_ne!(a.wrapping_add(1), b);
    }

    #[test]
    fn stamp_attaches_id_and_keeps_operation() {
        let request = encode_request(OperationKind::FindById, Some("42"), None).unwrap();
        let id = new_correlation_id();
        let envelope = stamp(request, id.clone());

        assert_eq!(envelope.request_id(), &id);
        assert_eq!(envelope.kind(), OperationKind::FindById);
    }

    #[test]
    fn request_id_serializes_as_plain_string() {
        let id = RequestId::from_wire("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
    }

    proptest! {
        #[test]
        fn wire_ids_display_verbatim(raw in "[a-zA-Z0-9-]{1,64}") {
            let id = RequestId::from_wire(raw.clone());
            prop_assert_eq!(id.to_string(), raw);
        }
    }
}
