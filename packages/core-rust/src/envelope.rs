//! Request and reply envelopes exchanged over the repository bus.
//!
//! Envelopes cross the bus as named `MsgPack` maps
//! (`rmp_serde::to_vec_named()`) with kebab-case keys (`request-id`,
//! `entity-id`). The `result` of a successful reply is JSON text, the same
//! text the HTTP tier returns to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::correlation::RequestId;

/// Result marker meaning "no entity with that id".
pub const EMPTY_OBJECT: &str = "{}";

/// Result marker meaning "the collection is empty".
pub const EMPTY_ARRAY: &str = "[]";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Codec-level failures. These indicate a programming or client error,
/// never a storage fault.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String },
    /// The request id was readable but the rest of the request was not.
    #[error("invalid request {request_id}: {reason}")]
    InvalidRequest {
        request_id: RequestId,
        reason: String,
    },
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl EnvelopeError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// The id of a request that was rejected after its id was read, so the
    /// sender can still be answered.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::InvalidRequest { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The three repository operations. Each kind is also a bus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    FindById,
    List,
}

impl OperationKind {
    /// Every address a repository worker binds to.
    pub const ALL: [OperationKind; 3] = [Self::Create, Self::FindById, Self::List];

    /// Stable address name, used in logs and metric labels.
    #[must_use]
    pub fn address(self) -> &'static str {
        match self {
            Self::Create => "repo.person.create",
            Self::FindById => "repo.person.find",
            Self::List => "repo.person.list",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.address())
    }
}

/// A repository operation together with the arguments it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    Create {
        payload: JsonValue,
    },
    FindById {
        #[serde(rename = "entity-id")]
        entity_id: String,
    },
    List,
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::FindById { .. } => OperationKind::FindById,
            Self::List => OperationKind::List,
        }
    }

    fn check(&self) -> Result<(), &'static str> {
        match self {
            Self::Create { payload } if payload.is_null() => Err("create requires a payload"),
            Self::FindById { entity_id } if entity_id.trim().is_empty() => {
                Err("find-by-id requires an entity id")
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request envelopes
// ---------------------------------------------------------------------------

/// A validated request that has not been given a correlation id yet.
///
/// Only [`crate::correlation::stamp`] turns it into a [`RequestEnvelope`],
/// so an envelope without an id cannot reach the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    operation: Operation,
}

impl Request {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub(crate) fn into_operation(self) -> Operation {
        self.operation
    }
}

/// Builds a request for `kind`, rejecting missing arguments.
///
/// Arguments the operation does not use are ignored.
///
/// # Errors
///
/// Returns [`EnvelopeError::Malformed`] when `Create` has no payload or
/// `FindById` has no (or a blank) entity id.
pub fn encode_request(
    kind: OperationKind,
    entity_id: Option<&str>,
    payload: Option<JsonValue>,
) -> Result<Request, EnvelopeError> {
    let operation = match kind {
        OperationKind::Create => Operation::Create {
            payload: payload.ok_or_else(|| EnvelopeError::malformed("create requires a payload"))?,
        },
        OperationKind::FindById => Operation::FindById {
            entity_id: entity_id
                .map(str::trim)
                .ok_or_else(|| EnvelopeError::malformed("find-by-id requires an entity id"))?
                .to_string(),
        },
        OperationKind::List => Operation::List,
    };
    operation.check().map_err(EnvelopeError::malformed)?;
    Ok(Request { operation })
}

/// A stamped request, ready to be put on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequestEnvelope {
    request_id: RequestId,
    operation: Operation,
}

impl RequestEnvelope {
    pub(crate) fn new(request_id: RequestId, operation: Operation) -> Self {
        Self {
            request_id,
            operation,
        }
    }

    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// Encodes the envelope as a bus frame.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

/// Decodes a bus frame into a request envelope.
///
/// # Errors
///
/// Returns [`EnvelopeError::Decode`] for undecodable bytes and
/// [`EnvelopeError::Malformed`] for an empty request id. A frame whose id
/// is readable but whose operation is unknown, incomplete or blank yields
/// [`EnvelopeError::InvalidRequest`] carrying that id.
pub fn decode_request(bytes: &[u8]) -> Result<RequestEnvelope, EnvelopeError> {
    let envelope: RequestEnvelope = match rmp_serde::from_slice(bytes) {
        Ok(envelope) => envelope,
        Err(err) => {
            return Err(match rmp_serde::from_slice::<RequestIdOnly>(bytes) {
                Ok(RequestIdOnly { request_id }) if !request_id.as_str().is_empty() => {
                    EnvelopeError::InvalidRequest {
                        request_id,
                        reason: err.to_string(),
                    }
                }
                _ => EnvelopeError::Decode(err),
            });
        }
    };
    if envelope.request_id.as_str().is_empty() {
        return Err(EnvelopeError::malformed("request id is empty"));
    }
    if let Err(reason) = envelope.operation.check() {
        return Err(EnvelopeError::InvalidRequest {
            request_id: envelope.request_id,
            reason: reason.to_string(),
        });
    }
    Ok(envelope)
}

/// Just enough of a request frame to answer it.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RequestIdOnly {
    request_id: RequestId,
}

// ---------------------------------------------------------------------------
// Reply envelopes
// ---------------------------------------------------------------------------

/// Wire-level reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Err,
}

/// Outcome carried by a reply. `Ok` holds JSON text, `Err` a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Ok(String),
    Err(String),
}

/// A worker's answer to exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEnvelope {
    request_id: RequestId,
    outcome: ReplyOutcome,
}

/// Flat wire shape. `message` also accepts the legacy `error` key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReplyWire {
    request_id: RequestId,
    status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(default, alias = "error", skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ReplyEnvelope {
    /// Successful reply carrying serialized JSON `result`.
    #[must_use]
    pub fn ok(request_id: RequestId, result: impl Into<String>) -> Self {
        Self {
            request_id,
            outcome: ReplyOutcome::Ok(result.into()),
        }
    }

    /// Failed reply carrying a human-readable `message`.
    #[must_use]
    pub fn err(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            outcome: ReplyOutcome::Err(message.into()),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    #[must_use]
    pub fn outcome(&self) -> &ReplyOutcome {
        &self.outcome
    }

    #[must_use]
    pub fn status(&self) -> ReplyStatus {
        match self.outcome {
            ReplyOutcome::Ok(_) => ReplyStatus::Ok,
            ReplyOutcome::Err(_) => ReplyStatus::Err,
        }
    }

    /// The JSON result, present only when the status is `Ok`.
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        match &self.outcome {
            ReplyOutcome::Ok(result) => Some(result),
            ReplyOutcome::Err(_) => None,
        }
    }

    /// The failure message, present only when the status is `Err`.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            ReplyOutcome::Ok(_) => None,
            ReplyOutcome::Err(message) => Some(message),
        }
    }

    /// True when the reply is `Ok` and its result is `{}` or `[]`.
    #[must_use]
    pub fn is_empty_result(&self) -> bool {
        matches!(self.result().map(str::trim), Some(EMPTY_OBJECT | EMPTY_ARRAY))
    }

    /// Encodes the reply as a bus frame.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let (status, result, message) = match &self.outcome {
            ReplyOutcome::Ok(result) => (ReplyStatus::Ok, Some(result.clone()), None),
            ReplyOutcome::Err(message) => (ReplyStatus::Err, None, Some(message.clone())),
        };
        let wire = ReplyWire {
            request_id: self.request_id.clone(),
            status,
            result,
            message,
        };
        Ok(rmp_serde::to_vec_named(&wire)?)
    }
}

impl ReplyEnvelope {
    fn from_wire(wire: ReplyWire) -> Result<Self, EnvelopeError> {
        if wire.request_id.as_str().is_empty() {
            return Err(EnvelopeError::malformed("reply has an empty request id"));
        }
        let outcome = match (wire.status, wire.result) {
            (ReplyStatus::Ok, Some(result)) => ReplyOutcome::Ok(result),
            (ReplyStatus::Ok, None) => {
                return Err(EnvelopeError::malformed("ok reply without a result"));
            }
            (ReplyStatus::Err, Some(_)) => {
                return Err(EnvelopeError::malformed("error reply carrying a result"));
            }
            (ReplyStatus::Err, None) => ReplyOutcome::Err(
                wire.message
                    .unwrap_or_else(|| "unspecified repository failure".to_string()),
            ),
        };
        Ok(Self {
            request_id: wire.request_id,
            outcome,
        })
    }
}

/// Decodes a bus frame into a reply envelope.
///
/// # Errors
///
/// Returns [`EnvelopeError::Decode`] for undecodable bytes and
/// [`EnvelopeError::Malformed`] when `result` is present without `status = ok`
/// or missing with it.
pub fn decode_reply(bytes: &[u8]) -> Result<ReplyEnvelope, EnvelopeError> {
    let wire: ReplyWire = rmp_serde::from_slice(bytes)?;
    ReplyEnvelope::from_wire(wire)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::correlation::{new_correlation_id, stamp};

    #[test]
    fn create_without_payload_is_malformed() {
        let err = encode_request(OperationKind::Create, None, None).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed { .. }));

        let err = encode_request(OperationKind::Create, None, Some(JsonValue::Null)).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed { .. }));
    }

    #[test]
    fn find_without_entity_id_is_malformed() {
        assert!(encode_request(OperationKind::FindById, None, None).is_err());
        assert!(encode_request(OperationKind::FindById, Some("   "), None).is_err());
    }

    #[test]
    fn list_ignores_unused_arguments() {
        let request =
            encode_request(OperationKind::List, Some("7"), Some(json!({"name": "x"}))).unwrap();
        assert_eq!(request.operation(), &Operation::List);
    }

    #[test]
    fn find_trims_entity_id() {
        let request = encode_request(OperationKind::FindById, Some(" 7 "), None).unwrap();
        assert_eq!(
            request.operation(),
            &Operation::FindById {
                entity_id: "7".to_string()
            }
        );
    }

    #[test]
    fn addresses_are_distinct() {
        let addresses: std::collections::HashSet<_> =
            OperationKind::ALL.iter().map(|k| k.address()).collect();
        assert_eq!(addresses.len(), 3);
        assert_eq!(OperationKind::List.to_string(), "repo.person.list");
    }

    #[test]
    fn create_request_survives_the_wire() {
        let request =
            encode_request(OperationKind::Create, None, Some(json!({"name": "Ada"}))).unwrap();
        let envelope = stamp(request, new_correlation_id());

        let bytes = envelope.to_bytes().unwrap();
        let decoded = decode_request(&bytes).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.kind(), OperationKind::Create);
    }

    #[test]
    fn request_wire_uses_kebab_case_keys() {
        let request = encode_request(OperationKind::FindById, Some("3"), None).unwrap();
        let envelope = stamp(request, RequestId::from_wire("r-1"));
        let bytes = envelope.to_bytes().unwrap();

        let generic: JsonValue = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(generic["request-id"], "r-1");
        assert_eq!(generic["operation"]["type"], "find-by-id");
        assert_eq!(generic["operation"]["entity-id"], "3");
    }

    #[test]
    fn decode_request_rejects_garbage() {
        let err = decode_request(&[0xc1, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, EnvelopeError::Decode(_)));
    }

    #[test]
    fn decode_request_rejects_blank_entity_id() {
        let frame = rmp_serde::to_vec_named(&json!({
            "request-id": "r-2",
            "operation": { "type": "find-by-id", "entity-id": "" }
        }))
        .unwrap();
        let err = decode_request(&frame).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidRequest { .. }));
        assert_eq!(err.request_id().map(RequestId::as_str), Some("r-2"));
    }

    #[test]
    fn decode_request_keeps_id_of_unknown_operation() {
        let frame = rmp_serde::to_vec_named(&json!({
            "request-id": "r-3",
            "operation": { "type": "delete", "entity-id": "1" }
        }))
        .unwrap();
        let err = decode_request(&frame).unwrap_err();
        assert_eq!(err.request_id().map(RequestId::as_str), Some("r-3"));
    }

    #[test]
    fn decode_request_without_id_has_nobody_to_answer() {
        let frame = rmp_serde::to_vec_named(&json!({
            "operation": { "type": "list" }
        }))
        .unwrap();
        let err = decode_request(&frame).unwrap_err();
        assert!(matches!(err, EnvelopeError::Decode(_)));
        assert!(err.request_id().is_none());
    }

    #[test]
    fn ok_reply_exposes_result_only() {
        let reply = ReplyEnvelope::ok(RequestId::from_wire("a"), r#"{"id":1}"#);
        assert_eq!(reply.status(), ReplyStatus::Ok);
        assert_eq!(reply.result(), Some(r#"{"id":1}"#));
        assert!(reply.message().is_none());
        assert!(!reply.is_empty_result());
    }

    #[test]
    fn err_reply_exposes_message_only() {
        let reply = ReplyEnvelope::err(RequestId::from_wire("a"), "boom");
        assert_eq!(reply.status(), ReplyStatus::Err);
        assert!(reply.result().is_none());
        assert_eq!(reply.message(), Some("boom"));
        assert!(!reply.is_empty_result());
    }

    #[test]
    fn empty_markers_are_recognised() {
        let id = RequestId::from_wire("a");
        assert!(ReplyEnvelope::ok(id.clone(), EMPTY_OBJECT).is_empty_result());
        assert!(ReplyEnvelope::ok(id.clone(), EMPTY_ARRAY).is_empty_result());
        assert!(!ReplyEnvelope::ok(id, "[{\"id\":1}]").is_empty_result());
    }

    #[test]
    fn replies_survive_the_wire() {
        for reply in [
            ReplyEnvelope::ok(new_correlation_id(), "[]"),
            ReplyEnvelope::err(new_correlation_id(), "database unavailable"),
        ] {
            let decoded = decode_reply(&reply.to_bytes().unwrap()).unwrap();
            assert_eq!(decoded, reply);
        }
    }

    #[test]
    fn ok_reply_without_result_is_malformed() {
        let frame = rmp_serde::to_vec_named(&json!({"request-id": "x", "status": "ok"})).unwrap();
        let err = decode_reply(&frame).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed { .. }));
    }

    #[test]
    fn err_reply_with_result_is_malformed() {
        let frame = rmp_serde::to_vec_named(
            &json!({"request-id": "x", "status": "err", "result": "{}"}),
        )
        .unwrap();
        assert!(decode_reply(&frame).is_err());
    }

    #[test]
    fn legacy_error_key_is_read_as_message() {
        let frame = rmp_serde::to_vec_named(
            &json!({"request-id": "x", "status": "err", "error": "constraint violated"}),
        )
        .unwrap();
        let reply = decode_reply(&frame).unwrap();
        assert_eq!(reply.message(), Some("constraint violated"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let frame =
            rmp_serde::to_vec_named(&json!({"request-id": "x", "status": "maybe"})).unwrap();
        assert!(matches!(decode_reply(&frame), Err(EnvelopeError::Decode(_))));
    }
}
