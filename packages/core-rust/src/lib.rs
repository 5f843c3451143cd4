//! `PeopleBus` core: envelopes, correlation ids, and the `Person` record.

pub mod correlation;
pub mod envelope;
pub mod person;

pub use correlation::{new_correlation_id, stamp, RequestId};
pub use envelope::{
    decode_reply, decode_request, encode_request, EnvelopeError, Operation, OperationKind,
    ReplyEnvelope, ReplyOutcome, ReplyStatus, Request, RequestEnvelope, EMPTY_ARRAY, EMPTY_OBJECT,
};
pub use person::{parse_person_id, Person, PersonId, ValidationError};
