//! Turns bus replies and dispatch failures into HTTP responses.
//!
//! | Outcome                              | Status | Body                  |
//! |--------------------------------------|--------|-----------------------|
//! | `ok` with `{}` or `[]`               | 404    | empty                 |
//! | `ok`, read                           | 200    | result JSON           |
//! | `ok`, create                         | 201    | result JSON, location |
//! | `err`                                | 500    | reply message         |
//! | timeout, delivery or codec failure   | 500    | generic message       |
//! | refused while draining               | 503    | shutdown message      |
//!
//! Every response carries the request's correlation id in `x-request-id`.

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use peoplebus_core::{OperationKind, ReplyEnvelope, ReplyOutcome, RequestId};
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use crate::bus::DispatchError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of every 500 that is not a worker's own error reply.
pub const GENERIC_FAILURE: &str = "An unknown error occurred.";

/// Body of the 503 sent while the server drains.
pub const SHUTTING_DOWN: &str = "Server is shutting down";

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Base path of the people resource; created entities live below it.
pub const PEOPLE_PATH: &str = "/api/people";

/// Maps a reply for a `kind` request to its HTTP response.
#[must_use]
pub fn translate_reply(kind: OperationKind, reply: &ReplyEnvelope) -> Response {
    let request_id = reply.request_id();
    match reply.outcome() {
        ReplyOutcome::Ok(_) if reply.is_empty_result() => {
            respond(StatusCode::NOT_FOUND, request_id, None, Body::empty())
        }
        ReplyOutcome::Ok(result) if kind == OperationKind::Create => created(request_id, result),
        ReplyOutcome::Ok(result) => {
            respond(StatusCode::OK, request_id, Some(JSON), Body::from(result.clone()))
        }
        ReplyOutcome::Err(message) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            request_id,
            Some(TEXT),
            Body::from(message.clone()),
        ),
    }
}

/// Maps a request that produced no usable reply to its HTTP response.
#[must_use]
pub fn translate_failure(request_id: &RequestId, err: &DispatchError) -> Response {
    error!(%request_id, error = %err, "request failed before a reply was received");
    generic_failure(request_id)
}

/// Response for a request refused because the server is draining.
#[must_use]
pub fn unavailable(request_id: &RequestId) -> Response {
    respond(
        StatusCode::SERVICE_UNAVAILABLE,
        request_id,
        Some(TEXT),
        Body::from(SHUTTING_DOWN),
    )
}

fn created(request_id: &RequestId, result: &str) -> Response {
    let id = serde_json::from_str::<JsonValue>(result)
        .ok()
        .and_then(|entity| entity.get("id").and_then(JsonValue::as_u64));
    let Some(id) = id else {
        warn!(%request_id, "create reply carries no numeric id");
        return generic_failure(request_id);
    };

    let mut response = respond(
        StatusCode::CREATED,
        request_id,
        Some(JSON),
        Body::from(result.to_owned()),
    );
    if let Ok(location) = HeaderValue::from_str(&format!("{PEOPLE_PATH}/{id}")) {
        response.headers_mut().insert(LOCATION, location);
    }
    response
}

fn generic_failure(request_id: &RequestId) -> Response {
    respond(
        StatusCode::INTERNAL_SERVER_ERROR,
        request_id,
        Some(TEXT),
        Body::from(GENERIC_FAILURE),
    )
}

fn respond(
    status: StatusCode,
    request_id: &RequestId,
    content_type: Option<&'static str>,
    body: Body,
) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn id() -> RequestId {
        RequestId::from_wire("8d3c1f0e-5b7a-4c2e-9f1d-0a6b2c4e8f10")
    }

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn empty_markers_are_not_found() {
        for marker in ["{}", "[]", " [] "] {
            let reply = ReplyEnvelope::ok(id(), marker);
            let response = translate_reply(OperationKind::List, &reply);

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(header(&response, REQUEST_ID_HEADER), Some(id().as_str()));
            assert!(body_text(response).await.is_empty());
        }
    }

    #[tokio::test]
    async fn read_result_is_ok_json() {
        let reply = ReplyEnvelope::ok(id(), r#"{"id":3,"name":"Ada"}"#);
        let response = translate_reply(OperationKind::FindById, &reply);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-type"), Some(JSON));
        assert_eq!(header(&response, REQUEST_ID_HEADER), Some(id().as_str()));
        assert_eq!(body_text(response).await, r#"{"id":3,"name":"Ada"}"#);
    }

    #[tokio::test]
    async fn create_result_is_created_with_location() {
        let reply = ReplyEnvelope::ok(id(), r#"{"id":7,"name":"Ada"}"#);
        let response = translate_reply(OperationKind::Create, &reply);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(header(&response, "location"), Some("/api/people/7"));
        assert_eq!(header(&response, REQUEST_ID_HEADER), Some(id().as_str()));
    }

    #[tokio::test]
    async fn create_result_without_numeric_id_is_generic_failure() {
        for result in [r#"{"name":"Ada"}"#, r#"{"id":"7","name":"Ada"}"#, "not json"] {
            let reply = ReplyEnvelope::ok(id(), result);
            let response = translate_reply(OperationKind::Create, &reply);

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body_text(response).await, GENERIC_FAILURE);
        }
    }

    #[tokio::test]
    async fn error_reply_exposes_its_message() {
        let reply = ReplyEnvelope::err(id(), "Unable to save person to the database.");
        let response = translate_reply(OperationKind::Create, &reply);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(header(&response, REQUEST_ID_HEADER), Some(id().as_str()));
        assert_eq!(
            body_text(response).await,
            "Unable to save person to the database."
        );
    }

    #[tokio::test]
    async fn dispatch_failures_hide_details() {
        let failures = [
            DispatchError::Timeout {
                request_id: id(),
                timeout_ms: 50,
            },
            DispatchError::DeliveryFailure {
                address: "repo.person.list",
                reason: "no worker registered",
            },
        ];
        for failure in &failures {
            let response = translate_failure(&id(), failure);

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(header(&response, REQUEST_ID_HEADER), Some(id().as_str()));
            assert_eq!(body_text(response).await, GENERIC_FAILURE);
        }
    }

    #[tokio::test]
    async fn unavailable_carries_request_id() {
        let response = unavailable(&id());

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(header(&response, REQUEST_ID_HEADER), Some(id().as_str()));
        assert_eq!(body_text(response).await, SHUTTING_DOWN);
    }
}
