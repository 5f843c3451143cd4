//! `/api/people` handlers.
//!
//! The handlers hold no business logic: each builds a request envelope,
//! stamps it with a fresh correlation id, sends it over the bus and hands
//! the outcome to the translator.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use peoplebus_core::{encode_request, new_correlation_id, stamp, OperationKind};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::AppState;
use crate::bus::DispatchError;
use crate::network::translate::{translate_failure, translate_reply, unavailable};

/// `GET /api/people`
pub async fn list_people(State(state): State<AppState>) -> Response {
    dispatch(&state, OperationKind::List, None, None).await
}

/// `GET /api/people/{id}`
pub async fn get_person(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    dispatch(&state, OperationKind::FindById, Some(&id), None).await
}

/// `POST /api/people`
///
/// The body must be declared and parse as JSON; otherwise 400 and the bus
/// is never involved.
pub async fn create_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return (
            StatusCode::BAD_REQUEST,
            "Content-Type must be application/json",
        )
            .into_response();
    }
    let payload: JsonValue = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "rejecting unparseable create body");
            return (StatusCode::BAD_REQUEST, "Request body is not valid JSON").into_response();
        }
    };
    dispatch(&state, OperationKind::Create, None, Some(payload)).await
}

/// Media type essence check: `application/json`, any case, parameters ignored.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

async fn dispatch(
    state: &AppState,
    kind: OperationKind,
    entity_id: Option<&str>,
    payload: Option<JsonValue>,
) -> Response {
    let request_id = new_correlation_id();
    let Some(_in_flight) = state.shutdown.begin_request() else {
        debug!(%request_id, "refusing request while draining");
        return unavailable(&request_id);
    };

    let request = match encode_request(kind, entity_id, payload) {
        Ok(request) => request,
        Err(err) => return translate_failure(&request_id, &DispatchError::from(err)),
    };

    match state
        .dispatcher
        .send(stamp(request, request_id.clone()), state.bus.dispatch_timeout)
        .await
    {
        Ok(reply) => translate_reply(kind, &reply),
        Err(err) => translate_failure(&request_id, &err),
    }
}
