//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use peoplebus_core::OperationKind;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Detailed health as JSON. Always 200; `state` tells the real story.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let workers: serde_json::Map<String, serde_json::Value> = OperationKind::ALL
        .into_iter()
        .map(|kind| {
            (
                kind.address().to_string(),
                json!(state.dispatcher.worker_count(kind)),
            )
        })
        .collect();

    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "pending_replies": state.dispatcher.pending_count(),
        "workers": workers,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: the process answers, nothing more.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only while `Ready` and at least one worker serves
/// every address.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    let serving = OperationKind::ALL
        .into_iter()
        .all(|kind| state.dispatcher.worker_count(kind) > 0);
    if state.shutdown.health_state() == HealthState::Ready && serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
