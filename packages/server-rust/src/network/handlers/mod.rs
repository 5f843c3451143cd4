//! HTTP handlers and the state they share.

pub mod health;
pub mod people;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use people::{create_person, get_person, list_people};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::bus::{BusConfig, Dispatcher};

/// State handed to every handler through `State` extraction.
///
/// All fields are shared handles, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Entry point to the request/reply bus.
    pub dispatcher: Arc<Dispatcher>,
    /// Dispatch timeout and pool sizing.
    pub bus: Arc<BusConfig>,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Process start, for uptime.
    pub start_time: Instant,
}
