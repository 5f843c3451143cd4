//! HTTP server lifecycle with deferred startup.
//!
//! `new()` wires shared state, `start()` binds the listener, and `serve()`
//! accepts connections until the shutdown future resolves, then drains.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    create_person, get_person, health_handler, list_people, liveness_handler, readiness_handler,
    AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use super::translate::PEOPLE_PATH;
use crate::bus::{BusConfig, Dispatcher};

/// Owns the listener and the state shared by every handler.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, bus: BusConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState {
            dispatcher,
            bus: Arc::new(bus),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };
        Self {
            config,
            listener: None,
            state,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Routes:
    /// - `GET /api/people`, `POST /api/people`, `GET /api/people/{id}`
    /// - `GET /health`, `GET /health/live`, `GET /health/ready`
    pub fn build_router(&self) -> Router {
        Router::new()
            .route(PEOPLE_PATH, get(list_people).post(create_person))
            .route(&format!("{PEOPLE_PATH}/{{id}}"), get(get_person))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(self.state.clone())
    }

    /// Binds the listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "HTTP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then waits for in-flight requests.
    ///
    /// Once `shutdown` fires the state becomes `Draining`, readiness fails,
    /// and requests still arriving on open connections get 503.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server fails.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let controller = self.shutdown_controller();
        controller.set_ready();

        let signal_controller = Arc::clone(&controller);
        let signal = async move {
            shutdown.await;
            info!("shutdown requested; draining");
            signal_controller.trigger_shutdown();
        };

        info!("serving HTTP");
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        controller.trigger_shutdown();
        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired"
            );
        }
        Ok(())
    }
}
