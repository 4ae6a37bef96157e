//! Ingestion server module
//!
//! Exposes the two submission paths sharing one task queue:
//! - `POST /tasks` - one-shot submission of a complete task description
//! - `GET /stream` - WebSocket upgrade for stream tasks (see [`connection`])
//!
//! plus `GET /health` and `GET /openapi.json`.

use crate::{Config, Daemon, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod connection;
pub mod openapi;
pub mod routes;
pub mod state;

pub use connection::{Connection, ConnectionState};
pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the ingestion router with all route definitions
pub fn create_router(daemon: Arc<Daemon>, config: Arc<Config>) -> Router {
    let state = AppState::new(daemon, config.clone());

    let router = Router::new()
        .route("/tasks", post(routes::submit_task))
        .route("/stream", get(routes::stream))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // CORS is config-gated; the interactive/daemon clients are same-origin
    // userscripts by default
    if config.server.cors_enabled {
        router.layer(build_cors_layer(&config.server.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// "*" or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the ingestion server on the configured bind address.
///
/// Binds a TCP listener and serves the router until the process or the
/// listener is torn down. Single-submission handlers and per-connection
/// WebSocket tasks run fully in parallel; they only meet at the task queue.
pub async fn start_api_server(daemon: Arc<Daemon>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.bind_address;

    tracing::info!(address = %bind_address, "Starting ingestion server");

    let app = create_router(daemon, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "Listening for clients");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServer(e.to_string()))?;

    tracing::info!("Ingestion server stopped");
    Ok(())
}
