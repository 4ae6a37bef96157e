//! Route handlers for the ingestion server.

use axum::{
    Json,
    body::Bytes,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::connection::{self, REPLY_FAILED, REPLY_SUCCESS};
use crate::api::AppState;
use crate::error::Result;
use crate::types::{Task, TaskSpec};

/// POST /tasks - one-shot task submission
///
/// The body is a serialized task mapping. The reply body is the literal
/// string `success` or `failed`; per protocol there is no other status
/// signaling, so both come back as HTTP 200. A failed request enqueues
/// nothing.
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body(content = TaskSpec, description = "Task description", content_type = "application/json"),
    responses(
        (status = 200, description = "Literal `success` if the task was enqueued, `failed` otherwise", body = String)
    )
)]
pub async fn submit_task(State(state): State<AppState>, body: Bytes) -> &'static str {
    match decode_and_enqueue(&state, &body) {
        Ok(()) => REPLY_SUCCESS,
        Err(e) => {
            if e.is_client_fault() {
                tracing::debug!(error = %e, "Rejected one-shot submission");
            } else {
                tracing::warn!(error = %e, "Failed to enqueue one-shot submission");
            }
            REPLY_FAILED
        }
    }
}

fn decode_and_enqueue(state: &AppState, body: &[u8]) -> Result<()> {
    let spec: TaskSpec = serde_json::from_slice(body)?;
    if spec.is_stream() {
        // A stream task with no connection behind it has no chunk source;
        // reject at decode level instead of enqueueing a task that can
        // never complete.
        use serde::de::Error as _;
        return Err(serde_json::Error::custom(
            "stream tasks require a persistent connection",
        )
        .into());
    }
    tracing::info!(task = %spec.redacted_json(), "Received task");
    state.daemon.enqueue(Task::new(spec))
}

/// GET /stream - persistent-connection submission
///
/// Upgrades to a WebSocket and hands the socket to the connection state
/// machine for its lifetime.
pub async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let queue = state.daemon.task_sender();
    let chunk_buffer = state.config.chunk_buffer.clone();
    ws.on_upgrade(move |socket| connection::handle_socket(socket, queue, chunk_buffer))
}

/// GET /health - liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Server is alive")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /openapi.json - OpenAPI specification
pub async fn openapi_spec() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::api::ApiDoc::openapi())
}
