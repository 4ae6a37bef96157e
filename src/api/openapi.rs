//! OpenAPI documentation for the ingestion server

use utoipa::OpenApi;

/// OpenAPI document covering the HTTP surface.
///
/// The WebSocket endpoint (`GET /stream`) is not representable in OpenAPI
/// and is documented on [`super::connection`] instead.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "dl-daemon API",
        description = "Task ingestion for media download jobs",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(super::routes::submit_task, super::routes::health_check),
    components(schemas(
        crate::types::TaskSpec,
        crate::config::Config,
        crate::config::ServerConfig,
        crate::config::ChunkBufferConfig,
    )),
    tags(
        (name = "tasks", description = "Task submission"),
        (name = "system", description = "Health and metadata")
    )
)]
pub struct ApiDoc;
