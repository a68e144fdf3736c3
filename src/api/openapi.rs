//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time by utoipa and served at
//! `/openapi.json` (and through `/swagger-ui` when enabled).

use utoipa::OpenApi;

/// OpenAPI documentation for the snapshot-task REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "snapshot-task REST API",
        version = "0.1.0",
        description = "Task endpoint for release snapshot export: initialize, start, publish, get_status and cancel",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::submit_task,

        // Downloads
        crate::api::routes::download_release,
        crate::api::routes::download_study,

        // System
        crate::api::routes::service_status,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::Task,
        crate::types::TaskId,
        crate::types::TaskState,
        crate::types::TaskRequest,
        crate::types::Action,
        crate::types::Event,

        // API request/response types from routes
        crate::api::routes::TaskSubmission,
        crate::api::routes::TaskResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Task actions driven by the release coordinator"),
        (name = "downloads", description = "Published snapshots, packed as ZIP attachments"),
        (name = "system", description = "Status, OpenAPI spec and event stream"),
    )
)]
pub struct ApiDoc;
