//! REST API server module
//!
//! Exposes the task endpoint the release coordinator drives, a status endpoint,
//! snapshot downloads and a server-sent event stream.

use crate::{Config, Result, Snapshotter};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `POST /tasks` - Submit an action (`initialize`, `start`, `publish`, `get_status`, `cancel`)
///
/// ## Downloads
/// - `GET /download/:release_id` - Published snapshot of a release (ZIP)
/// - `GET /download/:release_id/:study_id` - Published snapshot of one study (ZIP)
///
/// ## System
/// - `GET /status` - Service name and version
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(snapshotter: Arc<Snapshotter>, config: Arc<Config>) -> Router {
    let state = AppState::new(snapshotter, config.clone());

    let router = Router::new()
        // Tasks
        .route("/tasks", post(routes::submit_task))
        // Downloads
        .route("/download/:release_id", get(routes::download_release))
        .route(
            "/download/:release_id/:study_id",
            get(routes::download_study),
        )
        // System
        .route("/status", get(routes::service_status))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // SwaggerUi serves its own copy of the spec
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins that parse as header values are allowed.
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

/// Start the API server on the configured bind address.
///
/// Runs until the listener fails.
///
/// # Example
///
/// ```no_run
/// use snapshot_task::{Snapshotter, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let snapshotter = Arc::new(Snapshotter::new((*config).clone()).await?);
///
/// snapshot_task::api::start_api_server(snapshotter, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(snapshotter: Arc<Snapshotter>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(snapshotter, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
