//! System handlers: status, OpenAPI, events.

use crate::api::AppState;
use crate::types::{Event, TASK_NAME};
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// GET /status - Service name and version
#[utoipa::path(
    get,
    path = "/status",
    tag = "system",
    responses(
        (status = 200, description = "Service is up")
    )
)]
pub async fn service_status() -> impl IntoResponse {
    Json(json!({
        "message": {
            "name": TASK_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// SSE event name for an [`Event`]
fn event_name(event: &Event) -> &'static str {
    match event {
        Event::TaskInitialized { .. } => "task_initialized",
        Event::StateChanged { .. } => "state_changed",
        Event::CrawlComplete { .. } => "crawl_complete",
        Event::PartitionComplete { .. } => "partition_complete",
        Event::ScrapeComplete { .. } => "scrape_complete",
        Event::ArtifactUploaded { .. } => "artifact_uploaded",
        Event::Published { .. } => "published",
        Event::Failed { .. } => "failed",
        Event::Cancelled { .. } => "cancelled",
        Event::Shutdown => "shutdown",
    }
}

/// GET /events - Server-sent events stream
#[utoipa::path(
    get,
    path = "/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.snapshotter.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json_data) => Some(Ok(SseEvent::default()
                .event(event_name(&event))
                .data(json_data))),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize event to JSON");
                None
            }
        },
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged");
            Some(Ok(SseEvent::default().event("error").data(format!(
                r#"{{"error":"lagged","skipped":{}}}"#,
                skipped
            ))))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
