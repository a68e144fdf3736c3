use super::*;
use crate::snapshotter::test_helpers::{TestHarness, create_test_snapshotter};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

mod tasks;

/// Harness plus a router over its snapshotter
async fn create_test_app() -> (Router, TestHarness) {
    let harness = create_test_snapshotter().await;
    let snapshotter = Arc::new(harness.snapshotter.clone());
    let config = snapshotter.get_config();
    (create_router(snapshotter, config), harness)
}

/// POST `body` as JSON to /tasks
async fn post_task(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tasks")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn task_body(action: &str, task_id: &str) -> Value {
    json!({"action": action, "task_id": task_id, "release_id": "RE_1"})
}

#[tokio::test]
async fn test_api_server_spawns() {
    let harness = create_test_snapshotter().await;
    let snapshotter = Arc::new(harness.snapshotter.clone());

    // Port 0 = OS assigns a free port
    let mut config = (*snapshotter.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let api_handle = tokio::spawn(start_api_server(snapshotter, Arc::new(config)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _harness) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status")
                .header("Origin", "http://localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let harness = create_test_snapshotter().await;
    let snapshotter = Arc::new(harness.snapshotter.clone());
    let mut config = (*snapshotter.get_config()).clone();
    config.api.cors_enabled = false;
    let app = create_router(snapshotter, Arc::new(config));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status")
                .header("Origin", "http://localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[test]
fn test_cors_specific_origins() {
    // Unparsable origins are skipped rather than rejected
    let _layer = build_cors_layer(&["http://a.example".to_string(), "\n".to_string()]);
}
