use super::*;
use crate::types::TaskState;

#[tokio::test]
async fn test_initialize_returns_wrapped_task() {
    let (app, _harness) = create_test_app().await;

    let (status, body) = post_task(&app, task_body("initialize", "TA_1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["task_id"], "TA_1");
    assert_eq!(body["body"]["release_id"], "RE_1");
    assert_eq!(body["body"]["name"], "Snapshot Task");
    assert_eq!(body["body"]["state"], "pending");
    assert!(body["body"]["progress"].is_null());
}

#[tokio::test]
async fn test_wrapped_request_is_accepted() {
    let (app, _harness) = create_test_app().await;

    let (status, body) = post_task(&app, json!({"body": task_body("initialize", "TA_1")})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["state"], "pending");
}

#[tokio::test]
async fn test_error_statuses() {
    let (app, _harness) = create_test_app().await;
    post_task(&app, task_body("initialize", "TA_1")).await;

    let cases = [
        (
            json!({"action": "start", "task_id": "TA_1"}),
            StatusCode::BAD_REQUEST,
            "validation_error",
        ),
        (
            task_body("explode", "TA_1"),
            StatusCode::BAD_REQUEST,
            "unknown_action",
        ),
        (
            task_body("get_status", "TA_404"),
            StatusCode::NOT_FOUND,
            "not_found",
        ),
        (
            task_body("publish", "TA_1"),
            StatusCode::CONFLICT,
            "illegal_transition",
        ),
        (
            task_body("initialize", "TA_1"),
            StatusCode::CONFLICT,
            "illegal_transition",
        ),
    ];

    for (request, expected_status, expected_code) in cases {
        let (status, body) = post_task(&app, request.clone()).await;
        assert_eq!(status, expected_status, "{request}");
        assert_eq!(body["error"]["code"], expected_code, "{request}");
    }
}

#[tokio::test]
async fn test_full_lifecycle_over_http() {
    let (app, harness) = create_test_app().await;
    harness.seed_release(&["SD_1"], Duration::ZERO);

    post_task(&app, task_body("initialize", "TA_1")).await;

    let (status, body) = post_task(&app, task_body("start", "TA_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"]["state"], "running");
    harness.wait_for_state("TA_1", TaskState::Staged).await;

    let (_, body) = post_task(&app, task_body("publish", "TA_1")).await;
    assert_eq!(body["body"]["state"], "publishing");
    harness.wait_for_state("TA_1", TaskState::Published).await;

    let (_, body) = post_task(&app, task_body("get_status", "TA_1")).await;
    assert_eq!(body["body"]["state"], "published");
    assert_eq!(body["body"]["progress"], 100);

    let (_, body) = post_task(&app, task_body("cancel", "TA_1")).await;
    assert_eq!(body["body"]["state"], "cancelled");
}
