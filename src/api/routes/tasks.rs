//! Task action handler.

use super::{TaskResponse, TaskSubmission};
use crate::api::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// POST /tasks - Submit a task action
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = TaskSubmission,
    responses(
        (status = 200, description = "Action applied; body holds the task view", body = TaskResponse),
        (status = 400, description = "Missing field or unknown action", body = crate::error::ApiError),
        (status = 404, description = "Task was never initialized", body = crate::error::ApiError),
        (status = 409, description = "Action not allowed in the task's state", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn submit_task(
    State(state): State<AppState>,
    Json(submission): Json<TaskSubmission>,
) -> impl IntoResponse {
    match state.snapshotter.submit(submission.into_request()).await {
        Ok(task) => (StatusCode::OK, Json(TaskResponse { body: task })).into_response(),
        Err(e) => e.into_response(),
    }
}
