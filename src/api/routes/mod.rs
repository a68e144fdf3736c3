//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`tasks`] - Task actions
//! - [`download`] - Published snapshot downloads
//! - [`system`] - Status, events, OpenAPI

use serde::{Deserialize, Serialize};

use crate::types::{Task, TaskRequest};

mod download;
mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` works
pub use download::*;
pub use system::*;
pub use tasks::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Body of POST /tasks
///
/// The coordinator may send the request bare or wrapped in `{"body": ...}`.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum TaskSubmission {
    /// `{"body": {"action": ..., "task_id": ..., "release_id": ...}}`
    Wrapped {
        /// The wrapped request
        body: TaskRequest,
    },
    /// `{"action": ..., "task_id": ..., "release_id": ...}`
    Plain(TaskRequest),
}

impl TaskSubmission {
    /// The request, whichever form it arrived in
    pub fn into_request(self) -> TaskRequest {
        match self {
            TaskSubmission::Wrapped { body } => body,
            TaskSubmission::Plain(request) => request,
        }
    }
}

/// Response of POST /tasks
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct TaskResponse {
    /// Task view after the action
    pub body: Task,
}

/// Path parameters for GET /download/:release_id/:study_id
#[derive(Debug, Deserialize)]
pub struct StudyPath {
    /// Release identifier
    pub release_id: String,
    /// Study identifier
    pub study_id: String,
}

/// Query parameters for GET /download
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadQuery {
    /// Attachment suffix after `.json.` (default: "gz")
    pub file_format: Option<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submission_accepts_both_forms() {
        let request = json!({"action": "start", "task_id": "TA_1", "release_id": "RE_1"});

        let plain: TaskSubmission = serde_json::from_value(request.clone()).unwrap();
        let wrapped: TaskSubmission = serde_json::from_value(json!({"body": request})).unwrap();

        for submission in [plain, wrapped] {
            let request = submission.into_request();
            assert_eq!(request.action.as_deref(), Some("start"));
            assert_eq!(request.task_id.as_deref(), Some("TA_1"));
            assert_eq!(request.release_id.as_deref(), Some("RE_1"));
        }
    }

    #[test]
    fn empty_object_is_a_request_with_no_fields() {
        let submission: TaskSubmission = serde_json::from_value(json!({})).unwrap();
        let request = submission.into_request();
        assert!(request.action.is_none());
        assert!(request.task_id.is_none());
    }
}
