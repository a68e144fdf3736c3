//! Error types for snapshot-task
//!
//! This module provides:
//! - The validation-class errors returned synchronously by `submit`
//! - Upstream errors recorded on a task when an asynchronous phase fails
//! - HTTP status code mapping and structured JSON error bodies for the API

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for snapshot-task operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for snapshot-task
#[derive(Debug, Error)]
pub enum Error {
    /// A required request field was missing or blank
    #[error("missing a required field: {0}")]
    Validation(String),

    /// The action is not one of the supported actions
    #[error("action must be one of: {valid}")]
    UnknownAction {
        /// The action that was submitted
        action: String,
        /// Comma-separated list of valid actions
        valid: String,
    },

    /// Task (or other resource) does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The action is not permitted in the task's current state
    #[error("{action} is not allowed in {state}")]
    IllegalTransition {
        /// The action that was attempted
        action: String,
        /// The current state (`absent` if the task does not exist)
        state: String,
    },

    /// A collaborator (coordinator, data service, object store) failed
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// A staged task has no snapshot held in memory
    #[error("snapshot not available for task {0}")]
    SnapshotUnavailable(String),

    /// The operation was cancelled
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "data_source.base_url")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive bundling or expansion failed
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Failures of the external collaborators used during `start` and `publish`
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Coordinator request failed or returned a non-success status
    #[error("coordinator: {0}")]
    Coordinator(String),

    /// Data service request failed or returned a non-success status
    #[error("data service: {0}")]
    DataSource(String),

    /// Object store write or read failed
    #[error("object store: {0}")]
    ObjectStore(String),

    /// A request did not complete within the configured timeout
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// What was being waited on (e.g., "GET /participants")
        operation: String,
        /// The timeout that elapsed
        timeout: Duration,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded into a task
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "illegal_transition",
///     "message": "publish is not allowed in running",
///     "details": { "action": "publish", "state": "running" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - rejected before any state is touched
            Error::Validation(_) => 400,
            Error::UnknownAction { .. } => 400,
            Error::Config { .. } => 400,

            Error::NotFound(_) => 404,

            // 409 Conflict - action not valid in current state
            Error::IllegalTransition { .. } => 409,
            Error::SnapshotUnavailable(_) => 409,
            Error::Cancelled(_) => 409,

            // 502/504 - collaborator failures
            Error::Upstream(UpstreamError::Timeout { .. }) => 504,
            Error::Upstream(_) => 502,
            Error::Network(_) => 502,

            Error::Database(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Archive(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::UnknownAction { .. } => "unknown_action",
            Error::NotFound(_) => "not_found",
            Error::IllegalTransition { .. } => "illegal_transition",
            Error::Upstream(e) => match e {
                UpstreamError::Coordinator(_) => "coordinator_error",
                UpstreamError::DataSource(_) => "data_source_error",
                UpstreamError::ObjectStore(_) => "object_store_error",
                UpstreamError::Timeout { .. } => "upstream_timeout",
            },
            Error::SnapshotUnavailable(_) => "snapshot_unavailable",
            Error::Cancelled(_) => "cancelled",
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Archive(_) => "archive_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::UnknownAction { action, valid } => Some(serde_json::json!({
                "action": action,
                "valid_actions": valid.split(", ").collect::<Vec<_>>(),
            })),
            Error::IllegalTransition { action, state } => Some(serde_json::json!({
                "action": action,
                "state": state,
            })),
            Error::Upstream(UpstreamError::Timeout { operation, timeout }) => {
                Some(serde_json::json!({
                    "operation": operation,
                    "timeout_secs": timeout.as_secs_f64(),
                }))
            }
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::Validation("task_id".into()),
                400,
                "validation_error",
            ),
            (
                Error::UnknownAction {
                    action: "explode".into(),
                    valid: "initialize, start".into(),
                },
                400,
                "unknown_action",
            ),
            (
                Error::Config {
                    message: "page_size must be positive".into(),
                    key: Some("data_source.page_size".into()),
                },
                400,
                "config_error",
            ),
            (Error::NotFound("T1".into()), 404, "not_found"),
            (
                Error::IllegalTransition {
                    action: "publish".into(),
                    state: "running".into(),
                },
                409,
                "illegal_transition",
            ),
            (
                Error::SnapshotUnavailable("T1".into()),
                409,
                "snapshot_unavailable",
            ),
            (Error::Cancelled("T1".into()), 409, "cancelled"),
            (
                Error::Upstream(UpstreamError::Coordinator("503".into())),
                502,
                "coordinator_error",
            ),
            (
                Error::Upstream(UpstreamError::DataSource("500".into())),
                502,
                "data_source_error",
            ),
            (
                Error::Upstream(UpstreamError::ObjectStore("disk full".into())),
                502,
                "object_store_error",
            ),
            (
                Error::Upstream(UpstreamError::Timeout {
                    operation: "GET /participants".into(),
                    timeout: Duration::from_secs(30),
                }),
                504,
                "upstream_timeout",
            ),
            (
                Error::Database(DatabaseError::QueryFailed("locked".into())),
                500,
                "database_error",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                500,
                "io_error",
            ),
            (
                Error::ApiServerError("bind failed".into()),
                500,
                "api_server_error",
            ),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_and_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            assert_eq!(
                error.status_code(),
                expected_status,
                "{expected_code} returned the wrong status"
            );
            assert_eq!(error.error_code(), expected_code);
        }
    }

    #[test]
    fn unknown_action_message_lists_valid_actions() {
        let error = Error::UnknownAction {
            action: "explode".into(),
            valid: "initialize, start, publish, get_status, cancel".into(),
        };
        assert_eq!(
            error.to_string(),
            "action must be one of: initialize, start, publish, get_status, cancel"
        );

        let api: ApiError = error.into();
        let details = api.error.details.unwrap();
        assert_eq!(details["valid_actions"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn illegal_transition_message_names_action_and_state() {
        let error = Error::IllegalTransition {
            action: "start".into(),
            state: "staged".into(),
        };
        assert_eq!(error.to_string(), "start is not allowed in staged");

        let api: ApiError = error.into();
        assert_eq!(api.error.code, "illegal_transition");
        assert_eq!(api.error.details.unwrap()["state"], "staged");
    }

    #[test]
    fn api_error_omits_details_when_absent() {
        let api: ApiError = Error::NotFound("T9".into()).into();
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["error"]["message"], "T9 not found");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn timeout_message_keeps_sub_second_precision() {
        let error = Error::Upstream(UpstreamError::Timeout {
            operation: "GET /participants".into(),
            timeout: Duration::from_millis(250),
        });
        assert_eq!(error.to_string(), "GET /participants timed out after 250ms");

        let api: ApiError = error.into();
        assert_eq!(api.error.details.unwrap()["timeout_secs"], 0.25);
    }

    #[tokio::test]
    async fn reqwest_failure_is_a_network_error() {
        let error: Error = reqwest::get("not a url").await.unwrap_err().into();
        assert_eq!(error.status_code(), 502);
        assert_eq!(error.error_code(), "network_error");
    }

}
