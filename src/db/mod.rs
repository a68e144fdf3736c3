//! Database layer for snapshot-task
//!
//! SQLite persistence for snapshot tasks. [`Database`] implements
//! [`TaskStore`](crate::store::TaskStore).
//!
//! ## Submodules
//!
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`tasks`] — Task CRUD and conditional updates

use crate::error::DatabaseError;
use crate::types::{Task, TaskId, TaskState};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod tasks;

/// Task record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    /// Task identifier (primary key)
    pub task_id: String,
    /// Release identifier
    pub release_id: String,
    /// Display name
    pub name: String,
    /// Unix timestamp in milliseconds when the task was initialized
    pub date_submitted: i64,
    /// Progress percentage (0-100)
    pub progress: Option<i64>,
    /// State name (see [`TaskState::as_str`])
    pub state: String,
    /// Diagnostic from the last failure
    pub error: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DatabaseError;

    fn try_from(row: TaskRow) -> std::result::Result<Self, Self::Error> {
        let state: TaskState = row.state.parse().map_err(|e| {
            DatabaseError::CorruptRecord(format!("task {}: {}", row.task_id, e))
        })?;
        let date_submitted = DateTime::<Utc>::from_timestamp_millis(row.date_submitted)
            .ok_or_else(|| {
                DatabaseError::CorruptRecord(format!(
                    "task {}: invalid date_submitted {}",
                    row.task_id, row.date_submitted
                ))
            })?;

        Ok(Task {
            task_id: TaskId(row.task_id),
            release_id: row.release_id,
            name: row.name,
            date_submitted,
            progress: row.progress.map(|p| p.clamp(0, 100) as u8),
            state,
            error: row.error,
        })
    }
}

/// Database handle for snapshot-task
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
