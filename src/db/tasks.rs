//! Task CRUD operations.

use crate::error::DatabaseError;
use crate::store::{TaskStore, TaskUpdate};
use crate::types::{Task, TaskId, TaskState};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, TaskRow};

const TASK_COLUMNS: &str = "task_id, release_id, name, date_submitted, progress, state, error";

impl Database {
    /// Apply `update` to a task, optionally guarded on its current state
    ///
    /// A single `UPDATE ... RETURNING` statement, so the state check and the
    /// write cannot interleave with another writer.
    async fn apply_update(
        &self,
        task_id: &TaskId,
        expected: Option<&[TaskState]>,
        update: TaskUpdate,
    ) -> Result<Option<Task>> {
        let guard = match expected {
            Some([]) => return Ok(None),
            Some(states) => format!(" AND state IN ({})", vec!["?"; states.len()].join(", ")),
            None => String::new(),
        };

        let sql = format!(
            r#"
            UPDATE tasks SET
                state = COALESCE(?, state),
                progress = CASE WHEN ? THEN ? ELSE progress END,
                error = CASE WHEN ? THEN ? ELSE error END,
                updated_at = ?
            WHERE task_id = ?{guard}
            RETURNING {TASK_COLUMNS}
            "#
        );

        let mut query = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(update.state.map(|s| s.as_str()))
            .bind(update.progress.is_some())
            .bind(update.progress.flatten().map(i64::from))
            .bind(update.error.is_some())
            .bind(update.error.clone().flatten())
            .bind(chrono::Utc::now().timestamp())
            .bind(task_id.as_str());
        for state in expected.unwrap_or_default() {
            query = query.bind(state.as_str());
        }

        let row = query.fetch_optional(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update task {}: {}",
                task_id, e
            )))
        })?;

        row.map(Task::try_from)
            .transpose()
            .map_err(Error::Database)
    }

    /// Insert a full task row, resolving a key conflict with `on_conflict`
    ///
    /// Returns the number of rows written.
    async fn write_task(&self, task: &Task, on_conflict: &str) -> Result<u64> {
        let sql = format!(
            r#"
            INSERT INTO tasks (
                task_id, release_id, name, date_submitted,
                progress, state, error, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            {on_conflict}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(task.task_id.as_str())
            .bind(&task.release_id)
            .bind(&task.name)
            .bind(task.date_submitted.timestamp_millis())
            .bind(task.progress.map(i64::from))
            .bind(task.state.as_str())
            .bind(&task.error)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to store task {}: {}",
                    task.task_id, e
                )))
            })?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskStore for Database {
    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?"
        ))
        .bind(task_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        row.map(Task::try_from)
            .transpose()
            .map_err(Error::Database)
    }

    async fn put(&self, task: &Task) -> Result<()> {
        self.write_task(
            task,
            r#"ON CONFLICT(task_id) DO UPDATE SET
                release_id = excluded.release_id,
                name = excluded.name,
                date_submitted = excluded.date_submitted,
                progress = excluded.progress,
                state = excluded.state,
                error = excluded.error,
                updated_at = excluded.updated_at"#,
        )
        .await?;
        Ok(())
    }

    async fn insert_if_absent(&self, task: &Task) -> Result<bool> {
        let inserted = self
            .write_task(task, "ON CONFLICT(task_id) DO NOTHING")
            .await?;
        Ok(inserted == 1)
    }

    async fn update(&self, task_id: &TaskId, update: TaskUpdate) -> Result<Option<Task>> {
        self.apply_update(task_id, None, update).await
    }

    async fn update_if(
        &self,
        task_id: &TaskId,
        expected: &[TaskState],
        update: TaskUpdate,
    ) -> Result<Option<Task>> {
        self.apply_update(task_id, Some(expected), update).await
    }

    async fn list_in_states(&self, states: &[TaskState]) -> Result<Vec<Task>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE state IN ({}) ORDER BY date_submitted ASC",
            vec!["?"; states.len()].join(", ")
        );
        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks: {}",
                e
            )))
        })?;

        rows.into_iter()
            .map(|row| Task::try_from(row).map_err(Error::Database))
            .collect()
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
