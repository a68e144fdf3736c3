//! Cancellation and snapshot download.

use serde_json::Value;

use crate::download;
use crate::error::Result;
use crate::store::TaskUpdate;
use crate::types::{Event, Task, TaskId, TaskState};

use super::Snapshotter;
use super::submit::task_not_found;

impl Snapshotter {
    /// Cancel a task from any state
    ///
    /// Writes `cancelling`, stops the task's phase (if one is running),
    /// discards any retained snapshot and writes `cancelled`. A phase that
    /// finishes afterwards cannot overwrite the result: its terminal write
    /// expects `running` or `publishing`.
    pub(crate) async fn cancel(&self, task_id: &TaskId) -> Result<Task> {
        let cancelling = self
            .store
            .update(task_id, TaskUpdate::state(TaskState::Cancelling))
            .await?
            .ok_or_else(|| task_not_found(task_id))?;
        self.emit_state(&cancelling);

        // Remove the entry under the lock, signal after releasing it
        let active = self.phases.active.lock().await.remove(task_id);
        if let Some(active) = active {
            tracing::debug!(task_id = %task_id, phase = ?active.phase, "signalling phase cancellation");
            active.token.cancel();
        }

        self.phases.snapshots.lock().await.remove(task_id);

        let cancelled = self
            .store
            .update_if(
                task_id,
                &[TaskState::Cancelling],
                TaskUpdate::state(TaskState::Cancelled),
            )
            .await?;

        let task = match cancelled {
            Some(task) => {
                tracing::info!(task_id = %task_id, release_id = %task.release_id, "task cancelled");
                self.emit_event(Event::Cancelled {
                    task_id: task_id.clone(),
                });
                self.emit_state(&task);
                task
            }
            // A concurrent cancel finished first
            None => self
                .store
                .get(task_id)
                .await?
                .ok_or_else(|| task_not_found(task_id))?,
        };

        Ok(task)
    }

    /// Published snapshot of a release, nested as `{release: {study: {entity: records}}}`
    ///
    /// With `study_id` only that study is included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) when nothing was
    /// published for the selection.
    pub async fn download(&self, release_id: &str, study_id: Option<&str>) -> Result<Value> {
        download::collect_release(self.objects.as_ref(), release_id, study_id).await
    }
}
