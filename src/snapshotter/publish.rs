//! The publish phase: upload artifacts, confirm with the coordinator.

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::publisher::PublishContext;
use crate::store::TaskUpdate;
use crate::types::{Action, Event, Task, TaskId, TaskState};

use super::{Phase, Snapshotter};

impl Snapshotter {
    /// Move a staged task to `publishing` and publish its snapshot in the background
    pub(crate) async fn publish(&self, task_id: &TaskId) -> Result<Task> {
        self.ensure_accepting(Action::Publish)?;

        let task = self
            .transition(
                task_id,
                Action::Publish,
                TaskState::Staged,
                TaskUpdate::state(TaskState::Publishing),
            )
            .await?;
        let token = self.register_phase(task_id, Phase::Publish).await;

        tracing::info!(task_id = %task.task_id, release_id = %task.release_id, "publish started");

        let snapshotter = self.clone();
        let phase_task = task.clone();
        tokio::spawn(async move {
            snapshotter.run_publish(phase_task, token).await;
        });

        Ok(task)
    }

    async fn run_publish(&self, task: Task, token: CancellationToken) {
        let task_id = &task.task_id;

        match self.publish_snapshot(&task, &token).await {
            Ok(()) => {
                let published = self
                    .store
                    .update_if(
                        task_id,
                        &[TaskState::Publishing],
                        TaskUpdate::state(TaskState::Published).with_progress(100),
                    )
                    .await;
                match published {
                    Ok(Some(stored)) => {
                        tracing::info!(task_id = %task_id, release_id = %task.release_id, "release published");
                        self.emit_event(Event::Published {
                            task_id: task_id.clone(),
                            release_id: task.release_id.clone(),
                        });
                        self.emit_state(&stored);
                    }
                    Ok(None) => {
                        tracing::debug!(task_id = %task_id, "task left publishing before it finished");
                    }
                    Err(e) => self.fail_phase(task_id, TaskState::Publishing, &e).await,
                }
            }
            Err(e) => self.fail_phase(task_id, TaskState::Publishing, &e).await,
        }

        self.unregister_phase(task_id, Phase::Publish).await;
    }

    /// Take the retained snapshot and hand it to the publisher
    ///
    /// The snapshot is consumed whatever the outcome.
    async fn publish_snapshot(&self, task: &Task, token: &CancellationToken) -> Result<()> {
        let snapshot = self
            .phases
            .snapshots
            .lock()
            .await
            .remove(&task.task_id)
            .ok_or_else(|| Error::SnapshotUnavailable(task.task_id.to_string()))?;

        self.publisher
            .publish(
                PublishContext {
                    task_id: &task.task_id,
                    release_id: &task.release_id,
                    events: &self.event_tx,
                    cancel: token,
                },
                &snapshot,
            )
            .await
    }
}
