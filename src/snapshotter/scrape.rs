//! The scrape phase: release lookup, crawl fan-out, staging.

use tokio_util::sync::CancellationToken;

use crate::aggregator::ScrapeContext;
use crate::error::{Error, Result};
use crate::store::TaskUpdate;
use crate::types::{Action, Event, Snapshot, Task, TaskId, TaskPatch, TaskState};
use crate::utils::bounded;

use super::{Phase, Snapshotter};

impl Snapshotter {
    /// Move a pending task to `running` and crawl its release in the background
    pub(crate) async fn start(&self, task_id: &TaskId) -> Result<Task> {
        self.ensure_accepting(Action::Start)?;

        let task = self
            .transition(
                task_id,
                Action::Start,
                TaskState::Pending,
                TaskUpdate::state(TaskState::Running).with_progress(0),
            )
            .await?;
        let token = self.register_phase(task_id, Phase::Scrape).await;

        tracing::info!(task_id = %task.task_id, release_id = %task.release_id, "scrape started");

        let snapshotter = self.clone();
        let phase_task = task.clone();
        tokio::spawn(async move {
            snapshotter.run_scrape(phase_task, token).await;
        });

        Ok(task)
    }

    /// Drive one scrape to a terminal write
    async fn run_scrape(&self, task: Task, token: CancellationToken) {
        match self.scrape_release(&task, &token).await {
            Ok(snapshot) => self.stage(&task, snapshot).await,
            Err(e) => self.fail_phase(&task.task_id, TaskState::Running, &e).await,
        }
        self.unregister_phase(&task.task_id, Phase::Scrape).await;
    }

    async fn scrape_release(&self, task: &Task, token: &CancellationToken) -> Result<Snapshot> {
        let timeout = self.config.scrape.request_timeout;

        let release = bounded(
            "coordinator release lookup",
            timeout,
            token,
            self.coordinator.get_release(&task.release_id),
        )
        .await?;
        tracing::info!(
            task_id = %task.task_id,
            release_id = %task.release_id,
            partitions = release.studies.len(),
            "release resolved"
        );

        let snapshot = self
            .aggregator
            .scrape(
                ScrapeContext {
                    task_id: &task.task_id,
                    store: self.store.as_ref(),
                    events: &self.event_tx,
                    cancel: token,
                },
                &release.studies,
            )
            .await?;

        let patch = TaskPatch {
            progress: Some(100),
            state: TaskState::Staged,
        };
        bounded(
            "coordinator patch",
            timeout,
            token,
            self.coordinator
                .patch_task(&task.release_id, &task.task_id, &patch),
        )
        .await?;

        Ok(snapshot)
    }

    /// Retain the snapshot and move the task to `staged`
    async fn stage(&self, task: &Task, snapshot: Snapshot) {
        let task_id = &task.task_id;
        let entries = snapshot.len();

        // Retained before the write: a publish that sees `staged` must find it
        self.phases
            .snapshots
            .lock()
            .await
            .insert(task_id.clone(), snapshot);

        let staged = self
            .store
            .update_if(
                task_id,
                &[TaskState::Running],
                TaskUpdate::state(TaskState::Staged).with_progress(100),
            )
            .await;

        match staged {
            Ok(Some(task)) => {
                tracing::info!(task_id = %task_id, release_id = %task.release_id, entries, "snapshot staged");
                self.emit_state(&task);
            }
            Ok(None) => {
                self.phases.snapshots.lock().await.remove(task_id);
                tracing::debug!(task_id = %task_id, "task left running before staging, snapshot discarded");
            }
            Err(e) => {
                self.phases.snapshots.lock().await.remove(task_id);
                self.fail_phase(task_id, TaskState::Running, &e).await;
            }
        }
    }

    /// Record a phase failure unless the task already moved on
    ///
    /// The write is a compare-and-set on `expected`, so a cancelled task
    /// stays cancelled. A cancellation caused by shutdown is recorded as an
    /// interruption.
    pub(crate) async fn fail_phase(&self, task_id: &TaskId, expected: TaskState, error: &Error) {
        let message = if matches!(error, Error::Cancelled(_)) && !self.is_accepting() {
            "interrupted by shutdown".to_string()
        } else {
            error.to_string()
        };

        let failed = self
            .store
            .update_if(task_id, &[expected], TaskUpdate::failed(message.clone()))
            .await;

        match failed {
            Ok(Some(task)) => {
                tracing::warn!(task_id = %task_id, phase = %expected, error = %message, "phase failed");
                self.emit_event(Event::Failed {
                    task_id: task_id.clone(),
                    error: message,
                });
                self.emit_state(&task);
            }
            Ok(None) => {
                tracing::debug!(
                    task_id = %task_id,
                    phase = %expected,
                    error = %error,
                    "task left phase before it ended, outcome dropped"
                );
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task_id,
                    phase = %expected,
                    error = %e,
                    phase_error = %message,
                    "failed to record phase failure"
                );
            }
        }
    }
}
