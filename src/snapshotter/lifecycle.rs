//! Restart recovery and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::store::TaskUpdate;
use crate::types::{Event, TaskState};

use super::Snapshotter;

/// Upper bound on how long shutdown waits for phases to record their outcome
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl Snapshotter {
    /// Gracefully shut down the snapshotter
    ///
    /// 1. Stops accepting `start` and `publish`
    /// 2. Cancels every running phase
    /// 3. Waits (up to 30 seconds) for the phases to record their outcome
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Interrupted phases leave their task `failed` with
    /// "interrupted by shutdown". Status reads and cancels keep working.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.phases.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new phases");

        let active_count = self.phases.active.lock().await.len();
        self.phases.shutdown_token.cancel();
        tracing::info!(active_count, "Signalled cancellation to all active phases");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_phases()).await {
            Ok(()) => tracing::info!("All active phases finished"),
            Err(_) => tracing::warn!("Timeout waiting for phases to finish, proceeding with shutdown"),
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_phases(&self) {
        loop {
            let active_count = self.phases.active.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active phases to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Settle tasks a previous process left mid-phase
    ///
    /// Nothing of theirs survived the restart, so `running` and `publishing`
    /// become `failed` and `cancelling` becomes `cancelled`. `staged` tasks
    /// are kept; publishing one later fails for lack of a snapshot.
    pub(crate) async fn recover_interrupted(&self) -> Result<()> {
        let interrupted = self
            .store
            .list_in_states(&[
                TaskState::Running,
                TaskState::Publishing,
                TaskState::Cancelling,
            ])
            .await?;

        if interrupted.is_empty() {
            return Ok(());
        }
        tracing::info!(count = interrupted.len(), "Recovering interrupted tasks");

        for task in interrupted {
            let update = match task.state {
                TaskState::Cancelling => TaskUpdate::state(TaskState::Cancelled),
                _ => TaskUpdate::failed("interrupted by restart"),
            };
            if let Some(recovered) = self
                .store
                .update_if(&task.task_id, &[task.state], update)
                .await?
            {
                tracing::warn!(
                    task_id = %task.task_id,
                    from = %task.state,
                    to = %recovered.state,
                    "Recovered interrupted task"
                );
            }
        }

        Ok(())
    }
}
