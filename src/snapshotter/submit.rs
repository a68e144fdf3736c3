//! Request validation and action dispatch.

use crate::error::{Error, Result};
use crate::store::TaskUpdate;
use crate::types::{Action, Event, Task, TaskId, TaskRequest, TaskState};

use super::Snapshotter;

/// Extract a required request field, rejecting absent and blank values
fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(field.to_string())),
    }
}

pub(crate) fn task_not_found(task_id: &TaskId) -> Error {
    Error::NotFound(format!("task {}", task_id))
}

fn state_name(state: Option<TaskState>) -> String {
    state.map_or("absent", |s| s.as_str()).to_string()
}

impl Snapshotter {
    /// Apply an action to a task and return the resulting view
    ///
    /// Validation happens in this order, and nothing is written unless every
    /// check passes:
    /// 1. `action`, `task_id` and `release_id` must be present and non-blank
    /// 2. `action` must name an [`Action`]
    /// 3. the task must exist unless the action is `initialize`
    /// 4. the action must be permitted in the task's current state
    ///
    /// `start` and `publish` return the transitional view (`running`,
    /// `publishing`) and continue in the background; poll with `get_status`
    /// or watch [`subscribe`](Snapshotter::subscribe) for the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a missing field
    /// - [`Error::UnknownAction`] for an unsupported action
    /// - [`Error::NotFound`] for an uninitialized task
    /// - [`Error::IllegalTransition`] when the state does not permit the action
    pub async fn submit(&self, request: TaskRequest) -> Result<Task> {
        let action = required(request.action.as_deref(), "action")?;
        let task_id = TaskId::from(required(request.task_id.as_deref(), "task_id")?);
        let release_id = required(request.release_id.as_deref(), "release_id")?;
        let action: Action = action.parse()?;

        let current = self.store.get(&task_id).await?;
        let state = current.as_ref().map(|task| task.state);

        if current.is_none() && action != Action::Initialize {
            return Err(task_not_found(&task_id));
        }
        if !action.is_permitted_in(state) {
            return Err(Error::IllegalTransition {
                action: action.to_string(),
                state: state_name(state),
            });
        }

        if let Some(task) = &current
            && task.release_id != release_id
        {
            tracing::debug!(
                task_id = %task_id,
                stored_release = %task.release_id,
                requested_release = release_id,
                "request names a different release, using the stored one"
            );
        }

        tracing::debug!(task_id = %task_id, action = %action, "submitting action");

        match action {
            Action::Initialize => self.initialize(task_id, release_id).await,
            Action::Start => self.start(&task_id).await,
            Action::Publish => self.publish(&task_id).await,
            Action::GetStatus => current.ok_or_else(|| task_not_found(&task_id)),
            Action::Cancel => self.cancel(&task_id).await,
        }
    }

    /// Create the task in `pending`
    ///
    /// The insert is conditional, so of two racing initializes only one
    /// creates the task; the other sees the state the winner left behind.
    async fn initialize(&self, task_id: TaskId, release_id: &str) -> Result<Task> {
        let task = Task::new(task_id, release_id);
        if !self.store.insert_if_absent(&task).await? {
            let state = self.store.get(&task.task_id).await?.map(|t| t.state);
            return Err(Error::IllegalTransition {
                action: Action::Initialize.to_string(),
                state: state_name(state),
            });
        }

        tracing::info!(task_id = %task.task_id, release_id, "task initialized");
        self.emit_event(Event::TaskInitialized {
            task_id: task.task_id.clone(),
            release_id: task.release_id.clone(),
        });
        Ok(task)
    }

    /// Compare-and-set a task out of `from`
    ///
    /// Losing the race to a concurrent writer surfaces as an illegal
    /// transition against whatever state won.
    pub(crate) async fn transition(
        &self,
        task_id: &TaskId,
        action: Action,
        from: TaskState,
        update: TaskUpdate,
    ) -> Result<Task> {
        match self.store.update_if(task_id, &[from], update).await? {
            Some(task) => {
                self.emit_state(&task);
                Ok(task)
            }
            None => {
                let state = self.store.get(task_id).await?.map(|task| task.state);
                Err(Error::IllegalTransition {
                    action: action.to_string(),
                    state: state_name(state),
                })
            }
        }
    }

    /// Refuse to launch new phases once shutdown has begun
    pub(crate) fn ensure_accepting(&self, action: Action) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Error::Cancelled(format!(
                "{} refused, service is shutting down",
                action
            )))
        }
    }
}
