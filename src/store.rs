//! Task store capability
//!
//! The [`TaskStore`] trait is the single source of truth for task state. Phase
//! handlers finish with [`TaskStore::update_if`], a compare-and-set on the
//! expected prior state, so a late result can never overwrite a newer
//! `cancelled` or `failed` state.
//!
//! Implementations:
//! - [`Database`](crate::db::Database) - SQLite, durable
//! - [`MemoryTaskStore`] - in-process map, for embedding and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{Task, TaskId, TaskState};

/// Partial update applied to a stored task
///
/// `None` leaves a field untouched. `progress` and `error` are doubly optional
/// so they can be cleared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskUpdate {
    /// New state
    pub state: Option<TaskState>,
    /// New progress (`Some(None)` clears it)
    pub progress: Option<Option<u8>>,
    /// New error (`Some(None)` clears it)
    pub error: Option<Option<String>>,
}

impl TaskUpdate {
    /// Update that only moves the task to `state`
    pub fn state(state: TaskState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    /// Update that only sets progress
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(Some(progress.min(100))),
            ..Default::default()
        }
    }

    /// Move to `failed` and record the diagnostic
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: Some(TaskState::Failed),
            error: Some(Some(error.into())),
            ..Default::default()
        }
    }

    /// Also set progress
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(Some(progress.min(100)));
        self
    }

    /// Apply this update to a task in place
    pub fn apply(&self, task: &mut Task) {
        if let Some(state) = self.state {
            task.state = state;
        }
        if let Some(progress) = self.progress {
            task.progress = progress;
        }
        if let Some(error) = &self.error {
            task.error = error.clone();
        }
    }
}

/// Durable key-value store of tasks, keyed by task ID
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch a task, `None` if it was never initialized
    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>>;

    /// Insert or replace a task
    async fn put(&self, task: &Task) -> Result<()>;

    /// Insert a task only if its ID is not stored yet
    ///
    /// Returns `false`, writing nothing, when a task with the same ID exists.
    /// The existence check and the insert are atomic.
    async fn insert_if_absent(&self, task: &Task) -> Result<bool>;

    /// Apply a partial update unconditionally
    ///
    /// Returns the updated task, or `None` if it does not exist.
    async fn update(&self, task_id: &TaskId, update: TaskUpdate) -> Result<Option<Task>>;

    /// Apply a partial update only if the task is currently in one of `expected`
    ///
    /// Returns the updated task, or `None` if the task does not exist or its
    /// state did not match. The check and write are atomic.
    async fn update_if(
        &self,
        task_id: &TaskId,
        expected: &[TaskState],
        update: TaskUpdate,
    ) -> Result<Option<Task>>;

    /// All tasks currently in one of `states`
    async fn list_in_states(&self, states: &[TaskState]) -> Result<Vec<Task>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// In-memory [`TaskStore`]
///
/// Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn put(&self, task: &Task) -> Result<()> {
        self.tasks
            .write()
            .await
            .insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn insert_if_absent(&self, task: &Task) -> Result<bool> {
        match self.tasks.write().await.entry(task.task_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(true)
            }
        }
    }

    async fn update(&self, task_id: &TaskId, update: TaskUpdate) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.get_mut(task_id).map(|task| {
            update.apply(task);
            task.clone()
        }))
    }

    async fn update_if(
        &self,
        task_id: &TaskId,
        expected: &[TaskState],
        update: TaskUpdate,
    ) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        Ok(match tasks.get_mut(task_id) {
            Some(task) if expected.contains(&task.state) => {
                update.apply(task);
                Some(task.clone())
            }
            _ => None,
        })
    }

    async fn list_in_states(&self, states: &[TaskState]) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| states.contains(&task.state))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
