//! Shared test helpers for creating Snapshotter instances in tests.

use crate::clients::{MemoryCoordinator, MemoryDataSource, MemoryObjectStore};
use crate::config::{Config, EntityEndpoint};
use crate::db::Database;
use crate::snapshotter::{Collaborators, Snapshotter};
use crate::types::{Action, Task, TaskId, TaskRequest, TaskState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Release every test task belongs to
pub(crate) const RELEASE: &str = "RE_1";

/// A snapshotter over in-memory collaborators and a SQLite task store
///
/// The tempdir holds the database and must be kept alive.
pub(crate) struct TestHarness {
    pub(crate) snapshotter: Snapshotter,
    pub(crate) db: Arc<Database>,
    pub(crate) data_source: Arc<MemoryDataSource>,
    pub(crate) coordinator: Arc<MemoryCoordinator>,
    pub(crate) objects: Arc<MemoryObjectStore>,
    pub(crate) _temp_dir: TempDir,
}

/// Three entities, two records per page
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.publish.object_store_dir = dir.join("snapshots");
    config.data_source.entities = vec![
        EntityEndpoint::new("study", "/studies"),
        EntityEndpoint::new("participant", "/participants"),
        EntityEndpoint::new("biospecimen", "/biospecimens"),
    ];
    config.data_source.page_size = 2;
    config.scrape.max_concurrent_crawls = 4;
    config.scrape.request_timeout = Duration::from_secs(5);
    config
}

/// Helper to create a test Snapshotter with a fresh database
pub(crate) async fn create_test_snapshotter() -> TestHarness {
    let temp_dir = tempdir().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db"))
        .await
        .unwrap();
    create_test_snapshotter_with_db(temp_dir, Arc::new(db)).await
}

/// Helper to create a test Snapshotter over an already populated database
pub(crate) async fn create_test_snapshotter_with_db(
    temp_dir: TempDir,
    db: Arc<Database>,
) -> TestHarness {
    let config = test_config(temp_dir.path());
    let data_source = Arc::new(MemoryDataSource::new());
    let coordinator = Arc::new(MemoryCoordinator::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let snapshotter = Snapshotter::with_collaborators(
        config,
        Collaborators {
            store: db.clone(),
            coordinator: coordinator.clone(),
            data_source: data_source.clone(),
            objects: objects.clone(),
        },
    )
    .await
    .unwrap();

    TestHarness {
        snapshotter,
        db,
        data_source,
        coordinator,
        objects,
        _temp_dir: temp_dir,
    }
}

impl TestHarness {
    /// Register `studies` under [`RELEASE`] and script two pages per crawl
    ///
    /// Every page is delayed by `delay`. Each crawl yields two records whose
    /// ids name their study, entity and page.
    pub(crate) fn seed_release(&self, studies: &[&str], delay: Duration) {
        let studies: Vec<String> = studies.iter().map(|s| s.to_string()).collect();
        self.coordinator.insert_release(RELEASE, studies.clone());

        for job in self.snapshotter.aggregator.plan(&studies) {
            let page = |n: usize| vec![json!({"kf_id": format!("{}_{}_{}", job.partition, job.entity, n)})];
            self.data_source
                .insert_pages(&job.request, vec![page(0), page(1)], delay);
        }
    }

    /// Submit `action` for `task_id` against [`RELEASE`]
    pub(crate) async fn submit(&self, action: Action, task_id: &str) -> crate::Result<Task> {
        self.snapshotter
            .submit(TaskRequest::new(action, task_id, RELEASE))
            .await
    }

    /// Store a task directly in `state`, bypassing the state machine
    pub(crate) async fn put_task(&self, task_id: &str, state: TaskState) -> Task {
        let mut task = Task::new(TaskId::from(task_id), RELEASE);
        task.state = state;
        self.snapshotter.store.put(&task).await.unwrap();
        task
    }

    /// Poll the store until `task_id` reaches `state` (panics after 5 seconds)
    pub(crate) async fn wait_for_state(&self, task_id: &str, state: TaskState) -> Task {
        let task_id = TaskId::from(task_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let task = self.snapshotter.store.get(&task_id).await.unwrap().unwrap();
            if task.state == state {
                return task;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "task {task_id} stuck in {} waiting for {state}",
                task.state
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until no phase is registered (panics after 5 seconds)
    ///
    /// A phase unregisters after its last write and event, so this is the
    /// point where its effects are all observable.
    pub(crate) async fn wait_until_idle(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.active_phases().await > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "phases still active after 5 seconds"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Number of snapshots currently retained
    pub(crate) async fn retained_snapshots(&self) -> usize {
        self.snapshotter.phases.snapshots.lock().await.len()
    }

    /// Number of phases currently registered
    pub(crate) async fn active_phases(&self) -> usize {
        self.snapshotter.phases.active.lock().await.len()
    }
}
