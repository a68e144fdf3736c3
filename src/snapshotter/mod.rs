//! Task orchestration split into focused submodules.
//!
//! The `Snapshotter` struct and its methods are organized by concern:
//! - [`submit`] - Request validation and action dispatch
//! - [`scrape`] - The asynchronous phase behind `start`
//! - [`publish`] - The asynchronous phase behind `publish`
//! - [`control`] - Cancellation and snapshot download
//! - [`lifecycle`] - Restart recovery and shutdown coordination

mod control;
mod lifecycle;
mod publish;
mod scrape;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::clients::{
    Coordinator, DataSource, FsObjectStore, HttpCoordinator, HttpDataSource, ObjectStore,
};
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::publisher::Publisher;
use crate::store::TaskStore;
use crate::types::{Event, Snapshot, Task, TaskId};

/// Which asynchronous phase owns a task's cancellation token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Crawling behind `start`
    Scrape,
    /// Uploading behind `publish`
    Publish,
}

/// A registered phase and the token that stops it
pub(crate) struct ActivePhase {
    pub(crate) phase: Phase,
    pub(crate) token: CancellationToken,
}

/// In-flight phase tracking
#[derive(Clone)]
pub(crate) struct PhaseState {
    /// Running phases keyed by task (for cancel and shutdown)
    pub(crate) active: Arc<Mutex<HashMap<TaskId, ActivePhase>>>,
    /// Snapshots held between `staged` and `publish`
    pub(crate) snapshots: Arc<Mutex<HashMap<TaskId, Snapshot>>>,
    /// Whether `start` and `publish` are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every phase token, cancelled on shutdown
    pub(crate) shutdown_token: CancellationToken,
}

impl PhaseState {
    fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        }
    }
}

/// External systems a [`Snapshotter`] runs against
pub struct Collaborators {
    /// Durable task state
    pub store: Arc<dyn TaskStore>,
    /// Release registry and progress sink
    pub coordinator: Arc<dyn Coordinator>,
    /// Paginated entity listings
    pub data_source: Arc<dyn DataSource>,
    /// Artifact storage
    pub objects: Arc<dyn ObjectStore>,
}

/// Main snapshotter instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Snapshotter {
    /// Task store; public so embedders and integration tests can inspect tasks
    pub store: Arc<dyn TaskStore>,
    pub(crate) coordinator: Arc<dyn Coordinator>,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) aggregator: Arc<Aggregator>,
    pub(crate) publisher: Arc<Publisher>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) config: Arc<Config>,
    pub(crate) phases: PhaseState,
}

impl Snapshotter {
    /// Create a snapshotter wired to the configured services
    ///
    /// This initializes:
    /// - the SQLite task store (running migrations)
    /// - HTTP clients for the coordinator and the data service
    /// - the filesystem object store
    ///
    /// Tasks left mid-phase by a previous process are recovered before this
    /// returns.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let timeout = config.scrape.request_timeout;
        let db = Database::new(&config.persistence.database_path).await?;
        let collaborators = Collaborators {
            store: Arc::new(db),
            coordinator: Arc::new(HttpCoordinator::new(
                config.coordinator.base_url.clone(),
                timeout,
            )?),
            data_source: Arc::new(HttpDataSource::new(
                config.data_source.base_url.clone(),
                timeout,
            )?),
            objects: Arc::new(FsObjectStore::new(config.publish.object_store_dir.clone())),
        };

        Self::assemble(config, collaborators).await
    }

    /// Create a snapshotter over caller-supplied collaborators
    pub async fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, collaborators).await
    }

    async fn assemble(config: Config, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            store,
            coordinator,
            data_source,
            objects,
        } = collaborators;

        // Lagging subscribers get RecvError::Lagged past 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let aggregator = Aggregator::new(data_source, config.data_source.clone(), &config.scrape);
        let publisher = Publisher::new(
            Arc::clone(&objects),
            Arc::clone(&coordinator),
            config.publish.layout,
            config.scrape.request_timeout,
        );

        tracing::info!(
            store = store.name(),
            layout = ?config.publish.layout,
            entities = config.data_source.entities.len(),
            max_concurrent_crawls = config.scrape.max_concurrent_crawls,
            "snapshotter initialized"
        );

        let snapshotter = Self {
            store,
            coordinator,
            objects,
            aggregator: Arc::new(aggregator),
            publisher: Arc::new(publisher),
            event_tx,
            config: Arc::new(config),
            phases: PhaseState::new(),
        };

        snapshotter.recover_interrupted().await?;

        Ok(snapshotter)
    }

    /// Subscribe to lifecycle events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration this snapshotter was built with
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// With no subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Emit [`Event::StateChanged`] for a freshly written task view
    pub(crate) fn emit_state(&self, task: &Task) {
        self.emit_event(Event::StateChanged {
            task_id: task.task_id.clone(),
            state: task.state,
        });
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.phases.accepting_new.load(Ordering::SeqCst)
    }

    /// Register a phase for `task_id` and hand back its token
    ///
    /// The token is a child of the shutdown token, so a phase registered
    /// after shutdown began starts out cancelled.
    pub(crate) async fn register_phase(&self, task_id: &TaskId, phase: Phase) -> CancellationToken {
        let token = self.phases.shutdown_token.child_token();
        self.phases.active.lock().await.insert(
            task_id.clone(),
            ActivePhase {
                phase,
                token: token.clone(),
            },
        );
        token
    }

    /// Drop the registration of `phase`, leaving a newer phase of the same task alone
    pub(crate) async fn unregister_phase(&self, task_id: &TaskId, phase: Phase) {
        let mut active = self.phases.active.lock().await;
        if active.get(task_id).is_some_and(|entry| entry.phase == phase) {
            active.remove(task_id);
        }
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on `api.bind_address` and runs until it fails.
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let snapshotter = self.clone();
        let config = self.get_config();

        tokio::spawn(async move { crate::api::start_api_server(snapshotter, config).await })
    }
}
