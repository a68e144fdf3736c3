//! # snapshot-task
//!
//! Task service that exports release snapshots: it crawls a paginated data
//! service for every study of a release, stages the aggregated records, and
//! publishes them to an object store once the release coordinator says so.
//!
//! ## Design Philosophy
//!
//! snapshot-task is designed to be:
//! - **Coordinator-driven** - Every task moves through a fixed state machine in response to actions
//! - **Sensible defaults** - Works out of the box against local services
//! - **Library-first** - The REST API is a thin layer over [`Snapshotter`]
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use snapshot_task::{Action, Config, Snapshotter, TaskRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.data_source.base_url = "http://dataservice:5000".to_string();
//!     config.coordinator.base_url = "http://coordinator:5001".to_string();
//!
//!     let snapshotter = Snapshotter::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = snapshotter.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     snapshotter
//!         .submit(TaskRequest::new(Action::Initialize, "TA_1", "RE_1"))
//!         .await?;
//!     snapshotter
//!         .submit(TaskRequest::new(Action::Start, "TA_1", "RE_1"))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Crawl planning and per-study aggregation
pub mod aggregator;
/// REST API module
pub mod api;
/// ZIP packing for bundled snapshots
pub mod archive;
/// Data service, coordinator and object store clients
pub mod clients;
/// Configuration types
pub mod config;
/// Paginated crawling of one entity endpoint
pub mod crawler;
/// Database persistence layer
pub mod db;
/// Reading published snapshots back
pub mod download;
/// Error types
pub mod error;
/// Snapshot publishing
pub mod publisher;
/// Task state machine and phase orchestration (decomposed into focused submodules)
pub mod snapshotter;
/// Task persistence abstraction
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use clients::{
    Coordinator, DataSource, FsObjectStore, HttpCoordinator, HttpDataSource, ObjectStore,
    PageRequest, PageResult,
};
pub use config::{Config, EntityEndpoint, PublishLayout};
pub use db::Database;
pub use error::{
    ApiError, DatabaseError, Error, ErrorDetail, Result, ToHttpStatus, UpstreamError,
};
pub use snapshotter::{Collaborators, Snapshotter};
pub use store::{MemoryTaskStore, TaskStore, TaskUpdate};
pub use types::{
    Action, Event, Release, Snapshot, TASK_NAME, Task, TaskId, TaskPatch, TaskRequest, TaskState,
};

/// Helper function to run the snapshotter with graceful signal handling.
///
/// Waits for a termination signal and then calls the snapshotter's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use snapshot_task::{Config, Snapshotter, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let snapshotter = Snapshotter::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(snapshotter).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(snapshotter: Snapshotter) -> Result<()> {
    wait_for_signal().await;
    snapshotter.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
