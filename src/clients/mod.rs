//! Outbound collaborators
//!
//! The snapshotter talks to three external systems, each behind an
//! `async_trait` capability so the core can run against HTTP services in
//! production and in-memory fakes in tests:
//!
//! - [`Coordinator`] - release registry; lists a release's studies and
//!   receives task progress patches
//! - [`DataSource`] - paginated entity listings
//! - [`ObjectStore`] - artifact storage for published snapshots

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result, UpstreamError};
use crate::types::{Record, Release, TaskId, TaskPatch};

mod coordinator;
mod data_source;
mod object_store;

pub use coordinator::{HttpCoordinator, MemoryCoordinator};
pub use data_source::{HttpDataSource, MemoryDataSource};
pub use object_store::{FsObjectStore, MemoryObjectStore};

/// Release coordinator
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Fetch a release and its study (partition) list
    async fn get_release(&self, release_id: &str) -> Result<Release>;

    /// Report task progress and state for a release
    async fn patch_task(&self, release_id: &str, task_id: &TaskId, patch: &TaskPatch)
    -> Result<()>;
}

/// A single page request against the data service
///
/// The first page of a crawl is an entity path plus query parameters. Later
/// pages follow the `next` link returned by the service, which already
/// carries its own query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Path relative to the data service base URL, or an absolute URL
    pub path: String,
    /// Query parameters appended to `path`, in order
    pub query: Vec<(String, String)>,
}

impl PageRequest {
    /// Request for `path` with no parameters
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Add a query parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Request that follows a `next` link verbatim
    pub fn follow(next: impl Into<String>) -> Self {
        Self::new(next)
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        let mut sep = if self.path.contains('?') { '&' } else { '?' };
        for (key, value) in &self.query {
            write!(f, "{sep}{key}={value}")?;
            sep = '&';
        }
        Ok(())
    }
}

/// Outcome of a page fetch
#[derive(Clone, Debug, PartialEq)]
pub enum PageResult {
    /// A page of records and the link to the following page, if any
    Page {
        /// Records on this page, in service order
        results: Vec<Record>,
        /// Link to the next page
        next: Option<String>,
    },
    /// The resource does not exist (HTTP 404)
    NotFound,
}

/// Paginated data service
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch exactly one page
    async fn list_page(&self, request: &PageRequest) -> Result<PageResult>;
}

/// Artifact storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing object under `key`
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read an object, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Map a reqwest failure onto the upstream taxonomy
pub(crate) fn request_error(
    e: reqwest::Error,
    operation: &str,
    timeout: Duration,
    upstream: fn(String) -> UpstreamError,
) -> Error {
    if e.is_timeout() {
        UpstreamError::Timeout {
            operation: operation.to_string(),
            timeout,
        }
        .into()
    } else if e.is_connect() {
        upstream(format!("connection failed for {}: {}", operation, e)).into()
    } else {
        upstream(format!("{} failed: {}", operation, e)).into()
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("snapshot-task/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
