//! Application state for the API server

use crate::{Config, Snapshotter};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request (cheap Arc clones).
#[derive(Clone)]
pub struct AppState {
    /// The snapshotter handling task actions
    pub snapshotter: Arc<Snapshotter>,

    /// Configuration the server was started with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(snapshotter: Arc<Snapshotter>, config: Arc<Config>) -> Self {
        Self {
            snapshotter,
            config,
        }
    }
}
