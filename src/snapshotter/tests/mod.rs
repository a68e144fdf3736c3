use super::test_helpers::{RELEASE, create_test_snapshotter};
use crate::error::Error;
use crate::store::TaskStore;
use crate::types::{Action, Event, TaskId, TaskRequest, TaskState};
use std::time::Duration;

mod lifecycle;

/// Drain every event received so far
fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
