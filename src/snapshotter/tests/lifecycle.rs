use super::*;
use crate::db::Database;
use crate::snapshotter::test_helpers::create_test_snapshotter_with_db;
use crate::types::Task;
use std::sync::Arc;

#[tokio::test]
async fn test_restart_recovers_interrupted_tasks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db"))
        .await
        .unwrap();

    for (task_id, state) in [
        ("TA_pending", TaskState::Pending),
        ("TA_running", TaskState::Running),
        ("TA_staged", TaskState::Staged),
        ("TA_publishing", TaskState::Publishing),
        ("TA_cancelling", TaskState::Cancelling),
        ("TA_published", TaskState::Published),
    ] {
        let mut task = Task::new(TaskId::from(task_id), RELEASE);
        task.state = state;
        db.put(&task).await.unwrap();
    }

    let harness = create_test_snapshotter_with_db(temp_dir, Arc::new(db)).await;

    let expected = [
        ("TA_pending", TaskState::Pending, None),
        ("TA_running", TaskState::Failed, Some("interrupted by restart")),
        ("TA_staged", TaskState::Staged, None),
        ("TA_publishing", TaskState::Failed, Some("interrupted by restart")),
        ("TA_cancelling", TaskState::Cancelled, None),
        ("TA_published", TaskState::Published, None),
    ];
    for (task_id, state, error) in expected {
        let task = harness
            .db
            .get(&TaskId::from(task_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.state, state, "{task_id}");
        assert_eq!(task.error.as_deref(), error, "{task_id}");
    }

    // A staged task lost its snapshot with the old process
    harness.submit(Action::Publish, "TA_staged").await.unwrap();
    let failed = harness.wait_for_state("TA_staged", TaskState::Failed).await;
    assert!(failed.error.unwrap().contains("snapshot not available"));
}

#[tokio::test]
async fn test_shutdown_interrupts_running_scrape() {
    let harness = create_test_snapshotter().await;
    harness.seed_release(&["SD_1"], Duration::from_millis(500));
    let mut events = harness.snapshotter.subscribe();

    harness.submit(Action::Initialize, "TA_1").await.unwrap();
    harness.submit(Action::Initialize, "TA_2").await.unwrap();
    harness.submit(Action::Start, "TA_1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness.snapshotter.shutdown().await.unwrap();

    assert_eq!(harness.active_phases().await, 0);
    let task = harness.submit(Action::GetStatus, "TA_1").await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.error.as_deref(), Some("interrupted by shutdown"));

    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(Event::Shutdown)));

    // New phases are refused, reads and cancels still work
    let err = harness.submit(Action::Start, "TA_2").await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)), "got {err:?}");
    assert_eq!(
        harness.submit(Action::GetStatus, "TA_2").await.unwrap().state,
        TaskState::Pending
    );
    assert_eq!(
        harness.submit(Action::Cancel, "TA_2").await.unwrap().state,
        TaskState::Cancelled
    );
}

#[tokio::test]
async fn test_shutdown_with_nothing_running() {
    let harness = create_test_snapshotter().await;
    let mut events = harness.snapshotter.subscribe();

    harness.snapshotter.shutdown().await.unwrap();

    assert!(matches!(drain(&mut events).as_slice(), [Event::Shutdown]));
}
