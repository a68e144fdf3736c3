use crate::db::*;
use crate::store::TaskStore;
use crate::types::{Task, TaskId};
use tempfile::NamedTempFile;

/// Verify that querying the database after closing the pool returns an error
/// rather than hanging or panicking.
#[tokio::test]
async fn test_get_task_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let task = Task::new(TaskId::from("T1"), "R1");
    db.put(&task).await.unwrap();
    assert!(db.get(&task.task_id).await.unwrap().is_some());

    // Close the pool (but keep the Database struct alive)
    db.pool().close().await;

    let result = db.get(&task.task_id).await;
    assert!(
        result.is_err(),
        "get after pool close should return an error, got: {:?}",
        result
    );
}
