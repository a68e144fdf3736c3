//! Common test utilities for snapshot-task end-to-end tests

use snapshot_task::{Action, Config, EntityEndpoint, Snapshotter, Task, TaskRequest, TaskState};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Release every test task belongs to
pub const RELEASE: &str = "RE_1";

/// Config pointing both upstreams at `server` and storing under `dir`
///
/// Two entities are crawled: `study` (fetched by id) and `participant`.
pub fn config_for(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config::default();
    config.data_source.base_url = server.uri();
    config.coordinator.base_url = server.uri();
    config.data_source.entities = vec![
        EntityEndpoint::new("study", "/studies"),
        EntityEndpoint::new("participant", "/participants"),
    ];
    config.data_source.page_size = 2;
    config.scrape.request_timeout = Duration::from_secs(5);
    config.persistence.database_path = dir.join("tasks.db");
    config.publish.object_store_dir = dir.join("snapshots");
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    config
}

/// Mount a release with one study (`SD_1`, three participants over two pages)
pub async fn mount_release(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/releases/RE_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "kf_id": RELEASE,
            "studies": ["SD_1"]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/studies/SD_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": {"kf_id": "SD_1", "name": "Study One"},
            "_links": {}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/participants"))
        .and(query_param("study_id", "SD_1"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"kf_id": "PT_1"}, {"kf_id": "PT_2"}],
            "_links": {"next": "/participants?study_id=SD_1&limit=2&page=2"}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/participants"))
        .and(query_param("study_id", "SD_1"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"kf_id": "PT_3"}],
            "_links": {}
        })))
        .mount(server)
        .await;
}

/// Submit `action` for `task_id` against [`RELEASE`]
pub async fn submit(snapshotter: &Snapshotter, action: Action, task_id: &str) -> Task {
    snapshotter
        .submit(TaskRequest::new(action, task_id, RELEASE))
        .await
        .unwrap()
}

/// Poll `get_status` until the task reaches `state` (panics after 10 seconds)
pub async fn wait_for_state(snapshotter: &Snapshotter, task_id: &str, state: TaskState) -> Task {
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let task = submit(snapshotter, Action::GetStatus, task_id).await;
            if task.state == state {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    match result {
        Ok(task) => task,
        Err(_) => panic!("task {task_id} never reached {state}"),
    }
}
