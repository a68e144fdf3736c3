//! Release coordinator clients.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Coordinator, build_client, request_error};
use crate::error::{Result, UpstreamError};
use crate::types::{Release, TaskId, TaskPatch};

/// Coordinator reached over HTTP
///
/// - `GET {base}/releases/{release_id}` returns `{"studies": [...]}`
/// - `PATCH {base}/releases/{release_id}/tasks/{task_id}` takes a [`TaskPatch`]
pub struct HttpCoordinator {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpCoordinator {
    /// Create a client for the coordinator at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn release_url(&self, release_id: &str) -> String {
        format!(
            "{}/releases/{}",
            self.base_url,
            urlencoding::encode(release_id)
        )
    }
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn get_release(&self, release_id: &str) -> Result<Release> {
        let url = self.release_url(release_id);
        let operation = format!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(e, &operation, self.timeout, UpstreamError::Coordinator))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Coordinator(format!(
                "{} returned {}",
                operation,
                response.status()
            ))
            .into());
        }

        response.json::<Release>().await.map_err(|e| {
            UpstreamError::Coordinator(format!("invalid release body from {}: {}", operation, e))
                .into()
        })
    }

    async fn patch_task(
        &self,
        release_id: &str,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<()> {
        let url = format!(
            "{}/tasks/{}",
            self.release_url(release_id),
            urlencoding::encode(task_id.as_str())
        );
        let operation = format!("PATCH {}", url);

        let response = self
            .client
            .patch(&url)
            .json(patch)
            .send()
            .await
            .map_err(|e| request_error(e, &operation, self.timeout, UpstreamError::Coordinator))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Coordinator(format!(
                "{} returned {}: {}",
                operation, status, body
            ))
            .into());
        }

        tracing::debug!(
            release_id,
            task_id = %task_id,
            state = %patch.state,
            "coordinator acknowledged task patch"
        );
        Ok(())
    }
}

/// In-memory [`Coordinator`]
///
/// Serves releases registered with [`MemoryCoordinator::insert_release`] and
/// records every patch it accepts.
#[derive(Default)]
pub struct MemoryCoordinator {
    releases: Mutex<HashMap<String, Release>>,
    patches: Mutex<Vec<(String, TaskId, TaskPatch)>>,
    patch_failure: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryCoordinator {
    /// Create a coordinator that knows no releases
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release and its studies
    pub fn insert_release(&self, release_id: impl Into<String>, studies: Vec<String>) {
        lock(&self.releases).insert(release_id.into(), Release { studies });
    }

    /// Reject every following patch with `message`
    pub fn fail_patches(&self, message: impl Into<String>) {
        *lock(&self.patch_failure) = Some(message.into());
    }

    /// Patches accepted so far, in order
    pub fn patches(&self) -> Vec<(String, TaskId, TaskPatch)> {
        lock(&self.patches).clone()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn get_release(&self, release_id: &str) -> Result<Release> {
        lock(&self.releases).get(release_id).cloned().ok_or_else(|| {
            UpstreamError::Coordinator(format!("release {} not found", release_id)).into()
        })
    }

    async fn patch_task(
        &self,
        release_id: &str,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<()> {
        if let Some(message) = lock(&self.patch_failure).clone() {
            return Err(UpstreamError::Coordinator(message).into());
        }
        lock(&self.patches).push((release_id.to_string(), task_id.clone(), patch.clone()));
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::types::TaskState;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn coordinator(server: &MockServer) -> HttpCoordinator {
        HttpCoordinator::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn get_release_decodes_studies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/releases/RE_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kf_id": "RE_1",
                "studies": ["SD_1", "SD_2"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let release = coordinator(&server).get_release("RE_1").await.unwrap();
        assert_eq!(release.studies, vec!["SD_1", "SD_2"]);
    }

    #[tokio::test]
    async fn patch_task_sends_progress_and_state() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/releases/RE_1/tasks/TA_1"))
            .and(body_json(serde_json::json!({"progress": 100, "state": "published"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        coordinator(&server)
            .patch_task(
                "RE_1",
                &TaskId::from("TA_1"),
                &TaskPatch {
                    progress: Some(100),
                    state: TaskState::Published,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_coordinator_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = coordinator(&server)
            .patch_task(
                "RE_1",
                &TaskId::from("TA_1"),
                &TaskPatch {
                    progress: Some(100),
                    state: TaskState::Staged,
                },
            )
            .await
            .unwrap_err();

        match err {
            Error::Upstream(UpstreamError::Coordinator(msg)) => {
                assert!(msg.contains("503"), "{msg}");
                assert!(msg.contains("maintenance"), "{msg}");
            }
            other => panic!("expected coordinator error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn memory_coordinator_records_patches() {
        let coordinator = MemoryCoordinator::new();
        coordinator.insert_release("RE_1", vec!["SD_1".into()]);

        assert_eq!(
            coordinator.get_release("RE_1").await.unwrap().studies,
            vec!["SD_1"]
        );
        assert!(coordinator.get_release("RE_2").await.is_err());

        let patch = TaskPatch {
            progress: Some(100),
            state: TaskState::Staged,
        };
        coordinator
            .patch_task("RE_1", &TaskId::from("TA_1"), &patch)
            .await
            .unwrap();
        assert_eq!(coordinator.patches().len(), 1);

        coordinator.fail_patches("down");
        assert!(
            coordinator
                .patch_task("RE_1", &TaskId::from("TA_1"), &patch)
                .await
                .is_err()
        );
        assert_eq!(coordinator.patches().len(), 1);
    }

    #[tokio::test]
    async fn slow_coordinator_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"studies": []}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = HttpCoordinator::new(server.uri(), Duration::from_millis(200)).unwrap();
        let err = client.get_release("RE_1").await.unwrap_err();
        assert!(
            matches!(err, Error::Upstream(UpstreamError::Timeout { .. })),
            "got {err:?}"
        );
    }
}
