//! Snapshot publishing
//!
//! Serializes a staged snapshot into artifacts, writes every artifact to the
//! object store and only then tells the coordinator the task is published.
//! Nothing is rolled back when a step fails; the caller records the failure.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::clients::{Coordinator, ObjectStore};
use crate::config::PublishLayout;
use crate::error::Result;
use crate::types::{Event, Snapshot, TaskId, TaskPatch, TaskState};
use crate::utils::bounded;

/// MIME type of per-entity artifacts
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// MIME type of bundle artifacts
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// One object to write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Object store key
    pub key: String,
    /// Serialized content
    pub bytes: Vec<u8>,
    /// MIME type
    pub content_type: &'static str,
}

/// Object key of a per-entity artifact
pub fn entity_key(release_id: &str, partition: &str, entity: &str) -> String {
    format!("{}/{}/{}", release_id, partition, entity)
}

/// Object key of a bundle artifact
pub fn bundle_key(release_id: &str) -> String {
    release_id.to_string()
}

/// Serialize `snapshot` into the artifacts for `layout`
pub fn build_artifacts(
    release_id: &str,
    snapshot: &Snapshot,
    layout: PublishLayout,
) -> Result<Vec<Artifact>> {
    match layout {
        PublishLayout::PerEntity => snapshot
            .entries()
            .map(|(partition, entity, records)| -> Result<Artifact> {
                Ok(Artifact {
                    key: entity_key(release_id, partition, entity),
                    bytes: serde_json::to_vec(records)?,
                    content_type: JSON_CONTENT_TYPE,
                })
            })
            .collect(),
        PublishLayout::Bundle => {
            let files = snapshot
                .entries()
                .map(|(partition, entity, records)| -> Result<(String, Vec<u8>)> {
                    Ok((
                        format!("{}/{}.json", partition, entity),
                        serde_json::to_vec(records)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            let bytes = archive::pack(
                files
                    .iter()
                    .map(|(name, bytes)| (name.clone(), bytes.as_slice())),
            )?;
            Ok(vec![Artifact {
                key: bundle_key(release_id),
                bytes,
                content_type: ZIP_CONTENT_TYPE,
            }])
        }
    }
}

/// Release and task a publish is for
pub struct PublishContext<'a> {
    /// Task being published
    pub task_id: &'a TaskId,
    /// Release the artifacts belong to
    pub release_id: &'a str,
    /// Lifecycle event channel
    pub events: &'a broadcast::Sender<Event>,
    /// Cancelled when the task is cancelled or the service shuts down
    pub cancel: &'a CancellationToken,
}

/// Writes artifacts and confirms the release with the coordinator
pub struct Publisher {
    objects: Arc<dyn ObjectStore>,
    coordinator: Arc<dyn Coordinator>,
    layout: PublishLayout,
    timeout: Duration,
}

impl Publisher {
    /// Create a publisher
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        coordinator: Arc<dyn Coordinator>,
        layout: PublishLayout,
        timeout: Duration,
    ) -> Self {
        Self {
            objects,
            coordinator,
            layout,
            timeout,
        }
    }

    /// Upload every artifact, then patch the coordinator with `published`
    pub async fn publish(&self, ctx: PublishContext<'_>, snapshot: &Snapshot) -> Result<()> {
        let artifacts = build_artifacts(ctx.release_id, snapshot, self.layout)?;
        tracing::info!(
            task_id = %ctx.task_id,
            release_id = ctx.release_id,
            artifacts = artifacts.len(),
            layout = ?self.layout,
            "publishing snapshot"
        );

        for artifact in artifacts {
            let size_bytes = artifact.bytes.len() as u64;
            let operation = format!("upload {}", artifact.key);
            bounded(
                &operation,
                self.timeout,
                ctx.cancel,
                self.objects
                    .put(&artifact.key, artifact.bytes, artifact.content_type),
            )
            .await?;

            tracing::debug!(task_id = %ctx.task_id, key = %artifact.key, size_bytes, "artifact uploaded");
            ctx.events
                .send(Event::ArtifactUploaded {
                    task_id: ctx.task_id.clone(),
                    key: artifact.key,
                    size_bytes,
                })
                .ok();
        }

        let patch = TaskPatch {
            progress: Some(100),
            state: TaskState::Published,
        };
        bounded(
            "coordinator patch",
            self.timeout,
            ctx.cancel,
            self.coordinator
                .patch_task(ctx.release_id, ctx.task_id, &patch),
        )
        .await?;

        Ok(())
    }
}
