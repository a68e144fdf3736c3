//! Object store implementations.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

use super::ObjectStore;
use crate::error::{Result, UpstreamError};

const PARTIAL_SUFFIX: &str = ".partial";

/// Object store backed by a local directory
///
/// Keys are `/`-separated relative paths under the root. Writes go to a
/// sibling `.partial` file and are renamed into place.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root` (created on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, rejecting keys that escape it
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(UpstreamError::ObjectStore(format!("invalid object key '{}'", key)).into());
        }
        Ok(self.root.join(relative))
    }
}

fn store_error(action: &str, key: &str, e: std::io::Error) -> crate::Error {
    UpstreamError::ObjectStore(format!("failed to {} '{}': {}", action, key, e)).into()
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_error("create directory for", key, e))?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|e| store_error("write", key, e))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| store_error("commit", key, e))?;

        tracing::debug!(key, content_type, size = bytes.len(), "object written");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let keys = tokio::task::spawn_blocking(move || {
            if !root.exists() {
                return Ok(Vec::new());
            }

            let mut keys = Vec::new();
            for entry in walkdir::WalkDir::new(&root) {
                let entry = entry.map_err(|e| {
                    UpstreamError::ObjectStore(format!("failed to list objects: {}", e))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) && !key.ends_with(PARTIAL_SUFFIX) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok::<_, UpstreamError>(keys)
        })
        .await
        .map_err(|e| UpstreamError::ObjectStore(format!("listing task failed: {}", e)))??;

        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        // A per-entity release is a directory named like its bundle key
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            return Ok(None);
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_error("read", key, e)),
        }
    }
}

/// In-memory [`ObjectStore`]
///
/// Keeps the content type of every object so callers can inspect it.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Content type recorded for `key`
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .read()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone()))
    }
}
