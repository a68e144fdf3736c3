//! Configuration types for snapshot-task

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// One entry of the entity registry: entity name → data service path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEndpoint {
    /// Entity name (used as the snapshot key and artifact name)
    pub name: String,

    /// Path on the data service, relative to its base URL (e.g., "/participants")
    pub path: String,
}

impl EntityEndpoint {
    /// Create a registry entry
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Data service settings and the entity registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Base URL of the data service (default: "http://localhost:5000")
    #[serde(default = "default_data_service_url")]
    pub base_url: String,

    /// Records requested per page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Entities crawled for every study, in crawl order
    #[serde(default = "default_entities")]
    pub entities: Vec<EntityEndpoint>,

    /// Entity that defines a partition; fetched by id instead of filtered (default: "study")
    #[serde(default = "default_primary_entity")]
    pub primary_entity: Option<String>,

    /// Query parameter used to scope a crawl to one study (default: "study_id")
    #[serde(default = "default_partition_param")]
    pub partition_param: String,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_service_url(),
            page_size: default_page_size(),
            entities: default_entities(),
            primary_entity: default_primary_entity(),
            partition_param: default_partition_param(),
        }
    }
}

/// Coordinator settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Base URL of the release coordinator (default: "http://localhost:5001")
    #[serde(default = "default_coordinator_url")]
    pub base_url: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_coordinator_url(),
        }
    }
}

/// Crawl concurrency and timeouts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Maximum crawls in flight per task (default: 8)
    #[serde(default = "default_max_concurrent_crawls")]
    pub max_concurrent_crawls: usize,

    /// Timeout for each page fetch and coordinator/object store call (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_crawls: default_max_concurrent_crawls(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Shape of the published artifacts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishLayout {
    /// One JSON object per (study, entity): `{release}/{study}/{entity}`
    #[default]
    PerEntity,
    /// One ZIP archive for the whole release: `{release}`
    Bundle,
}

/// Publishing settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Artifact layout (default: per_entity)
    #[serde(default)]
    pub layout: PublishLayout,

    /// Root directory of the filesystem object store (default: "snapshots")
    #[serde(default = "default_object_store_dir")]
    pub object_store_dir: PathBuf,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            layout: PublishLayout::default(),
            object_store_dir: default_object_store_dir(),
        }
    }
}

/// Task persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "snapshot-task.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for the Snapshotter
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data service and entity registry
    #[serde(default)]
    pub data_source: DataSourceConfig,

    /// Release coordinator
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Crawl concurrency and timeouts
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Artifact layout and storage
    #[serde(default)]
    pub publish: PublishConfig,

    /// Task store
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Check the configuration for values the snapshotter cannot run with
    pub fn validate(&self) -> Result<()> {
        let ds = &self.data_source;

        if ds.entities.is_empty() {
            return Err(config_error(
                "entity registry must not be empty",
                "data_source.entities",
            ));
        }
        if ds.page_size == 0 {
            return Err(config_error(
                "page_size must be greater than zero",
                "data_source.page_size",
            ));
        }
        if let Some(primary) = &ds.primary_entity
            && !ds.entities.iter().any(|e| &e.name == primary)
        {
            return Err(config_error(
                format!("primary entity '{}' is not in the registry", primary),
                "data_source.primary_entity",
            ));
        }
        if self.scrape.max_concurrent_crawls == 0 {
            return Err(config_error(
                "max_concurrent_crawls must be greater than zero",
                "scrape.max_concurrent_crawls",
            ));
        }

        for (url, key) in [
            (&ds.base_url, "data_source.base_url"),
            (&self.coordinator.base_url, "coordinator.base_url"),
        ] {
            url::Url::parse(url)
                .map_err(|e| config_error(format!("invalid URL '{}': {}", url, e), key))?;
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_data_service_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_coordinator_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_entities() -> Vec<EntityEndpoint> {
    [
        ("study", "/studies"),
        ("participant", "/participants"),
        ("family_relationship", "/family-relationships"),
        ("diagnosis", "/diagnoses"),
        ("phenotype", "/phenotypes"),
        ("outcome", "/outcomes"),
        ("biospecimen", "/biospecimens"),
        ("genomic_file", "/genomic-files"),
        ("sequencing_experiment", "/sequencing-experiments"),
    ]
    .into_iter()
    .map(|(name, path)| EntityEndpoint::new(name, path))
    .collect()
}

fn default_primary_entity() -> Option<String> {
    Some("study".to_string())
}

fn default_partition_param() -> String {
    "study_id".to_string()
}

fn default_max_concurrent_crawls() -> usize {
    8
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_object_store_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("snapshot-task.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.data_source.page_size, 100);
        assert_eq!(config.data_source.primary_entity.as_deref(), Some("study"));
        assert_eq!(config.data_source.entities[1].path, "/participants");
        assert_eq!(config.scrape.request_timeout, Duration::from_secs(30));
        assert_eq!(config.publish.layout, PublishLayout::PerEntity);
    }

    #[test]
    fn layout_and_timeout_deserialize_from_json() {
        let config: Config = serde_json::from_str(
            r#"{
                "scrape": { "request_timeout": 5, "max_concurrent_crawls": 2 },
                "publish": { "layout": "bundle", "object_store_dir": "/tmp/out" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.scrape.request_timeout, Duration::from_secs(5));
        assert_eq!(config.scrape.max_concurrent_crawls, 2);
        assert_eq!(config.publish.layout, PublishLayout::Bundle);
        assert_eq!(config.publish.object_store_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn validate_rejects_unusable_values() {
        let cases: Vec<(Box<dyn Fn(&mut Config)>, &str)> = vec![
            (
                Box::new(|c| c.data_source.entities.clear()),
                "data_source.entities",
            ),
            (
                Box::new(|c| c.data_source.page_size = 0),
                "data_source.page_size",
            ),
            (
                Box::new(|c| c.data_source.primary_entity = Some("sample".into())),
                "data_source.primary_entity",
            ),
            (
                Box::new(|c| c.scrape.max_concurrent_crawls = 0),
                "scrape.max_concurrent_crawls",
            ),
            (
                Box::new(|c| c.coordinator.base_url = "not a url".into()),
                "coordinator.base_url",
            ),
        ];

        for (mutate, expected_key) in cases {
            let mut config = Config::default();
            mutate(&mut config);
            match config.validate() {
                Err(Error::Config { key, .. }) => {
                    assert_eq!(key.as_deref(), Some(expected_key));
                }
                other => panic!("expected config error for {expected_key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn primary_entity_may_be_disabled() {
        let mut config = Config::default();
        config.data_source.primary_entity = None;
        config.validate().unwrap();
    }
}
