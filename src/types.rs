//! Core types for snapshot-task

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::error::Error;

/// A single upstream record, kept as the data service returned it
pub type Record = serde_json::Value;

/// Identifier of a partition (study) within a release
pub type PartitionId = String;

/// Unique identifier for a snapshot task (assigned by the coordinator)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Stored as TEXT in SQLite
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Snapshot task state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Initialized, waiting for `start`
    Pending,
    /// Crawling the data service
    Running,
    /// Snapshot assembled, waiting for `publish`
    Staged,
    /// Uploading artifacts and confirming with the coordinator
    Publishing,
    /// Artifacts uploaded and confirmed
    Published,
    /// Cancel requested, in-flight work being stopped
    Cancelling,
    /// Cancelled by request
    Cancelled,
    /// A phase failed; see `Task::error`
    Failed,
}

impl TaskState {
    /// Every state, in lifecycle order
    pub const ALL: [TaskState; 8] = [
        TaskState::Pending,
        TaskState::Running,
        TaskState::Staged,
        TaskState::Publishing,
        TaskState::Published,
        TaskState::Cancelling,
        TaskState::Cancelled,
        TaskState::Failed,
    ];

    /// Lowercase name used in storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Staged => "staged",
            TaskState::Publishing => "publishing",
            TaskState::Published => "published",
            TaskState::Cancelling => "cancelling",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        }
    }

    /// Whether an asynchronous phase is attached to this state
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Running | TaskState::Publishing)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown task state '{}'", s))
    }
}

/// Action submitted against a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create the task in `pending`
    Initialize,
    /// Crawl the data service into a snapshot
    Start,
    /// Archive and publish a staged snapshot
    Publish,
    /// Read the current task view
    GetStatus,
    /// Stop the task
    Cancel,
}

impl Action {
    /// Every action, in the order reported to clients
    pub const ALL: [Action; 5] = [
        Action::Initialize,
        Action::Start,
        Action::Publish,
        Action::GetStatus,
        Action::Cancel,
    ];

    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Initialize => "initialize",
            Action::Start => "start",
            Action::Publish => "publish",
            Action::GetStatus => "get_status",
            Action::Cancel => "cancel",
        }
    }

    /// Comma-separated list of valid action names
    pub fn valid_actions() -> String {
        Action::ALL
            .iter()
            .map(Action::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether this action may be applied to a task in `current` state
    ///
    /// `None` is the virtual "absent" state of a task that was never initialized.
    pub fn is_permitted_in(&self, current: Option<TaskState>) -> bool {
        match (self, current) {
            (Action::Initialize, None) => true,
            (Action::Start, Some(TaskState::Pending)) => true,
            (Action::Publish, Some(TaskState::Staged)) => true,
            (Action::GetStatus, Some(_)) => true,
            (Action::Cancel, Some(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::UnknownAction {
                action: s.to_string(),
                valid: Action::valid_actions(),
            })
    }
}

/// Inbound task request, as received from the coordinator
///
/// Fields are optional so that missing values surface as validation errors
/// rather than deserialization failures.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct TaskRequest {
    /// Action name (see [`Action`])
    #[serde(default)]
    pub action: Option<String>,
    /// Task identifier
    #[serde(default)]
    pub task_id: Option<String>,
    /// Release identifier
    #[serde(default)]
    pub release_id: Option<String>,
}

impl TaskRequest {
    /// Build a request from its three parts
    pub fn new(action: Action, task_id: impl Into<String>, release_id: impl Into<String>) -> Self {
        Self {
            action: Some(action.as_str().to_string()),
            task_id: Some(task_id.into()),
            release_id: Some(release_id.into()),
        }
    }
}

/// Persisted view of a snapshot task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Unique task identifier
    pub task_id: TaskId,
    /// Release this task snapshots
    pub release_id: String,
    /// Display name
    pub name: String,
    /// When the task was initialized
    pub date_submitted: DateTime<Utc>,
    /// Progress percentage (0-100), absent before the scrape starts
    pub progress: Option<u8>,
    /// Current state
    pub state: TaskState,
    /// Diagnostic from the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Display name given to every task on initialization
pub const TASK_NAME: &str = "Snapshot Task";

impl Task {
    /// A freshly initialized task in `pending`
    pub fn new(task_id: TaskId, release_id: impl Into<String>) -> Self {
        Self {
            task_id,
            release_id: release_id.into(),
            name: TASK_NAME.to_string(),
            // Millisecond precision, as stored
            date_submitted: Utc::now().trunc_subsecs(3),
            progress: None,
            state: TaskState::Pending,
            error: None,
        }
    }
}

/// Release metadata returned by the coordinator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Studies (partitions) included in the release
    #[serde(default, alias = "partitions")]
    pub studies: Vec<PartitionId>,
}

/// Progress report sent to the coordinator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Progress percentage
    pub progress: Option<u8>,
    /// State reported to the coordinator
    pub state: TaskState,
}

/// The per-task aggregate: partition → entity → ordered records
///
/// Entries are keyed by (partition, entity); each key is written once by the
/// aggregator's collector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    partitions: BTreeMap<PartitionId, BTreeMap<String, Vec<Record>>>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the records of one (partition, entity) pair
    pub fn insert(&mut self, partition: &str, entity: &str, records: Vec<Record>) {
        self.partitions
            .entry(partition.to_string())
            .or_default()
            .insert(entity.to_string(), records);
    }

    /// Records for one (partition, entity) pair
    pub fn get(&self, partition: &str, entity: &str) -> Option<&[Record]> {
        self.partitions
            .get(partition)
            .and_then(|entities| entities.get(entity))
            .map(Vec::as_slice)
    }

    /// Number of populated (partition, entity) entries
    pub fn len(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    /// Whether no entries are populated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Partition identifiers in order
    pub fn partitions(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }

    /// Every (partition, entity, records) entry in key order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &[Record])> {
        self.partitions.iter().flat_map(|(partition, entities)| {
            entities.iter().map(move |(entity, records)| {
                (partition.as_str(), entity.as_str(), records.as_slice())
            })
        })
    }

    /// Total number of records across all entries
    pub fn record_count(&self) -> usize {
        self.entries().map(|(_, _, records)| records.len()).sum()
    }
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task created in `pending`
    TaskInitialized {
        /// Task ID
        task_id: TaskId,
        /// Release ID
        release_id: String,
    },

    /// Task state written to the store
    StateChanged {
        /// Task ID
        task_id: TaskId,
        /// New state
        state: TaskState,
    },

    /// One (partition, entity) crawl finished
    CrawlComplete {
        /// Task ID
        task_id: TaskId,
        /// Partition (study) ID
        partition: PartitionId,
        /// Entity name
        entity: String,
        /// Number of records collected
        records: usize,
    },

    /// Every entity of a partition has been crawled
    PartitionComplete {
        /// Task ID
        task_id: TaskId,
        /// Partition (study) ID
        partition: PartitionId,
    },

    /// Every partition has been crawled
    ScrapeComplete {
        /// Task ID
        task_id: TaskId,
        /// Number of populated (partition, entity) entries
        entries: usize,
        /// Total number of records
        records: usize,
    },

    /// An artifact was written to the object store
    ArtifactUploaded {
        /// Task ID
        task_id: TaskId,
        /// Object key
        key: String,
        /// Artifact size in bytes
        size_bytes: u64,
    },

    /// Release artifacts uploaded and confirmed by the coordinator
    Published {
        /// Task ID
        task_id: TaskId,
        /// Release ID
        release_id: String,
    },

    /// A phase failed
    Failed {
        /// Task ID
        task_id: TaskId,
        /// Error message
        error: String,
    },

    /// Task cancelled
    Cancelled {
        /// Task ID
        task_id: TaskId,
    },

    /// Service shutting down
    Shutdown,
}
