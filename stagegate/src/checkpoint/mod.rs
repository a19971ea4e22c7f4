//! Durable checkpoints for resuming runs.
//!
//! One [`Checkpoint`] is written per completed step under a
//! [`CheckpointKey`] of `(run_id, step)`. Re-saving a key supersedes the
//! previous checkpoint. Three backends implement [`CheckpointStore`]:
//!
//! - [`InMemoryCheckpointStore`] for tests and ephemeral runs
//! - [`FileCheckpointStore`], one JSON file per key
//! - `SqliteCheckpointStore` (feature `sqlite`), one row per key

mod file;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use file::FileCheckpointStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub use crate::errors::CheckpointError;
use crate::state::StateSnapshot;

/// Identifies one checkpoint: a run and a step index within it.
///
/// Rendered as `run_id:step`. Backends adapt it to their own storage layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckpointKey {
    /// The run identifier.
    pub run_id: String,
    /// Zero-based step index.
    pub step: u64,
}

impl CheckpointKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(run_id: impl Into<String>, step: u64) -> Self {
        Self {
            run_id: run_id.into(),
            step,
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.run_id, self.step)
    }
}

impl FromStr for CheckpointKey {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (run_id, step) = s
            .rsplit_once(':')
            .ok_or_else(|| CheckpointError::InvalidKey(s.to_string()))?;
        if run_id.is_empty() {
            return Err(CheckpointError::InvalidKey(s.to_string()));
        }
        let step = step
            .parse()
            .map_err(|_| CheckpointError::InvalidKey(s.to_string()))?;
        Ok(Self::new(run_id, step))
    }
}

/// Snapshot of the run state after one completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The run this checkpoint belongs to.
    pub run_id: String,
    /// The step index.
    pub step: u64,
    /// The stage executed at this step.
    pub stage: String,
    /// Full state after the step.
    pub state_snapshot: StateSnapshot,
    /// Unix milliseconds when the checkpoint was taken.
    pub timestamp_millis: i64,
    /// Free-form step details (duration, attempts, mode, summary).
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        step: u64,
        stage: impl Into<String>,
        state_snapshot: StateSnapshot,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step,
            stage: stage.into(),
            state_snapshot,
            timestamp_millis: crate::utils::now_millis(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds an extra field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp_millis(mut self, millis: i64) -> Self {
        self.timestamp_millis = millis;
        self
    }

    /// The key this checkpoint is naturally stored under.
    #[must_use]
    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(self.run_id.clone(), self.step)
    }
}

/// Persistence backend for checkpoints.
///
/// Implementations must tolerate concurrent saves of different keys.
#[async_trait]
pub trait CheckpointStore: Send + Sync + fmt::Debug {
    /// Persists `checkpoint` under `key`, replacing any previous one.
    async fn save(&self, key: &CheckpointKey, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Loads the checkpoint under `key`; `Ok(None)` if absent.
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Returns the key with the highest step for `run_id`.
    async fn find_last_key(&self, run_id: &str) -> Result<Option<CheckpointKey>, CheckpointError>;

    /// Returns the key for `(run_id, step)` if a checkpoint exists there.
    async fn find_key(&self, run_id: &str, step: u64) -> Result<Option<CheckpointKey>, CheckpointError> {
        let key = CheckpointKey::new(run_id, step);
        Ok(self.load(&key).await?.map(|_| key))
    }
}

/// Checkpoint store held in process memory.
///
/// Checkpoints are kept in their JSON form so the store behaves like the
/// durable backends with respect to serialization.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: Mutex<HashMap<CheckpointKey, String>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All keys for `run_id`, in step order.
    #[must_use]
    pub fn keys_for_run(&self, run_id: &str) -> Vec<CheckpointKey> {
        let mut keys: Vec<_> = self
            .entries
            .lock()
            .keys()
            .filter(|k| k.run_id == run_id)
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, key: &CheckpointKey, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_string(checkpoint)?;
        self.entries.lock().insert(key.clone(), json);
        Ok(())
    }

    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, CheckpointError> {
        let raw = self.entries.lock().get(key).cloned();
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CheckpointError::from)
    }

    async fn find_last_key(&self, run_id: &str) -> Result<Option<CheckpointKey>, CheckpointError> {
        Ok(self
            .entries
            .lock()
            .keys()
            .filter(|k| k.run_id == run_id)
            .max_by_key(|k| k.step)
            .cloned())
    }
}
