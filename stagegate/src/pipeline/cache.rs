//! Idempotent output cache keyed by an input fingerprint.
//!
//! Identical producer inputs return the previously produced output without
//! invoking the producer again. The fingerprint covers the producer name and
//! version, the stage, the rendered task, and the state entries prefixed
//! with `<stage>.` (not the whole state).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::ProducerOutput;
use crate::state::StateSnapshot;

/// The inputs a cached output is keyed by.
#[derive(Debug, Clone, Copy)]
pub struct CacheQuery<'a> {
    /// Producer name.
    pub producer: &'a str,
    /// Producer version.
    pub version: &'a str,
    /// Stage name.
    pub stage: &'a str,
    /// Rendered task.
    pub task: &'a str,
    /// Current state.
    pub state: &'a StateSnapshot,
}

impl CacheQuery<'_> {
    /// SHA-256 hex fingerprint of the query.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let prefix = format!("{}.", self.stage);
        let context: serde_json::Map<String, serde_json::Value> = self
            .state
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // serde_json maps are ordered, so the encoding is canonical
        let raw = serde_json::json!({
            "a": self.producer,
            "v": self.version,
            "s": self.stage,
            "t": self.task,
            "c": context,
        });
        hex::encode(Sha256::digest(raw.to_string().as_bytes()))
    }
}

/// A cached producer output in its stored JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedOutput {
    /// The serialized [`ProducerOutput`], byte-identical to what was stored.
    pub payload: String,
    /// Unix milliseconds at insertion.
    pub created_at: i64,
}

impl CachedOutput {
    /// Decodes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid `ProducerOutput`.
    pub fn decode(&self) -> Result<ProducerOutput, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Concurrent in-memory output cache.
#[derive(Debug, Default)]
pub struct OutputCache {
    entries: DashMap<String, CachedOutput>,
}

impl OutputCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the output stored for `query`.
    #[must_use]
    pub fn get(&self, query: &CacheQuery<'_>) -> Option<CachedOutput> {
        self.entries
            .get(&query.fingerprint())
            .map(|entry| entry.value().clone())
    }

    /// Stores `output` for `query`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be serialized.
    pub fn put(&self, query: &CacheQuery<'_>, output: &ProducerOutput) -> Result<(), serde_json::Error> {
        let payload = serde_json::to_string(output)?;
        self.entries.insert(
            query.fingerprint(),
            CachedOutput {
                payload,
                created_at: crate::utils::now_millis(),
            },
        );
        Ok(())
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
