//! Thread-safe key-value state shared by the stages of one run.

use parking_lot::Mutex;
use std::collections::BTreeMap;

/// An owned copy of the state at one point in time.
///
/// Ordered so snapshots serialize deterministically.
pub type StateSnapshot = BTreeMap<String, serde_json::Value>;

/// Key-value state guarded by a mutex.
///
/// Values are cloned on the way in and on the way out, so callers never hold
/// references into the store and later mutations cannot leak into snapshots
/// already taken.
#[derive(Debug, Default)]
pub struct StateStore {
    data: Mutex<StateSnapshot>,
}

impl StateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given values.
    #[must_use]
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            data: Mutex::new(snapshot),
        }
    }

    /// Returns a copy of the value at `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().get(key).cloned()
    }

    /// Returns the value at `key` if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Sets `key` to `value`, overwriting any previous value.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data.lock().insert(key.into(), value);
    }

    /// Applies every entry of `patch` under a single lock.
    pub fn update<I, K>(&self, patch: I)
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        let mut data = self.data.lock();
        for (key, value) in patch {
            data.insert(key.into(), value);
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().remove(key)
    }

    /// Returns a copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.data.lock().clone()
    }

    /// Replaces the whole state, as done when restoring a checkpoint.
    pub fn replace(&self, snapshot: StateSnapshot) {
        *self.data.lock() = snapshot;
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}
