//! Flat-file checkpoint backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{Checkpoint, CheckpointError, CheckpointKey, CheckpointStore};
use crate::utils::encode_run_id;

/// Stores each checkpoint as `<root>/<run_id>__<step>.json`, with the run id
/// encoded by [`encode_run_id`].
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so a reader never observes a half-written checkpoint. Files that
/// cannot be parsed load as absent.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_stem_prefix(run_id: &str) -> String {
        format!("{}__", encode_run_id(run_id))
    }

    /// Path of the file backing `key`.
    #[must_use]
    pub fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.root
            .join(format!("{}{}.json", Self::file_stem_prefix(&key.run_id), key.step))
    }

    async fn steps_for_run(&self, run_id: &str) -> Result<Vec<u64>, CheckpointError> {
        let prefix = Self::file_stem_prefix(run_id);
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut steps = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let step = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(step) = step {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    /// Keys of every checkpoint stored for `run_id`, in step order.
    pub async fn list_keys(&self, run_id: &str) -> Result<Vec<CheckpointKey>, CheckpointError> {
        Ok(self
            .steps_for_run(run_id)
            .await?
            .into_iter()
            .map(|step| CheckpointKey::new(run_id, step))
            .collect())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, key: &CheckpointKey, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.path_for(key);
        let tmp = target.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4().simple()));

        let json = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&tmp, &json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable checkpoint file");
                return Ok(None);
            }
        };

        match serde_json::from_slice::<Checkpoint>(&bytes) {
            Ok(checkpoint) if checkpoint.run_id != key.run_id => {
                warn!(
                    path = %path.display(),
                    expected = %key.run_id,
                    found = %checkpoint.run_id,
                    "Checkpoint belongs to another run; ignored"
                );
                Ok(None)
            }
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt checkpoint file ignored");
                Ok(None)
            }
        }
    }

    async fn find_last_key(&self, run_id: &str) -> Result<Option<CheckpointKey>, CheckpointError> {
        Ok(self
            .steps_for_run(run_id)
            .await?
            .last()
            .map(|step| CheckpointKey::new(run_id, *step)))
    }

    async fn find_key(&self, run_id: &str, step: u64) -> Result<Option<CheckpointKey>, CheckpointError> {
        let key = CheckpointKey::new(run_id, step);
        let exists = tokio::fs::try_exists(self.path_for(&key)).await?;
        Ok(exists.then_some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::tests::sample;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_round_trip_and_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("cps"));
        let cp = sample("run-1", 4);

        store.save(&cp.key(), &cp).await.unwrap();

        assert!(dir.path().join("cps").join("run-1__4.json").exists());
        assert_eq!(store.load(&cp.key()).await.unwrap(), Some(cp));
    }

    #[tokio::test]
    async fn test_missing_root_and_key_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("never-created"));

        assert_eq!(store.load(&CheckpointKey::new("r", 0)).await.unwrap(), None);
        assert_eq!(store.find_last_key("r").await.unwrap(), None);
        assert_eq!(store.find_key("r", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_last_key_uses_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        for step in [1, 10, 2] {
            let cp = sample("r", step);
            store.save(&cp.key(), &cp).await.unwrap();
        }
        // a different run sharing the prefix must not match
        let other = sample("r__x", 99);
        store.save(&other.key(), &other).await.unwrap();

        assert_eq!(store.find_last_key("r").await.unwrap(), Some(CheckpointKey::new("r", 10)));
        assert_eq!(store.list_keys("r").await.unwrap().len(), 3);
        assert_eq!(store.find_key("r", 2).await.unwrap(), Some(CheckpointKey::new("r", 2)));
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let key = CheckpointKey::new("r", 0);
        std::fs::write(store.path_for(&key), b"{ not json").unwrap();

        assert_eq!(store.load(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_similar_run_ids_do_not_share_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let slash = sample("team/a", 5);
        store.save(&slash.key(), &slash).await.unwrap();
        let colon = sample("team:a", 1);
        store.save(&colon.key(), &colon).await.unwrap();

        assert_eq!(
            store.find_last_key("team:a").await.unwrap(),
            Some(CheckpointKey::new("team:a", 1))
        );
        assert_eq!(store.find_last_key("team_a").await.unwrap(), None);
        assert_eq!(store.load(&CheckpointKey::new("team:a", 5)).await.unwrap(), None);
        assert_eq!(store.load(&slash.key()).await.unwrap(), Some(slash));
    }

    #[tokio::test]
    async fn test_checkpoint_of_another_run_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let key = CheckpointKey::new("r", 0);
        let foreign = sample("other", 0);
        std::fs::write(store.path_for(&key), serde_json::to_vec(&foreign).unwrap()).unwrap();

        assert_eq!(store.load(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_saves_of_different_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCheckpointStore::new(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|step| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let cp = sample("r", step);
                    store.save(&cp.key(), &cp).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list_keys("r").await.unwrap().len(), 16);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
