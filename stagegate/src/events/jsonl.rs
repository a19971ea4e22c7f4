//! Append-only JSON Lines event log.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::EventSink;
use crate::utils::iso_timestamp;

/// Writes one JSON object per line: `{"ts": ..., "event": ..., ...payload}`.
///
/// Object payloads are flattened into the record; other payloads are stored
/// under `data`. Write failures are logged and dropped.
///
/// [`emit`](EventSink::emit) writes on the blocking pool so runtime workers
/// never wait on the disk. [`try_emit`](EventSink::try_emit) writes inline.
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl JsonlEventSink {
    /// Opens `path` for appending, creating it and its parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// The log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(event_type: &str, data: Option<serde_json::Value>) -> serde_json::Value {
        let mut record = serde_json::Map::new();
        record.insert("ts".to_string(), serde_json::json!(iso_timestamp()));
        record.insert("event".to_string(), serde_json::json!(event_type));
        match data {
            Some(serde_json::Value::Object(fields)) => {
                for (k, v) in fields {
                    record.entry(k).or_insert(v);
                }
            }
            Some(other) => {
                record.insert("data".to_string(), other);
            }
            None => {}
        }
        serde_json::Value::Object(record)
    }

    fn line(event_type: &str, data: Option<serde_json::Value>) -> String {
        let mut line = Self::record(event_type, data).to_string();
        line.push('\n');
        line
    }

    fn write_line(file: &Mutex<File>, path: &Path, line: &str) {
        let result = {
            let mut file = file.lock();
            file.write_all(line.as_bytes()).and_then(|()| file.flush())
        };
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to append event");
        }
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        let line = Self::line(event_type, data);
        let file = Arc::clone(&self.file);
        let path = self.path.clone();
        let written = tokio::task::spawn_blocking(move || Self::write_line(&file, &path, &line)).await;
        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), error = %e, "Event write task failed");
        }
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        Self::write_line(&self.file, &self.path, &Self::line(event_type, data));
    }
}
