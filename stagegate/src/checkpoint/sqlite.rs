//! SQLite checkpoint backend.
//!
//! One row per `(run_id, step_index)`, upserted on save. The connection
//! lives behind a mutex and every call runs on tokio's blocking pool so
//! SQLite I/O never stalls async workers.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use super::{Checkpoint, CheckpointError, CheckpointKey, CheckpointStore};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS checkpoints (
        run_id        TEXT NOT NULL,
        step_index    INTEGER NOT NULL,
        stage         TEXT NOT NULL,
        created_at    INTEGER NOT NULL,
        memory_json   TEXT NOT NULL,
        extra_json    TEXT NOT NULL,
        PRIMARY KEY (run_id, step_index)
    );
    CREATE INDEX IF NOT EXISTS idx_checkpoints_runid_created
        ON checkpoints (run_id, created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_checkpoints_stage
        ON checkpoints (stage);
";

/// Checkpoint store backed by a SQLite database in WAL mode.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, CheckpointError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CheckpointError> {
        // in-memory databases report "memory" and keep their own mode
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "Opened checkpoint database");
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<F, R>(&self, f: F) -> Result<R, CheckpointError>
    where
        F: FnOnce(&Connection) -> Result<R, CheckpointError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| CheckpointError::Worker(e.to_string()))?
    }

    /// Keys of the checkpoints of `run_id` that executed `stage`, in step
    /// order.
    pub async fn find_by_stage(
        &self,
        run_id: &str,
        stage: &str,
    ) -> Result<Vec<CheckpointKey>, CheckpointError> {
        let run = run_id.to_string();
        let stage = stage.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT step_index FROM checkpoints
                 WHERE run_id = ?1 AND stage = ?2
                 ORDER BY step_index ASC",
            )?;
            let steps = stmt
                .query_map(params![run, stage], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys_from_steps(&run, steps))
        })
        .await
    }

    /// Keys of the checkpoints of `run_id` created within
    /// `[start_ms, end_ms]`, in step order.
    pub async fn find_by_date_range(
        &self,
        run_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<CheckpointKey>, CheckpointError> {
        let run = run_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT step_index FROM checkpoints
                 WHERE run_id = ?1 AND created_at BETWEEN ?2 AND ?3
                 ORDER BY step_index ASC",
            )?;
            let steps = stmt
                .query_map(params![run, start_ms, end_ms], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys_from_steps(&run, steps))
        })
        .await
    }
}

fn keys_from_steps(run_id: &str, steps: Vec<i64>) -> Vec<CheckpointKey> {
    steps
        .into_iter()
        .filter_map(|step| u64::try_from(step).ok())
        .map(|step| CheckpointKey::new(run_id, step))
        .collect()
}

fn step_index(key: &CheckpointKey) -> Result<i64, CheckpointError> {
    i64::try_from(key.step).map_err(|_| CheckpointError::InvalidKey(key.to_string()))
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, key: &CheckpointKey, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let run_id = key.run_id.clone();
        let step = step_index(key)?;
        let stage = checkpoint.stage.clone();
        let created_at = checkpoint.timestamp_millis;
        let memory_json = serde_json::to_string(&checkpoint.state_snapshot)?;
        let extra_json = serde_json::to_string(&checkpoint.extra)?;

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (run_id, step_index, stage, created_at, memory_json, extra_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(run_id, step_index) DO UPDATE SET
                     stage = excluded.stage,
                     created_at = excluded.created_at,
                     memory_json = excluded.memory_json,
                     extra_json = excluded.extra_json",
                params![run_id, step, stage, created_at, memory_json, extra_json],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, CheckpointError> {
        let run_id = key.run_id.clone();
        let step = step_index(key)?;
        let key_step = key.step;

        let row = self
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT stage, created_at, memory_json, extra_json
                         FROM checkpoints WHERE run_id = ?1 AND step_index = ?2",
                        params![run_id, step],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, i64>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((stage, created_at, memory_json, extra_json)) = row else {
            return Ok(None);
        };
        Ok(Some(Checkpoint {
            run_id: key.run_id.clone(),
            step: key_step,
            stage,
            state_snapshot: serde_json::from_str(&memory_json)?,
            timestamp_millis: created_at,
            extra: serde_json::from_str(&extra_json)?,
        }))
    }

    async fn find_last_key(&self, run_id: &str) -> Result<Option<CheckpointKey>, CheckpointError> {
        let run = run_id.to_string();
        let step = self
            .call(move |conn| {
                let step = conn
                    .query_row(
                        "SELECT step_index FROM checkpoints
                         WHERE run_id = ?1 ORDER BY step_index DESC LIMIT 1",
                        params![run],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                Ok(step)
            })
            .await?;
        Ok(step
            .and_then(|s| u64::try_from(s).ok())
            .map(|s| CheckpointKey::new(run_id, s)))
    }

    async fn find_key(&self, run_id: &str, step: u64) -> Result<Option<CheckpointKey>, CheckpointError> {
        let key = CheckpointKey::new(run_id, step);
        let run = run_id.to_string();
        let index = step_index(&key)?;
        let exists = self
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM checkpoints WHERE run_id = ?1 AND step_index = ?2",
                        params![run, index],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(exists.then_some(key))
    }
}
