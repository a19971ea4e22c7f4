//! Global resource budget.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Ceilings on a run's resource usage. Absent ceilings are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Maximum number of completed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stages: Option<u64>,
    /// Maximum total artifact bytes (names plus contents).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_artifact_bytes: Option<u64>,
    /// Maximum wall-clock runtime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime_seconds: Option<f64>,
}

impl Budget {
    /// Creates an unbounded budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage ceiling.
    #[must_use]
    pub fn with_max_stages(mut self, stages: u64) -> Self {
        self.max_stages = Some(stages);
        self
    }

    /// Sets the artifact byte ceiling.
    #[must_use]
    pub fn with_max_artifact_bytes(mut self, bytes: u64) -> Self {
        self.max_artifact_bytes = Some(bytes);
        self
    }

    /// Sets the runtime ceiling.
    #[must_use]
    pub fn with_max_runtime(mut self, runtime: Duration) -> Self {
        self.max_runtime_seconds = Some(runtime.as_secs_f64());
        self
    }

    /// Checks `stats` against every ceiling.
    ///
    /// Ceilings are checked in the order stages, artifact bytes, runtime;
    /// the first breach is reported.
    ///
    /// # Errors
    ///
    /// Returns the breached ceiling with its observed value.
    pub fn enforce(&self, stats: &BudgetStats) -> Result<(), BudgetExceeded> {
        if let Some(limit) = self.max_stages {
            if stats.stages > limit {
                return Err(BudgetExceeded::Stages {
                    observed: stats.stages,
                    limit,
                });
            }
        }
        if let Some(limit) = self.max_artifact_bytes {
            if stats.artifact_bytes > limit {
                return Err(BudgetExceeded::ArtifactBytes {
                    observed: stats.artifact_bytes,
                    limit,
                });
            }
        }
        if let Some(limit) = self.max_runtime_seconds {
            let observed = stats.runtime.as_secs_f64();
            if observed > limit {
                return Err(BudgetExceeded::Runtime { observed, limit });
            }
        }
        Ok(())
    }
}

/// Resource usage observed so far in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetStats {
    /// Completed stages.
    pub stages: u64,
    /// Accumulated artifact bytes.
    pub artifact_bytes: u64,
    /// Elapsed wall-clock time.
    pub runtime: Duration,
}

/// A budget ceiling was breached.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetExceeded {
    /// Too many completed stages.
    #[error("Stage budget exceeded: {observed} > {limit}")]
    Stages {
        /// Stages completed.
        observed: u64,
        /// The ceiling.
        limit: u64,
    },

    /// Too many artifact bytes.
    #[error("Artifacts size budget exceeded: {observed} > {limit}")]
    ArtifactBytes {
        /// Bytes accumulated.
        observed: u64,
        /// The ceiling.
        limit: u64,
    },

    /// Ran for too long.
    #[error("Runtime budget exceeded: {observed:.1}s > {limit}s")]
    Runtime {
        /// Seconds elapsed.
        observed: f64,
        /// The ceiling in seconds.
        limit: f64,
    },
}

impl BudgetExceeded {
    /// Name of the breached ceiling.
    #[must_use]
    pub const fn ceiling(&self) -> &'static str {
        match self {
            Self::Stages { .. } => "max_stages",
            Self::ArtifactBytes { .. } => "max_artifact_bytes",
            Self::Runtime { .. } => "max_runtime_seconds",
        }
    }
}
