//! Run outcomes.

use serde::{Deserialize, Serialize};

use crate::errors::ReasonCode;
use crate::state::StateSnapshot;

/// Execution mode of a run, recorded in checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Stages run one after another in declaration order.
    Sequential,
    /// Independent stages run concurrently, wave by wave.
    Waves,
}

impl RunMode {
    /// Returns the wire representation of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Waves => "waves",
        }
    }
}

/// Summary of one executed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Stage name.
    pub stage: String,
    /// Producer name.
    pub producer: String,
    /// Reviewer name, or the council label.
    pub reviewer: String,
    /// Policy category; `default` when the stage has none.
    pub category: String,
    /// Whether the final attempt passed the review gate.
    pub approved: bool,
    /// Score of the final review, 0.0 if the stage never reached review.
    pub score: f64,
    /// Why the stage failed, if it did.
    #[serde(default)]
    pub error_reason: Option<ReasonCode>,
    /// Attempts made.
    pub attempts: u32,
    /// Attempts served from the output cache.
    #[serde(default)]
    pub cache_hits: u32,
    /// Wall-clock duration of the stage.
    pub duration_ms: u64,
}

impl StepSummary {
    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.approved
    }
}

/// The outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// The run id.
    pub run_id: String,
    /// One summary per executed stage, in completion order.
    pub history: Vec<StepSummary>,
    /// Final state.
    pub state: StateSnapshot,
}

impl RunResult {
    /// Returns the summary for `stage`, if it ran.
    #[must_use]
    pub fn step(&self, stage: &str) -> Option<&StepSummary> {
        self.history.iter().find(|s| s.stage == stage)
    }

    /// Returns true if every executed stage was approved.
    #[must_use]
    pub fn all_approved(&self) -> bool {
        self.history.iter().all(|s| s.approved)
    }

    /// Returns the content `stage` produced, if any.
    #[must_use]
    pub fn content(&self, stage: &str) -> Option<&str> {
        self.state
            .get(&crate::state::stage_key(stage, "content"))
            .and_then(serde_json::Value::as_str)
    }
}
