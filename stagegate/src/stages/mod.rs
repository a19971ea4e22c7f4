//! Producer and reviewer capabilities.
//!
//! A stage pairs a [`Producer`], which generates output for a rendered
//! task, with a [`Reviewer`], which scores that output. Both are looked up
//! by name in typed registries validated before a run starts.

mod registry;

pub use registry::{validate_pipeline, ProducerRegistry, Registry, ReviewerRegistry};

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::core::{Feedback, ProducerOutput, ReviewVerdict};
use crate::state::StateSnapshot;

/// Default minimum review score when neither policy nor producer says
/// otherwise.
pub const DEFAULT_MIN_REVIEW_SCORE: f64 = 0.85;

/// Everything a producer gets for one attempt.
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    /// The stage being executed.
    pub stage: String,
    /// The task template rendered for this attempt.
    pub task: String,
    /// State as of the start of this attempt.
    pub state: StateSnapshot,
    /// Feedback from the previous rejected attempt.
    pub feedback: Option<Feedback>,
    /// Deterministic seed for this run and stage.
    pub seed: u64,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

/// Generates output for a stage.
#[async_trait]
pub trait Producer: Send + Sync + Debug {
    /// Producer name, as registered.
    fn name(&self) -> &str;

    /// Producer version; part of the cache key.
    fn version(&self) -> &str {
        "0.1.0"
    }

    /// Minimum review score used when the policy has no threshold.
    fn min_review_score(&self) -> f64 {
        DEFAULT_MIN_REVIEW_SCORE
    }

    /// Timeout used when the policy has none. `None` defers to the
    /// orchestrator's default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Retry count used when neither stage nor policy sets one.
    fn default_retries(&self) -> u32 {
        0
    }

    /// Checks the output contract before review.
    ///
    /// # Errors
    ///
    /// Returns a description of the violation.
    fn validate_output(&self, output: &ProducerOutput) -> Result<(), String> {
        output.validate()
    }

    /// Produces output for one attempt.
    async fn produce(&self, request: &ProduceRequest) -> anyhow::Result<ProducerOutput>;
}

/// Scores producer output.
#[async_trait]
pub trait Reviewer: Send + Sync + Debug {
    /// Reviewer name, as registered.
    fn name(&self) -> &str;

    /// Reviews `output` produced for `task`.
    async fn review(
        &self,
        output: &ProducerOutput,
        task: &str,
        state: &StateSnapshot,
    ) -> anyhow::Result<ReviewVerdict>;

    /// Acceptance gate: approved and at or above `threshold`.
    fn gate(&self, verdict: &ReviewVerdict, threshold: f64) -> bool {
        verdict.passes(threshold)
    }
}
