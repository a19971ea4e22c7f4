//! Post-step hooks.
//!
//! Hooks run after each step has been checkpointed and appended to the
//! history, approved or not, in registration order. They may read and write
//! the run state.

use anyhow::Context;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use super::StepSummary;
use crate::stages::{ProduceRequest, Producer, Reviewer, DEFAULT_MIN_REVIEW_SCORE};
use crate::state::{render_task, stage_key, StateStore};
use crate::utils::seed_for;

/// What a hook sees after a step.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// The run id.
    pub run_id: &'a str,
    /// The step that just finished.
    pub summary: &'a StepSummary,
    /// The run state.
    pub state: &'a StateStore,
}

/// Called after every step.
#[async_trait]
pub trait PostStepHook: Send + Sync + Debug {
    /// Hook name, for logs and events.
    fn name(&self) -> &str;

    /// Runs the hook.
    async fn after_step(&self, ctx: &HookContext<'_>) -> anyhow::Result<()>;
}

/// Default refinement task; `{stage}` is replaced with the failed stage.
pub const DEFAULT_REFINE_TEMPLATE: &str =
    "Refine the task for stage '{stage}' based on its last review.";

/// Runs a refiner producer and reviewer when a step fails review.
///
/// An approved refinement is stored as `<stage>.refined_prompt.*`; a
/// rejected one is kept as `<stage>.refined_prompt_attempt.*`.
#[derive(Debug, Clone)]
pub struct RefineOnFailure {
    refiner: Arc<dyn Producer>,
    reviewer: Arc<dyn Reviewer>,
    min_score: f64,
    task_template: String,
}

impl RefineOnFailure {
    /// Creates the hook.
    #[must_use]
    pub fn new(refiner: Arc<dyn Producer>, reviewer: Arc<dyn Reviewer>) -> Self {
        Self {
            refiner,
            reviewer,
            min_score: DEFAULT_MIN_REVIEW_SCORE,
            task_template: DEFAULT_REFINE_TEMPLATE.to_string(),
        }
    }

    /// Sets the score the refinement must reach.
    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Sets the refinement task template.
    #[must_use]
    pub fn with_task_template(mut self, template: impl Into<String>) -> Self {
        self.task_template = template.into();
        self
    }
}

#[async_trait]
impl PostStepHook for RefineOnFailure {
    fn name(&self) -> &str {
        "refine_on_failure"
    }

    async fn after_step(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        if ctx.summary.approved {
            return Ok(());
        }
        let stage = ctx.summary.stage.as_str();
        let snapshot = ctx.state.snapshot();
        let template = self.task_template.replace("{stage}", stage);
        let task = render_task(&template, &snapshot, None);

        let request = ProduceRequest {
            stage: stage.to_string(),
            task: task.clone(),
            state: snapshot.clone(),
            feedback: None,
            seed: seed_for(ctx.run_id, stage),
            attempt: 1,
        };
        let output = self
            .refiner
            .produce(&request)
            .await
            .with_context(|| format!("refiner '{}' failed", self.refiner.name()))?;
        self.refiner
            .validate_output(&output)
            .map_err(|m| anyhow::anyhow!("refiner produced invalid output: {m}"))?;

        let verdict = self
            .reviewer
            .review(&output, &task, &snapshot)
            .await
            .with_context(|| format!("refinement reviewer '{}' failed", self.reviewer.name()))?;

        let prefix = if self.reviewer.gate(&verdict, self.min_score) {
            tracing::info!(stage, score = verdict.score, "Refined task approved");
            "refined_prompt"
        } else {
            tracing::warn!(stage, score = verdict.score, "Refined task rejected");
            "refined_prompt_attempt"
        };

        ctx.state.update([
            (
                stage_key(stage, &format!("{prefix}.content")),
                serde_json::Value::String(output.content.clone()),
            ),
            (
                stage_key(stage, &format!("{prefix}.artifacts")),
                serde_json::to_value(&output.artifacts)?,
            ),
            (
                stage_key(stage, &format!("{prefix}.review")),
                serde_json::to_value(&verdict)?,
            ),
        ]);
        Ok(())
    }
}
