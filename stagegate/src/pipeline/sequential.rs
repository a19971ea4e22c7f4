//! Sequential orchestrator.
//!
//! Runs stages one after another in declaration order. The step index of a
//! stage is its position in the list. A stage whose retries are exhausted is
//! recorded as failed and the run moves on; every other stage failure, a
//! failing hook or a budget breach aborts the run.

use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use super::executor::Engine;
use super::{BudgetStats, PipelineStage, RunMode, RunResult, StepSummary};
use crate::checkpoint::CheckpointKey;
use crate::errors::StagegateError;
use crate::observability::run_span;
use crate::stages::validate_pipeline;
use crate::state::{StateSnapshot, StateStore};

/// Executes a pipeline one stage at a time.
///
/// Built with [`OrchestratorBuilder`](super::OrchestratorBuilder).
#[derive(Debug)]
pub struct SequentialOrchestrator {
    engine: Arc<Engine>,
}

/// Progress restored from checkpoints.
#[derive(Debug, Default)]
struct Progress {
    next_step: u64,
    history: Vec<StepSummary>,
    artifact_bytes: u64,
}

impl SequentialOrchestrator {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// The run id used for checkpoints and events.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.engine.run_id
    }

    /// The run state.
    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.engine.state
    }

    /// Checks `stages` against the registries and policy.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self, stages: &[PipelineStage]) -> Result<(), StagegateError> {
        validate_pipeline(stages, &self.engine.policy, &self.engine.producers, &self.engine.reviewers)?;
        Ok(())
    }

    /// Runs every stage from the first.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that aborted the run. Checkpoints of the
    /// stages completed before it remain saved.
    pub async fn run(&self, stages: &[PipelineStage]) -> Result<RunResult, StagegateError> {
        let span = run_span(&self.engine.run_id, RunMode::Sequential.as_str());
        self.run_from(stages, Progress::default()).instrument(span).await
    }

    /// Continues a previous run with the same run id.
    ///
    /// State is restored from the last checkpoint, history is rebuilt from
    /// the summaries saved with every earlier checkpoint, and execution
    /// continues with the following step. Without any checkpoint this is
    /// [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns checkpoint errors and any fatal error of the continued run.
    pub async fn resume(&self, stages: &[PipelineStage]) -> Result<RunResult, StagegateError> {
        let span = run_span(&self.engine.run_id, RunMode::Sequential.as_str());
        async {
            let progress = self.restore().await?;
            if progress.next_step > 0 {
                tracing::info!(
                    next_step = progress.next_step,
                    restored = progress.history.len(),
                    "Resuming run from checkpoint"
                );
            }
            self.run_from(stages, progress).await
        }
        .instrument(span)
        .await
    }

    async fn restore(&self) -> Result<Progress, StagegateError> {
        let engine = &self.engine;
        let Some(last) = engine.checkpoints.find_last_key(&engine.run_id).await? else {
            return Ok(Progress::default());
        };
        let checkpoint = engine.checkpoints.load(&last).await?.ok_or_else(|| {
            StagegateError::Internal(format!("checkpoint {last} is listed but could not be loaded"))
        })?;

        let mut progress = Progress {
            next_step: last.step + 1,
            ..Progress::default()
        };
        for step in 0..=last.step {
            let key = CheckpointKey::new(engine.run_id.clone(), step);
            let saved = engine.checkpoints.load(&key).await?.ok_or_else(|| {
                StagegateError::Internal(format!("cannot resume: checkpoint {key} is missing or unreadable"))
            })?;
            let summary = saved.extra.get("summary").cloned().ok_or_else(|| {
                StagegateError::Internal(format!("cannot resume: checkpoint {key} has no step summary"))
            })?;
            let summary = serde_json::from_value(summary).map_err(|e| {
                StagegateError::Internal(format!("cannot resume: checkpoint {key} has a bad step summary: {e}"))
            })?;
            progress.history.push(summary);
            progress.artifact_bytes += saved
                .extra
                .get("artifact_bytes")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
        }

        engine.state.replace(checkpoint.state_snapshot);
        Ok(progress)
    }

    async fn run_from(&self, stages: &[PipelineStage], progress: Progress) -> Result<RunResult, StagegateError> {
        let engine = &self.engine;
        let started = Instant::now();
        let Progress {
            next_step,
            mut history,
            mut artifact_bytes,
        } = progress;

        for (index, stage) in stages.iter().enumerate() {
            let step = index as u64;
            if step < next_step {
                continue;
            }
            let outcome = engine.execute(stage, step, RunMode::Sequential).await?;
            history.push(outcome.summary.clone());
            engine.run_hooks(&outcome.summary).await.inspect_err(|e| {
                tracing::error!(stage = %stage.name, error = %e, "Post-step hook failed; aborting run");
            })?;

            artifact_bytes += outcome.artifact_bytes;
            let stats = BudgetStats {
                stages: history.len() as u64,
                artifact_bytes,
                runtime: started.elapsed(),
            };
            engine.enforce_budget(&stage.name, &stats)?;
        }

        engine
            .emit_run_completed(RunMode::Sequential, &history, started)
            .await;
        tracing::info!(stages = history.len(), "Run completed");
        Ok(RunResult {
            run_id: engine.run_id.clone(),
            history,
            state: engine.state.snapshot(),
        })
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.engine.state.snapshot()
    }
}
