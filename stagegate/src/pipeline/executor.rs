//! Per-stage execution shared by the sequential and wave orchestrators.
//!
//! A stage runs an attempt loop of produce, validate and review. Rejected
//! attempts leave their review and output in the state and hand typed
//! feedback to the next attempt. The final output is persisted, the step is
//! checkpointed and the summary handed back to the orchestrator, which owns
//! history, hooks and budget accounting.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use super::hooks::{HookContext, PostStepHook};
use super::{
    retry_with_backoff, run_fallible_with_timeout, BudgetStats, CacheQuery, ExecutionError, OutputCache,
    PipelineStage, Policy, ReviewerCouncil, RunMode, StepSummary,
};
use crate::checkpoint::{Checkpoint, CheckpointKey, CheckpointStore};
use crate::config::OrchestratorConfig;
use crate::core::{Feedback, ProducerOutput, ReviewVerdict};
use crate::errors::{ReasonCode, StagegateError};
use crate::events::{kinds, EventSink};
use crate::observability::stage_span;
use crate::stages::{ProduceRequest, Producer, ProducerRegistry, Reviewer, ReviewerRegistry};
use crate::state::{diff_summary, render_task, stage_key, StateSnapshot, StateStore};
use crate::utils::{elapsed_ms, seed_for};

/// Everything a run needs, shared by the orchestrator and its workers.
#[derive(Debug)]
pub(crate) struct Engine {
    pub(crate) run_id: String,
    pub(crate) producers: ProducerRegistry,
    pub(crate) reviewers: ReviewerRegistry,
    pub(crate) policy: Policy,
    pub(crate) config: OrchestratorConfig,
    pub(crate) state: Arc<StateStore>,
    pub(crate) cache: Arc<OutputCache>,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) hooks: Vec<Arc<dyn PostStepHook>>,
}

/// A finished stage as seen by the orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct StageOutcome {
    pub(crate) summary: StepSummary,
    pub(crate) artifact_bytes: u64,
}

/// Settings resolved for one stage from policy, producer and config.
struct Resolved {
    producer: Arc<dyn Producer>,
    reviewer: Arc<dyn Reviewer>,
    reviewer_label: String,
    category: String,
    timeout_seconds: f64,
    max_attempts: u32,
    threshold: f64,
}

/// Result of the attempt loop.
struct Attempted {
    output: ProducerOutput,
    verdict: ReviewVerdict,
    approved: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    attempts: u32,
    cache_hits: u32,
}

impl Engine {
    /// Emits an event whose payload carries the run id.
    pub(crate) async fn emit(&self, kind: &str, mut payload: Value) {
        if let Value::Object(map) = &mut payload {
            map.insert("run_id".to_string(), Value::String(self.run_id.clone()));
        }
        self.events.emit(kind, Some(payload)).await;
    }

    /// Runs one stage at checkpoint position `step`.
    ///
    /// In sequential mode every failure other than exhausted retries is
    /// returned as an error. In wave mode stage failures become a failed
    /// summary; only infrastructure errors (checkpointing, unknown names)
    /// are returned.
    pub(crate) async fn execute(
        &self,
        stage: &PipelineStage,
        step: u64,
        mode: RunMode,
    ) -> Result<StageOutcome, StagegateError> {
        let span = stage_span(&self.run_id, &stage.name, &stage.producer, stage.category_or_default());
        self.execute_in_span(stage, step, mode).instrument(span).await
    }

    async fn execute_in_span(
        &self,
        stage: &PipelineStage,
        step: u64,
        mode: RunMode,
    ) -> Result<StageOutcome, StagegateError> {
        let started = Instant::now();
        let previous = self.state.get(&stage_key(&stage.name, "content"));
        if let Some(prev) = &previous {
            self.state.set(stage_key(&stage.name, "previous_content"), prev.clone());
        }
        self.emit(
            kinds::STEP_START,
            json!({ "stage": stage.name, "step": step, "mode": mode.as_str() }),
        )
        .await;

        let resolved = match self.resolve(stage) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.report_failure(stage, &err).await;
                return Err(err);
            }
        };

        let mut tally = Tally::default();
        match self.attempt_loop(stage, &resolved, &mut tally).await {
            Ok(attempted) => {
                self.persist(stage, &attempted, previous.as_ref())?;
                let summary = StepSummary {
                    stage: stage.name.clone(),
                    producer: stage.producer.clone(),
                    reviewer: resolved.reviewer_label.clone(),
                    category: resolved.category.clone(),
                    approved: attempted.approved,
                    score: attempted.verdict.score,
                    error_reason: (!attempted.approved).then_some(ReasonCode::ExhaustedRetries),
                    attempts: tally.attempts,
                    cache_hits: tally.cache_hits,
                    duration_ms: elapsed_ms(started),
                };
                let artifact_bytes = attempted.output.artifact_bytes();
                self.finish(stage, step, mode, summary, artifact_bytes).await
            }
            Err(err) => {
                self.report_failure(stage, &err).await;
                match (mode, err.reason()) {
                    (RunMode::Waves, Some(reason)) => {
                        tracing::warn!(reason = %reason, error = %err, "Stage failed; siblings continue");
                        let summary = StepSummary {
                            stage: stage.name.clone(),
                            producer: stage.producer.clone(),
                            reviewer: resolved.reviewer_label.clone(),
                            category: resolved.category.clone(),
                            approved: false,
                            score: 0.0,
                            error_reason: Some(reason),
                            attempts: tally.attempts,
                            cache_hits: tally.cache_hits,
                            duration_ms: elapsed_ms(started),
                        };
                        self.finish(stage, step, mode, summary, 0).await
                    }
                    _ => {
                        tracing::error!(error = %err, "Stage failed; aborting run");
                        Err(err)
                    }
                }
            }
        }
    }

    async fn finish(
        &self,
        stage: &PipelineStage,
        step: u64,
        mode: RunMode,
        summary: StepSummary,
        artifact_bytes: u64,
    ) -> Result<StageOutcome, StagegateError> {
        self.checkpoint(stage, step, mode, &summary, artifact_bytes).await?;
        self.emit(
            kinds::STEP_COMPLETED,
            json!({
                "stage": summary.stage,
                "step": step,
                "approved": summary.approved,
                "score": summary.score,
                "attempts": summary.attempts,
                "cache_hits": summary.cache_hits,
                "error_reason": summary.error_reason,
                "duration_ms": summary.duration_ms,
            }),
        )
        .await;
        Ok(StageOutcome {
            summary,
            artifact_bytes,
        })
    }

    async fn report_failure(&self, stage: &PipelineStage, err: &StagegateError) {
        let mut payload = err.to_event_payload();
        payload["stage"] = json!(stage.name);
        self.emit(kinds::ERROR, payload).await;
    }

    fn resolve(&self, stage: &PipelineStage) -> Result<Resolved, StagegateError> {
        let category = stage.category_or_default().to_string();
        let producer = self.producers.get(&stage.producer).ok_or_else(|| {
            StagegateError::Internal(format!(
                "stage '{}': producer '{}' is not registered",
                stage.name, stage.producer
            ))
        })?;

        let timeout_seconds = self
            .policy
            .timeout(&category)
            .or_else(|| producer.timeout().map(|d| d.as_secs_f64()))
            .unwrap_or(self.config.default_timeout_seconds);
        let retries = if stage.max_retries > 0 {
            stage.max_retries
        } else {
            self.policy
                .retries_for(&category)
                .unwrap_or_else(|| producer.default_retries())
        };
        let threshold = self
            .policy
            .threshold(&category)
            .unwrap_or_else(|| producer.min_review_score());

        let (reviewer, reviewer_label): (Arc<dyn Reviewer>, String) =
            if let Some(spec) = self.policy.council(&category) {
                let council: Arc<dyn Reviewer> = Arc::new(
                    ReviewerCouncil::from_spec(spec, &self.reviewers, threshold)
                        .map_err(|e| StagegateError::Internal(format!("stage '{}': {e}", stage.name)))?,
                );
                (council, format!("council[{}]", spec.reviewers.join(",")))
            } else {
                let reviewer = self.reviewers.get(&stage.reviewer).ok_or_else(|| {
                    StagegateError::Internal(format!(
                        "stage '{}': reviewer '{}' is not registered",
                        stage.name, stage.reviewer
                    ))
                })?;
                (reviewer, stage.reviewer.clone())
            };

        Ok(Resolved {
            producer,
            reviewer,
            reviewer_label,
            category,
            timeout_seconds,
            max_attempts: retries.saturating_add(1),
            threshold,
        })
    }

    async fn attempt_loop(
        &self,
        stage: &PipelineStage,
        resolved: &Resolved,
        tally: &mut Tally,
    ) -> Result<Attempted, StagegateError> {
        let mut feedback: Option<Feedback> = None;
        let mut attempt: u32 = 1;
        loop {
            tally.attempts = attempt;
            let snapshot = self.state.snapshot();
            let task = render_task(&stage.task, &snapshot, feedback.as_ref());
            self.emit(kinds::STEP_ATTEMPT, json!({ "stage": stage.name, "attempt": attempt }))
                .await;

            let output = self
                .obtain_output(stage, resolved, &task, &snapshot, feedback.as_ref(), attempt, tally)
                .await?;

            let verdict = resolved
                .reviewer
                .review(&output, &task, &snapshot)
                .await
                .map_err(|e| StagegateError::ReviewFailed {
                    stage: stage.name.clone(),
                    message: format!("{e:#}"),
                })?;
            verdict.validate().map_err(|message| StagegateError::ReviewFailed {
                stage: stage.name.clone(),
                message,
            })?;

            if resolved.reviewer.gate(&verdict, resolved.threshold) {
                tracing::info!(attempt, score = verdict.score, "Stage approved");
                return Ok(Attempted {
                    output,
                    verdict,
                    approved: true,
                });
            }

            if attempt >= resolved.max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    score = verdict.score,
                    threshold = resolved.threshold,
                    "Stage rejected with no retries left"
                );
                return Ok(Attempted {
                    output,
                    verdict,
                    approved: false,
                });
            }

            tracing::warn!(
                attempt,
                score = verdict.score,
                threshold = resolved.threshold,
                "Attempt rejected; retrying with feedback"
            );
            self.state.update([
                (stage_key(&stage.name, "last_review"), serde_json::to_value(&verdict)?),
                (stage_key(&stage.name, "last_output"), serde_json::to_value(&output)?),
            ]);
            self.emit(
                kinds::STEP_REJECTED,
                json!({
                    "stage": stage.name,
                    "attempt": attempt,
                    "score": verdict.score,
                    "reason": ReasonCode::AdvisorReject.as_str(),
                    "summary": verdict.summary,
                }),
            )
            .await;
            feedback = Some(Feedback::from_verdict(&verdict, attempt));
            if let Some(backoff) = &self.config.review_backoff {
                backoff.sleep(attempt).await;
            }
            attempt += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn obtain_output(
        &self,
        stage: &PipelineStage,
        resolved: &Resolved,
        task: &str,
        snapshot: &StateSnapshot,
        feedback: Option<&Feedback>,
        attempt: u32,
        tally: &mut Tally,
    ) -> Result<ProducerOutput, StagegateError> {
        let query = CacheQuery {
            producer: &stage.producer,
            version: resolved.producer.version(),
            stage: &stage.name,
            task,
            state: snapshot,
        };

        if self.config.use_cache {
            if let Some(hit) = self.cache.get(&query) {
                match hit.decode() {
                    Ok(output) => {
                        tally.cache_hits += 1;
                        tracing::debug!(attempt, "Serving attempt from output cache");
                        self.emit(kinds::CACHE_HIT, json!({ "stage": stage.name, "attempt": attempt }))
                            .await;
                        return Ok(output);
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring undecodable cache entry"),
                }
            }
        }

        let request = ProduceRequest {
            stage: stage.name.clone(),
            task: task.to_string(),
            state: snapshot.clone(),
            feedback: feedback.cloned(),
            seed: seed_for(&self.run_id, &stage.name),
            attempt,
        };
        let producer = Arc::clone(&resolved.producer);
        let label = format!("{}/{}", stage.name, stage.producer);
        let started = Instant::now();
        let produced = run_fallible_with_timeout(
            async move { producer.produce(&request).await },
            resolved.timeout_seconds,
            label,
        )
        .await;

        let mut output = match produced {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(StagegateError::ProducerFailed {
                    stage: stage.name.clone(),
                    message: format!("{e:#}"),
                })
            }
            Err(ExecutionError::TimedOut { seconds }) => {
                return Err(StagegateError::Timeout {
                    stage: stage.name.clone(),
                    seconds,
                })
            }
            Err(e) => {
                return Err(StagegateError::ProducerFailed {
                    stage: stage.name.clone(),
                    message: e.to_string(),
                })
            }
        };

        resolved
            .producer
            .validate_output(&output)
            .map_err(|message| StagegateError::InvalidOutput {
                stage: stage.name.clone(),
                message,
            })?;
        if output.metadata.stage.is_none() {
            output.metadata.stage = Some(stage.name.clone());
        }
        if output.metadata.timing_ms.is_none() {
            output.metadata.timing_ms = Some(elapsed_ms(started));
        }

        if self.config.use_cache {
            if let Err(e) = self.cache.put(&query, &output) {
                tracing::warn!(error = %e, "Failed to cache producer output");
            }
        }
        Ok(output)
    }

    fn persist(
        &self,
        stage: &PipelineStage,
        attempted: &Attempted,
        previous: Option<&Value>,
    ) -> Result<(), StagegateError> {
        let name = stage.name.as_str();
        let mut patch = vec![
            (stage_key(name, "content"), Value::String(attempted.output.content.clone())),
            (stage_key(name, "artifacts"), serde_json::to_value(&attempted.output.artifacts)?),
            (stage_key(name, "metadata"), serde_json::to_value(&attempted.output.metadata)?),
            (stage_key(name, "review"), serde_json::to_value(&attempted.verdict)?),
        ];
        if let Some(prev) = previous.and_then(Value::as_str) {
            let diff = diff_summary(prev, &attempted.output.content);
            patch.push((stage_key(name, "diff"), serde_json::to_value(diff)?));
        }
        self.state.update(patch);
        Ok(())
    }

    async fn checkpoint(
        &self,
        stage: &PipelineStage,
        step: u64,
        mode: RunMode,
        summary: &StepSummary,
        artifact_bytes: u64,
    ) -> Result<(), StagegateError> {
        let key = CheckpointKey::new(self.run_id.clone(), step);
        let checkpoint = Checkpoint::new(self.run_id.clone(), step, stage.name.clone(), self.state.snapshot())
            .with_extra("duration_ms", json!(summary.duration_ms))
            .with_extra("attempts", json!(summary.attempts))
            .with_extra("mode", json!(mode.as_str()))
            .with_extra("artifact_bytes", json!(artifact_bytes))
            .with_extra("summary", serde_json::to_value(summary)?);

        let store = &self.checkpoints;
        let key_ref = &key;
        let checkpoint_ref = &checkpoint;
        retry_with_backoff(&self.config.checkpoint_retry, "checkpoint_save", move |_| {
            store.save(key_ref, checkpoint_ref)
        })
        .await?;
        tracing::debug!(checkpoint = %key, "Checkpoint saved");
        Ok(())
    }

    /// Runs every post-step hook in order.
    pub(crate) async fn run_hooks(&self, summary: &StepSummary) -> Result<(), StagegateError> {
        let ctx = HookContext {
            run_id: &self.run_id,
            summary,
            state: &self.state,
        };
        for hook in &self.hooks {
            hook.after_step(&ctx)
                .await
                .map_err(|e| StagegateError::HookFailed {
                    stage: summary.stage.clone(),
                    message: format!("{}: {e:#}", hook.name()),
                })?;
            self.emit(
                kinds::HOOK_COMPLETED,
                json!({ "stage": summary.stage, "hook": hook.name() }),
            )
            .await;
        }
        Ok(())
    }

    /// Checks the policy budget, if any, after `stage`.
    pub(crate) fn enforce_budget(&self, stage: &str, stats: &BudgetStats) -> Result<(), StagegateError> {
        let Some(budget) = &self.policy.budget else {
            return Ok(());
        };
        budget.enforce(stats).map_err(|source| {
            tracing::error!(stage, ceiling = source.ceiling(), error = %source, "Budget exceeded");
            StagegateError::BudgetExceeded {
                stage: stage.to_string(),
                source,
            }
        })
    }

    /// Emits the run-completed event.
    pub(crate) async fn emit_run_completed(&self, mode: RunMode, history: &[StepSummary], started: Instant) {
        let approved = history.iter().filter(|s| s.approved).count();
        self.emit(
            kinds::RUN_COMPLETED,
            json!({
                "mode": mode.as_str(),
                "stages": history.len(),
                "approved": approved,
                "duration_ms": elapsed_ms(started),
            }),
        )
        .await;
    }
}
