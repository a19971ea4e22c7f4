//! Wave orchestrator.
//!
//! Stages are scheduled by dependency level. Every stage whose dependencies
//! have all run forms the next wave; the stages of one wave run concurrently
//! on tokio tasks, at most `max_workers` at a time. Stage failures stay local
//! to the stage: dependents still run. The budget is checked after each
//! wave.

use futures::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::Instrument;

use super::executor::{Engine, StageOutcome};
use super::{BudgetStats, PipelineStage, RunMode, RunResult};
use crate::errors::{StagegateError, UnsatisfiedDependenciesError};
use crate::events::kinds;
use crate::observability::run_span;
use crate::stages::validate_pipeline;
use crate::state::StateStore;

/// Executes independent stages concurrently, wave by wave.
///
/// Built with [`OrchestratorBuilder`](super::OrchestratorBuilder).
#[derive(Debug)]
pub struct WaveOrchestrator {
    engine: Arc<Engine>,
}

/// Dependency bookkeeping over stage declaration indices.
#[derive(Debug)]
struct Schedule {
    in_degree: Vec<usize>,
    dependents: Vec<Vec<usize>>,
}

impl Schedule {
    fn new(stages: &[PipelineStage]) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, stage) in stages.iter().enumerate() {
            index.entry(stage.name.as_str()).or_insert(i);
        }

        let mut in_degree = vec![0; stages.len()];
        let mut dependents = vec![Vec::new(); stages.len()];
        for (i, stage) in stages.iter().enumerate() {
            // unknown dependencies are counted but never released
            in_degree[i] = stage.depends_on.len();
            for dep in &stage.depends_on {
                if let Some(&d) = index.get(dep.as_str()) {
                    dependents[d].push(i);
                }
            }
        }
        Self {
            in_degree,
            dependents,
        }
    }

    fn initial(&self) -> Vec<usize> {
        (0..self.in_degree.len()).filter(|&i| self.in_degree[i] == 0).collect()
    }

    /// Releases the dependents of a finished wave and returns the next one,
    /// in declaration order.
    fn release(&mut self, wave: &[usize]) -> Vec<usize> {
        let mut next = Vec::new();
        for &done in wave {
            for &dependent in &self.dependents[done] {
                self.in_degree[dependent] -= 1;
                if self.in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        next
    }
}

impl WaveOrchestrator {
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

    /// Runs every stage once, dependencies first.
    ///
    /// # Errors
    ///
    /// Returns [`StagegateError::UnsatisfiedDependencies`] when cycles or
    /// unknown dependencies leave stages unreachable,
    /// [`StagegateError::BudgetExceeded`] when a wave breaches the budget,
    /// and checkpoint or internal errors.
    pub async fn run(&self, stages: &[PipelineStage]) -> Result<RunResult, StagegateError> {
        let span = run_span(&self.engine.run_id, RunMode::Waves.as_str());
        self.run_waves(stages).instrument(span).await
    }

    async fn run_waves(&self, stages: &[PipelineStage]) -> Result<RunResult, StagegateError> {
        let engine = &self.engine;
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(engine.config.max_workers.max(1)));
        let mut schedule = Schedule::new(stages);
        let mut visited = vec![false; stages.len()];
        let mut history = Vec::with_capacity(stages.len());
        let mut artifact_bytes = 0u64;

        let mut wave = schedule.initial();
        let mut wave_number = 0usize;
        while !wave.is_empty() {
            wave_number += 1;
            let names: Vec<&str> = wave.iter().map(|&i| stages[i].name.as_str()).collect();
            tracing::info!(wave = wave_number, stages = ?names, "Starting wave");
            engine
                .emit(kinds::WAVE_START, json!({ "wave": wave_number, "stages": names }))
                .await;

            let handles: Vec<_> = wave
                .iter()
                .map(|&i| {
                    let engine = Arc::clone(engine);
                    let semaphore = Arc::clone(&semaphore);
                    let stage = stages[i].clone();
                    tokio::spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| StagegateError::Internal(format!("worker pool closed: {e}")))?;
                        engine.execute(&stage, i as u64, RunMode::Waves).await
                    })
                })
                .collect();

            let mut last_stage = String::new();
            for (&i, joined) in wave.iter().zip(join_all(handles).await) {
                let outcome: StageOutcome = joined
                    .map_err(|e| StagegateError::Internal(format!("stage '{}' task failed: {e}", stages[i].name)))??;
                visited[i] = true;
                history.push(outcome.summary.clone());
                if let Err(e) = engine.run_hooks(&outcome.summary).await {
                    tracing::warn!(stage = %stages[i].name, error = %e, "Post-step hook failed");
                    engine
                        .emit(kinds::ERROR, e.to_event_payload())
                        .await;
                }
                artifact_bytes += outcome.artifact_bytes;
                last_stage.clone_from(&stages[i].name);
            }

            let stats = BudgetStats {
                stages: history.len() as u64,
                artifact_bytes,
                runtime: started.elapsed(),
            };
            engine.enforce_budget(&last_stage, &stats)?;

            wave = schedule.release(&wave);
        }

        let unreached: Vec<String> = stages
            .iter()
            .zip(&visited)
            .filter(|(_, seen)| !**seen)
            .map(|(stage, _)| stage.name.clone())
            .collect();
        if !unreached.is_empty() {
            let err = UnsatisfiedDependenciesError::new(unreached);
            tracing::error!(error = %err, "Run stopped with unreachable stages");
            engine
                .emit(kinds::ERROR, json!({ "message": err.to_string(), "stages": err.unreached }))
                .await;
            return Err(err.into());
        }

        engine.emit_run_completed(RunMode::Waves, &history, started).await;
        tracing::info!(stages = history.len(), waves = wave_number, "Run completed");
        Ok(RunResult {
            run_id: engine.run_id.clone(),
            history,
            state: engine.state.snapshot(),
        })
    }
}
