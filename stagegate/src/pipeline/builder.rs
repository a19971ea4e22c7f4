//! Orchestrator builder.

use std::sync::Arc;

use super::executor::Engine;
use super::hooks::PostStepHook;
use super::{OutputCache, Policy, SequentialOrchestrator, WaveOrchestrator};
use crate::checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use crate::config::OrchestratorConfig;
use crate::errors::StagegateError;
use crate::events::{EventSink, JsonlEventSink, NoOpEventSink};
use crate::stages::{ProducerRegistry, ReviewerRegistry};
use crate::state::{StateSnapshot, StateStore};
use crate::utils::generate_run_id;

/// Builder for sequential and wave orchestrators.
///
/// Collaborators that are not set get defaults: an empty policy, the default
/// [`OrchestratorConfig`], a fresh output cache, a checkpoint store (file
/// backed under `config.checkpoint_root` if set, in memory otherwise) and an
/// event sink (writing to `config.event_log_path` if set, a no-op sink
/// otherwise).
#[derive(Debug)]
pub struct OrchestratorBuilder {
    producers: ProducerRegistry,
    reviewers: ReviewerRegistry,
    policy: Policy,
    config: OrchestratorConfig,
    run_id: Option<String>,
    initial_state: StateSnapshot,
    cache: Option<Arc<OutputCache>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    events: Option<Arc<dyn EventSink>>,
    hooks: Vec<Arc<dyn PostStepHook>>,
}

impl OrchestratorBuilder {
    /// Creates a builder over the given registries.
    #[must_use]
    pub fn new(producers: ProducerRegistry, reviewers: ReviewerRegistry) -> Self {
        Self {
            producers,
            reviewers,
            policy: Policy::default(),
            config: OrchestratorConfig::default(),
            run_id: None,
            initial_state: StateSnapshot::new(),
            cache: None,
            checkpoints: None,
            events: None,
            hooks: Vec::new(),
        }
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the run id; a fresh one is generated otherwise.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Seeds the state.
    #[must_use]
    pub fn with_state(mut self, state: StateSnapshot) -> Self {
        self.initial_state = state;
        self
    }

    /// Seeds one state value.
    #[must_use]
    pub fn with_state_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.initial_state.insert(key.into(), value);
        self
    }

    /// Shares an output cache, e.g. across runs.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<OutputCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the checkpoint store.
    #[must_use]
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Appends a post-step hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn PostStepHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Builds a sequential orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid or the event log cannot be
    /// opened.
    pub fn build_sequential(self) -> Result<SequentialOrchestrator, StagegateError> {
        Ok(SequentialOrchestrator::new(Arc::new(self.into_engine()?)))
    }

    /// Builds a wave orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid or the event log cannot be
    /// opened.
    pub fn build_waves(self) -> Result<WaveOrchestrator, StagegateError> {
        Ok(WaveOrchestrator::new(Arc::new(self.into_engine()?)))
    }

    fn into_engine(self) -> Result<Engine, StagegateError> {
        self.policy.validate()?;

        let events: Arc<dyn EventSink> = match (self.events, &self.config.event_log_path) {
            (Some(sink), _) => sink,
            (None, Some(path)) => Arc::new(JsonlEventSink::open(path).map_err(|e| {
                StagegateError::Internal(format!("cannot open event log {}: {e}", path.display()))
            })?),
            (None, None) => Arc::new(NoOpEventSink),
        };

        let root = self.config.checkpoint_root.as_ref();
        let checkpoints: Arc<dyn CheckpointStore> = match (self.checkpoints, root) {
            (Some(store), _) => store,
            (None, Some(root)) => Arc::new(FileCheckpointStore::new(root)),
            (None, None) => Arc::new(InMemoryCheckpointStore::new()),
        };

        let run_id = self.run_id.unwrap_or_else(generate_run_id);
        tracing::debug!(run_id = %run_id, producers = self.producers.len(), "Orchestrator built");

        Ok(Engine {
            run_id,
            producers: self.producers,
            reviewers: self.reviewers,
            policy: self.policy,
            config: self.config,
            state: Arc::new(StateStore::from_snapshot(self.initial_state)),
            cache: self.cache.unwrap_or_default(),
            checkpoints,
            events,
            hooks: self.hooks,
        })
    }
}
