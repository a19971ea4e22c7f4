//! # Stagegate
//!
//! A review-gated stage pipeline engine.
//!
//! Each stage asks a producer for output, has a reviewer (or a council of
//! reviewers) score it, and retries with typed feedback until the output is
//! approved or the retries run out. Around that loop stagegate provides:
//!
//! - **Shared state**: a key-value store stages read inputs from and write results to
//! - **Output caching**: identical inputs skip the producer
//! - **Checkpoints**: in-memory, file and SQLite backends, with resume
//! - **Budgets**: ceilings on stages, artifact bytes and runtime
//! - **Two orchestrators**: sequential, or concurrent waves over a dependency graph
//! - **Observability**: `tracing` spans and structured run events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagegate::prelude::*;
//!
//! let producers = ProducerRegistry::new().with("writer", Arc::new(MyWriter));
//! let reviewers = ReviewerRegistry::new().with("editor", Arc::new(MyEditor));
//!
//! let stages = vec![
//!     PipelineStage::new("outline", "writer", "editor", "Outline {topic}"),
//!     PipelineStage::new("draft", "writer", "editor", "Expand {outline.content}")
//!         .with_max_retries(2),
//! ];
//!
//! let orchestrator = OrchestratorBuilder::new(producers, reviewers)
//!     .with_state_value("topic", json!("ownership"))
//!     .build_sequential()?;
//! orchestrator.validate(&stages)?;
//! let result = orchestrator.run(&stages).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        Checkpoint, CheckpointKey, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    };
    #[cfg(feature = "sqlite")]
    pub use crate::checkpoint::SqliteCheckpointStore;
    pub use crate::config::{LogConfig, OrchestratorConfig};
    pub use crate::core::{
        Artifact, ArtifactContent, ArtifactKind, Feedback, OutputMetadata, ProducerOutput,
        ReviewVerdict, Severity,
    };
    pub use crate::errors::{ReasonCode, StagegateError};
    pub use crate::events::{EventSink, JsonlEventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        BackoffPolicy, Budget, CouncilSpec, DecisionMode, OrchestratorBuilder, PipelineStage,
        Policy, PostStepHook, RefineOnFailure, RunResult, SequentialOrchestrator, StepSummary,
        WaveOrchestrator,
    };
    pub use crate::stages::{ProduceRequest, Producer, ProducerRegistry, Reviewer, ReviewerRegistry};
    pub use crate::state::{StateSnapshot, StateStore};
}
