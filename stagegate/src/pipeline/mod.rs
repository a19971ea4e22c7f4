//! Pipeline definition and execution.
//!
//! This module provides:
//! - Stage definitions and the policy that tunes them per category
//! - The sequential and wave orchestrators and their builder
//! - Execution building blocks: backoff, timeouts, output cache, reviewer
//!   councils and budgets
//! - Post-step hooks

mod budget;
mod builder;
mod cache;
mod council;
mod executor;
mod hooks;
mod policy;
mod result;
mod retry;
mod sequential;
mod spec;
mod timeout;
mod waves;

#[cfg(test)]
mod integration_tests;

pub use budget::{Budget, BudgetExceeded, BudgetStats};
pub use builder::OrchestratorBuilder;
pub use cache::{CacheQuery, CachedOutput, OutputCache};
pub use council::{ReviewerCouncil, MAX_COUNCIL_ITEMS};
pub use hooks::{HookContext, PostStepHook, RefineOnFailure, DEFAULT_REFINE_TEMPLATE};
pub use policy::{CouncilSpec, DecisionMode, Policy, POLICY_VERSION};
pub use result::{RunMode, RunResult, StepSummary};
pub use retry::{retry_with_backoff, BackoffPolicy};
pub use sequential::SequentialOrchestrator;
pub use spec::{PipelineStage, DEFAULT_CATEGORY};
pub use timeout::{run_fallible_with_timeout, run_with_timeout, ExecutionError};
pub use waves::WaveOrchestrator;
