//! Error types for the stagegate engine.
//!
//! Failures are classified by [`ReasonCode`], a stable snake_case code that
//! ends up in step summaries, events and checkpoints. Fatal conditions are
//! surfaced as [`StagegateError`] variants that carry the stage they occurred
//! at.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::pipeline::BudgetExceeded;

/// Stable reason codes attached to failed attempts, steps and runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The producer exceeded its wall-clock budget.
    Timeout,
    /// The producer returned output failing the validity contract.
    InvalidOutput,
    /// A review rejected an attempt that still had retries left.
    AdvisorReject,
    /// Every attempt was rejected and no attempts remain.
    ExhaustedRetries,
    /// A configured budget ceiling was breached.
    BudgetExceeded,
    /// The producer itself returned an error.
    ProducerError,
    /// A reviewer returned an error or a malformed verdict.
    ReviewError,
    /// A post-step hook failed.
    HookError,
}

impl ReasonCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::InvalidOutput => "invalid_output",
            Self::AdvisorReject => "advisor_reject",
            Self::ExhaustedRetries => "exhausted_retries",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ProducerError => "producer_error",
            Self::ReviewError => "review_error",
            Self::HookError => "hook_error",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for stagegate operations.
#[derive(Debug, Error)]
pub enum StagegateError {
    /// A producer did not finish within its timeout.
    #[error("stage '{stage}': producer timed out after {seconds}s")]
    Timeout {
        /// The stage being executed.
        stage: String,
        /// The timeout that was exceeded.
        seconds: f64,
    },

    /// A producer returned output that failed validation.
    #[error("stage '{stage}': invalid output: {message}")]
    InvalidOutput {
        /// The stage being executed.
        stage: String,
        /// Why the output was rejected.
        message: String,
    },

    /// A producer returned an error.
    #[error("stage '{stage}': producer failed: {message}")]
    ProducerFailed {
        /// The stage being executed.
        stage: String,
        /// The producer's error, rendered with its context chain.
        message: String,
    },

    /// A reviewer returned an error or a malformed verdict.
    #[error("stage '{stage}': review failed: {message}")]
    ReviewFailed {
        /// The stage being reviewed.
        stage: String,
        /// The reviewer's error.
        message: String,
    },

    /// A post-step hook failed.
    #[error("stage '{stage}': post-step hook failed: {message}")]
    HookFailed {
        /// The stage the hook ran after.
        stage: String,
        /// The hook's error.
        message: String,
    },

    /// A budget ceiling was breached after a stage (or wave) completed.
    #[error("stage '{stage}': {source}")]
    BudgetExceeded {
        /// The last stage that completed before the breach.
        stage: String,
        /// Which ceiling was breached.
        #[source]
        source: BudgetExceeded,
    },

    /// The wave scheduler could not reach every stage.
    #[error("{0}")]
    UnsatisfiedDependencies(#[from] UnsatisfiedDependenciesError),

    /// Pipeline definition failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Checkpoint persistence failed.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StagegateError {
    /// Returns the reason code for run-level failures, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Timeout { .. } => Some(ReasonCode::Timeout),
            Self::InvalidOutput { .. } => Some(ReasonCode::InvalidOutput),
            Self::ProducerFailed { .. } => Some(ReasonCode::ProducerError),
            Self::ReviewFailed { .. } => Some(ReasonCode::ReviewError),
            Self::HookFailed { .. } => Some(ReasonCode::HookError),
            Self::BudgetExceeded { .. } => Some(ReasonCode::BudgetExceeded),
            _ => None,
        }
    }

    /// Returns the stage at which the failure occurred, if known.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Timeout { stage, .. }
            | Self::InvalidOutput { stage, .. }
            | Self::ProducerFailed { stage, .. }
            | Self::ReviewFailed { stage, .. }
            | Self::HookFailed { stage, .. }
            | Self::BudgetExceeded { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Payload for an `error` event: `message`, plus `reason` and `stage`
    /// when known.
    #[must_use]
    pub fn to_event_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::Map::new();
        payload.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(reason) = self.reason() {
            payload.insert("reason".to_string(), serde_json::json!(reason.as_str()));
        }
        if let Some(stage) = self.stage() {
            payload.insert("stage".to_string(), serde_json::json!(stage));
        }
        serde_json::Value::Object(payload)
    }
}

/// Error raised when a pipeline definition is inconsistent.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Raised when the wave scheduler drains its ready set before visiting every
/// stage (a cycle or a dependency on an unknown stage).
#[derive(Debug, Clone, Error)]
#[error("Cyclic or unsatisfied dependencies for: {}", unreached.join(", "))]
pub struct UnsatisfiedDependenciesError {
    /// Stages that were never scheduled, in declaration order.
    pub unreached: Vec<String>,
}

impl UnsatisfiedDependenciesError {
    /// Creates a new error for the given stages.
    #[must_use]
    pub fn new(unreached: Vec<String>) -> Self {
        Self { unreached }
    }
}

/// Errors raised by checkpoint backends.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure.
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database failure.
    #[cfg(feature = "sqlite")]
    #[error("checkpoint database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A textual key could not be parsed.
    #[error("invalid checkpoint key '{0}': expected '<run_id>:<step>'")]
    InvalidKey(String),

    /// The blocking worker running a storage call failed.
    #[error("checkpoint worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_code_wire_format() {
        assert_eq!(ReasonCode::ExhaustedRetries.to_string(), "exhausted_retries");
        let json = serde_json::to_string(&ReasonCode::InvalidOutput).unwrap();
        assert_eq!(json, r#""invalid_output""#);

        let parsed: ReasonCode = serde_json::from_str(r#""budget_exceeded""#).unwrap();
        assert_eq!(parsed, ReasonCode::BudgetExceeded);
    }

    #[test]
    fn test_error_exposes_reason_and_stage() {
        let err = StagegateError::Timeout {
            stage: "draft".to_string(),
            seconds: 1.5,
        };
        assert_eq!(err.reason(), Some(ReasonCode::Timeout));
        assert_eq!(err.stage(), Some("draft"));
        assert!(err.to_string().contains("1.5s"));

        let payload = err.to_event_payload();
        assert_eq!(payload["reason"], "timeout");
        assert_eq!(payload["stage"], "draft");

        let internal = StagegateError::Internal("oops".to_string()).to_event_payload();
        assert!(internal.get("reason").is_none());
        assert_eq!(internal["message"], "Internal error: oops");
    }

    #[test]
    fn test_unsatisfied_dependencies_message() {
        let err = UnsatisfiedDependenciesError::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Cyclic or unsatisfied dependencies for: a, b");
    }
}
