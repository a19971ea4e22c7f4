//! Per-category execution policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Budget;
use crate::errors::PipelineValidationError;

/// The only policy schema version understood.
pub const POLICY_VERSION: u32 = 1;

/// How a council turns member verdicts into one decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    /// Strict majority of gated approvals.
    #[default]
    Majority,
    /// (Weighted) mean score against the threshold.
    Average,
}

impl DecisionMode {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Majority => "majority",
            Self::Average => "average",
        }
    }
}

/// Reviewer council configured for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilSpec {
    /// Aggregation mode.
    #[serde(default)]
    pub decision: DecisionMode,
    /// Registered reviewer names.
    pub reviewers: Vec<String>,
    /// Optional per-reviewer weights for [`DecisionMode::Average`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<HashMap<String, f64>>,
}

impl CouncilSpec {
    /// Creates a council over `reviewers`.
    #[must_use]
    pub fn new(decision: DecisionMode, reviewers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            decision,
            reviewers: reviewers.into_iter().map(Into::into).collect(),
            weights: None,
        }
    }

    /// Sets one reviewer's weight.
    #[must_use]
    pub fn with_weight(mut self, reviewer: impl Into<String>, weight: f64) -> Self {
        self.weights
            .get_or_insert_with(HashMap::new)
            .insert(reviewer.into(), weight);
        self
    }
}

/// Category-keyed overrides for thresholds, timeouts, retries and councils.
///
/// Absent categories (or keys) fall back to the producer's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Schema version; only [`POLICY_VERSION`] is accepted.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Minimum review score per category.
    #[serde(default)]
    pub score_thresholds: HashMap<String, f64>,
    /// Producer timeout in seconds per category.
    #[serde(default)]
    pub timeouts: HashMap<String, f64>,
    /// Retry count per category, used when the stage declares none.
    #[serde(default)]
    pub retries: HashMap<String, u32>,
    /// Reviewer councils per category.
    #[serde(default)]
    pub reviewer_councils: HashMap<String, CouncilSpec>,
    /// Global resource budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
}

const fn default_version() -> u32 {
    POLICY_VERSION
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION,
            score_thresholds: HashMap::new(),
            timeouts: HashMap::new(),
            retries: HashMap::new(),
            reviewer_councils: HashMap::new(),
            budget: None,
        }
    }
}

impl Policy {
    /// Creates an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a category's score threshold.
    #[must_use]
    pub fn with_threshold(mut self, category: impl Into<String>, threshold: f64) -> Self {
        self.score_thresholds.insert(category.into(), threshold);
        self
    }

    /// Sets a category's timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, category: impl Into<String>, seconds: f64) -> Self {
        self.timeouts.insert(category.into(), seconds);
        self
    }

    /// Sets a category's retry count.
    #[must_use]
    pub fn with_retries(mut self, category: impl Into<String>, retries: u32) -> Self {
        self.retries.insert(category.into(), retries);
        self
    }

    /// Sets a category's council.
    #[must_use]
    pub fn with_council(mut self, category: impl Into<String>, council: CouncilSpec) -> Self {
        self.reviewer_councils.insert(category.into(), council);
        self
    }

    /// Sets the budget.
    #[must_use]
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Threshold override for `category`.
    #[must_use]
    pub fn threshold(&self, category: &str) -> Option<f64> {
        self.score_thresholds.get(category).copied()
    }

    /// Timeout override for `category`.
    #[must_use]
    pub fn timeout(&self, category: &str) -> Option<f64> {
        self.timeouts.get(category).copied()
    }

    /// Retry override for `category`.
    #[must_use]
    pub fn retries_for(&self, category: &str) -> Option<u32> {
        self.retries.get(category).copied()
    }

    /// Council for `category`.
    #[must_use]
    pub fn council(&self, category: &str) -> Option<&CouncilSpec> {
        self.reviewer_councils.get(category)
    }

    /// Checks the version and the internal consistency of the policy.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported version, an empty council, a
    /// threshold outside `[0, 1]` or a negative timeout.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.version != POLICY_VERSION {
            return Err(PipelineValidationError::new(format!(
                "Unsupported policy version {} (expected {POLICY_VERSION})",
                self.version
            )));
        }
        for (category, council) in &self.reviewer_councils {
            if council.reviewers.is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Council for category '{category}' has no reviewers"
                )));
            }
        }
        for (category, threshold) in &self.score_thresholds {
            if !(0.0..=1.0).contains(threshold) {
                return Err(PipelineValidationError::new(format!(
                    "Threshold {threshold} for category '{category}' is outside [0, 1]"
                )));
            }
        }
        for (category, timeout) in &self.timeouts {
            if timeout.is_nan() || *timeout < 0.0 {
                return Err(PipelineValidationError::new(format!(
                    "Timeout {timeout} for category '{category}' must be non-negative"
                )));
            }
        }
        Ok(())
    }
}
