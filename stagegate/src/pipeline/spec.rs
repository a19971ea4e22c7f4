//! Stage definitions.

use crate::errors::PipelineValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Category used for policy lookups when a stage declares none.
pub const DEFAULT_CATEGORY: &str = "default";

/// Declarative definition of one review-gated stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Unique stage name; also the prefix of the stage's state keys.
    pub name: String,
    /// Registered producer name.
    pub producer: String,
    /// Registered reviewer name.
    pub reviewer: String,
    /// Task template rendered against the state before each attempt.
    pub task: String,
    /// Policy category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Extra attempts after the first one. Zero defers to the policy.
    #[serde(default)]
    pub max_retries: u32,
    /// Stages that must complete first (wave mode only).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
}

impl PipelineStage {
    /// Creates a stage with no category, retries or dependencies.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        producer: impl Into<String>,
        reviewer: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            producer: producer.into(),
            reviewer: reviewer.into(),
            task: task.into(),
            category: None,
            max_retries: 0,
            depends_on: BTreeSet::new(),
        }
    }

    /// Sets the policy category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.insert(dep.into());
        self
    }

    /// Replaces the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// The category, or [`DEFAULT_CATEGORY`].
    #[must_use]
    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or(DEFAULT_CATEGORY)
    }

    /// Validates the stage on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage depends on itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Stage name cannot be empty or whitespace-only",
            ));
        }
        if self.depends_on.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}
