//! Name-keyed registries of producers and reviewers.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::{Producer, Reviewer};
use crate::errors::PipelineValidationError;
use crate::pipeline::{PipelineStage, Policy};

/// A map from registered name to shared implementation.
pub struct Registry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

/// Registry of producers.
pub type ProducerRegistry = Registry<dyn Producer>;

/// Registry of reviewers.
pub type ReviewerRegistry = Registry<dyn Reviewer>;

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("names", &names).finish()
    }
}

impl<T: ?Sized> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `item` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, item: Arc<T>) -> &mut Self {
        self.entries.insert(name.into(), item);
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, item: Arc<T>) -> Self {
        self.register(name, item);
        self
    }

    /// Looks up `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Checks a pipeline definition against the registries before a run.
///
/// Verifies that the policy is valid, stage names are unique, every
/// referenced producer and reviewer (council members included) is
/// registered, and every dependency names a declared stage.
///
/// # Errors
///
/// Returns the first inconsistency found.
pub fn validate_pipeline(
    stages: &[PipelineStage],
    policy: &Policy,
    producers: &ProducerRegistry,
    reviewers: &ReviewerRegistry,
) -> Result<(), PipelineValidationError> {
    policy.validate()?;

    let mut seen = HashSet::new();
    for stage in stages {
        stage.validate()?;
        if !seen.insert(stage.name.as_str()) {
            return Err(PipelineValidationError::new(format!(
                "Duplicate stage name '{}'",
                stage.name
            ))
            .with_stages(vec![stage.name.clone()]));
        }
    }

    for stage in stages {
        if !producers.contains(&stage.producer) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' references unknown producer '{}'",
                stage.name, stage.producer
            ))
            .with_stages(vec![stage.name.clone()]));
        }
        if !reviewers.contains(&stage.reviewer) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' references unknown reviewer '{}'",
                stage.name, stage.reviewer
            ))
            .with_stages(vec![stage.name.clone()]));
        }
        let missing: BTreeSet<_> = stage
            .depends_on
            .iter()
            .filter(|dep| !seen.contains(dep.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' depends on undeclared stages: {}",
                stage.name,
                missing.iter().cloned().collect::<Vec<_>>().join(", ")
            ))
            .with_stages(vec![stage.name.clone()]));
        }
    }

    let mut categories: Vec<_> = policy.reviewer_councils.keys().collect();
    categories.sort();
    for category in categories {
        let council = &policy.reviewer_councils[category];
        if let Some(unknown) = council.reviewers.iter().find(|r| !reviewers.contains(r)) {
            return Err(PipelineValidationError::new(format!(
                "Council for category '{category}' references unknown reviewer '{unknown}'"
            )));
        }
    }

    Ok(())
}
