//! Producer output and its trace metadata.

use super::Artifact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operational metadata attached to producer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    /// Name of the producer that generated the output.
    pub producer: String,

    /// Producer version.
    #[serde(default = "default_version")]
    pub version: String,

    /// The stage the output was produced for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    /// Short description of the input the producer saw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_summary: Option<String>,

    /// How long the producer took, as measured by the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_ms: Option<u64>,

    /// Number of retries the producer performed internally.
    #[serde(default)]
    pub retries: u32,

    /// Free-form extra fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl OutputMetadata {
    /// Creates metadata for the named producer.
    #[must_use]
    pub fn new(producer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            version: default_version(),
            stage: None,
            input_summary: None,
            timing_ms: None,
            retries: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Sets the producer version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the input summary.
    #[must_use]
    pub fn with_input_summary(mut self, summary: impl Into<String>) -> Self {
        self.input_summary = Some(summary.into());
        self
    }

    /// Sets the producer-measured timing.
    #[must_use]
    pub fn with_timing_ms(mut self, timing_ms: u64) -> Self {
        self.timing_ms = Some(timing_ms);
        self
    }

    /// Adds an extra field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl Default for OutputMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Canonical structured output of every producer.
///
/// `content` is the primary human-readable result; `artifacts` are
/// machine-usable assets; `metadata` carries trace information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerOutput {
    /// Primary content.
    pub content: String,

    /// Ordered artifacts.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    /// Trace metadata.
    #[serde(default)]
    pub metadata: OutputMetadata,
}

impl ProducerOutput {
    /// Creates output with the given content and default metadata.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            artifacts: Vec::new(),
            metadata: OutputMetadata::default(),
        }
    }

    /// Appends an artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: OutputMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Checks the output contract.
    ///
    /// Content must contain non-whitespace text and every artifact needs a
    /// non-empty name.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("content is empty".to_string());
        }
        if let Some(index) = self.artifacts.iter().position(|a| a.name.trim().is_empty()) {
            return Err(format!("artifact #{index} has an empty name"));
        }
        Ok(())
    }

    /// Total bytes of all artifacts as counted by the budget guard.
    #[must_use]
    pub fn artifact_bytes(&self) -> u64 {
        self.artifacts.iter().map(Artifact::budget_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactKind;

    #[test]
    fn test_validate_rejects_blank_content() {
        assert!(ProducerOutput::new("ok").validate().is_ok());
        assert!(ProducerOutput::new("").validate().is_err());
        assert!(ProducerOutput::new("  \n\t").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unnamed_artifact() {
        let output = ProducerOutput::new("body")
            .with_artifact(Artifact::new("ok.txt", ArtifactKind::Text, "x"))
            .with_artifact(Artifact::new(" ", ArtifactKind::Text, "y"));

        let err = output.validate().unwrap_err();
        assert!(err.contains("#1"));
    }

    #[test]
    fn test_artifact_bytes_sum() {
        let output = ProducerOutput::new("body")
            .with_artifact(Artifact::new("ab", ArtifactKind::Text, "1234"))
            .with_artifact(Artifact::new("c", ArtifactKind::Binary, vec![1u8, 2, 3]));
        assert_eq!(output.artifact_bytes(), 6 + 4);
    }

    #[test]
    fn test_metadata_defaults_on_deserialize() {
        let output: ProducerOutput =
            serde_json::from_str(r#"{"content": "x", "metadata": {"producer": "p"}}"#).unwrap();
        assert_eq!(output.metadata.version, "0.1.0");
        assert_eq!(output.metadata.retries, 0);
        assert!(output.artifacts.is_empty());
    }
}
