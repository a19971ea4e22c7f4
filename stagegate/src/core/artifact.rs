//! Artifacts attached to producer output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Plain text.
    Text,
    /// Markdown document.
    Markdown,
    /// JSON document.
    Json,
    /// Python source.
    Python,
    /// Opaque binary blob.
    Binary,
    /// Image data.
    Image,
}

impl ArtifactKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Python => "python",
            Self::Binary => "binary",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact payload.
///
/// Bytes are carried as base64 on the wire so artifacts survive the JSON
/// round trip through the cache and checkpoint stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "value", rename_all = "snake_case")]
pub enum ArtifactContent {
    /// UTF-8 text.
    Text(String),
    /// Structured JSON.
    Json(serde_json::Value),
    /// Raw bytes.
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl ArtifactContent {
    /// Size of the payload in bytes.
    ///
    /// JSON content is measured by its compact serialized form.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        let len = match self {
            Self::Text(text) => text.len(),
            Self::Json(value) => value.to_string().len(),
            Self::Bytes(bytes) => bytes.len(),
        };
        len as u64
    }
}

impl From<String> for ArtifactContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ArtifactContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<serde_json::Value> for ArtifactContent {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for ArtifactContent {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// A named asset produced alongside the main content (code, docs, specs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact name, unique within one output by convention.
    pub name: String,

    /// The artifact kind.
    #[serde(rename = "type")]
    pub kind: ArtifactKind,

    /// The payload.
    pub content: ArtifactContent,

    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Artifact {
    /// Creates a new artifact.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ArtifactKind,
        content: impl Into<ArtifactContent>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            content: content.into(),
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Bytes counted against the artifact budget: name plus content.
    #[must_use]
    pub fn budget_bytes(&self) -> u64 {
        self.name.len() as u64 + self.content.byte_len()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
