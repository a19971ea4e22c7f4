//! Core data model shared by producers, reviewers and orchestrators.
//!
//! - [`ProducerOutput`] with its [`Artifact`]s and [`OutputMetadata`]
//! - [`ReviewVerdict`] and the typed [`Feedback`] derived from it

mod artifact;
mod output;
mod verdict;

pub use artifact::{Artifact, ArtifactContent, ArtifactKind};
pub use output::{OutputMetadata, ProducerOutput};
pub use verdict::{Feedback, ReviewVerdict, Severity};
