//! Ready-made registries, stages and summaries.

use std::sync::Arc;

use super::{FixedReviewer, StaticProducer};
use crate::pipeline::{PipelineStage, StepSummary, DEFAULT_CATEGORY};
use crate::errors::ReasonCode;
use crate::stages::{ProducerRegistry, ReviewerRegistry};

/// Producer name registered by [`registries`].
pub const PRODUCER: &str = "writer";

/// Reviewer name registered by [`registries`].
pub const REVIEWER: &str = "editor";

/// A producer registry with a [`StaticProducer`] under [`PRODUCER`] and a
/// reviewer registry with an approving [`FixedReviewer`] under
/// [`REVIEWER`].
#[must_use]
pub fn registries() -> (ProducerRegistry, ReviewerRegistry) {
    (
        ProducerRegistry::new().with(PRODUCER, Arc::new(StaticProducer::new(PRODUCER, "text"))),
        ReviewerRegistry::new().with(REVIEWER, Arc::new(FixedReviewer::approving(REVIEWER, 0.95))),
    )
}

/// A stage using [`PRODUCER`] and [`REVIEWER`].
#[must_use]
pub fn stage(name: &str) -> PipelineStage {
    PipelineStage::new(name, PRODUCER, REVIEWER, format!("Write the {name} section"))
}

/// One stage per name, in order, without dependencies.
#[must_use]
pub fn linear_stages(names: &[&str]) -> Vec<PipelineStage> {
    names.iter().map(|name| stage(name)).collect()
}

/// A summary for `stage`; failed summaries carry `exhausted_retries`.
#[must_use]
pub fn summary(stage: &str, approved: bool) -> StepSummary {
    StepSummary {
        stage: stage.to_string(),
        producer: PRODUCER.to_string(),
        reviewer: REVIEWER.to_string(),
        category: DEFAULT_CATEGORY.to_string(),
        approved,
        score: if approved { 0.95 } else { 0.5 },
        error_reason: (!approved).then_some(ReasonCode::ExhaustedRetries),
        attempts: 1,
        cache_hits: 0,
        duration_ms: 0,
    }
}
