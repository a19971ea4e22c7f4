use tracing::Span;

/// Span covering a whole run.
#[must_use]
pub fn run_span(run_id: &str, mode: &str) -> Span {
    tracing::info_span!("run", run_id, mode)
}

/// Span covering one stage of a run.
#[must_use]
pub fn stage_span(run_id: &str, stage: &str, producer: &str, category: &str) -> Span {
    tracing::info_span!("stage", run_id, stage, producer, category)
}
