//! Structured run events.
//!
//! Orchestrators report progress through an injected [`EventSink`]. Each
//! event has a type from [`kinds`] and a JSON object payload that always
//! carries the `run_id`.

mod jsonl;
mod sink;

pub use jsonl::JsonlEventSink;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the orchestrators.
pub mod kinds {
    /// A stage is about to run.
    pub const STEP_START: &str = "step_start";
    /// A producer attempt is starting.
    pub const STEP_ATTEMPT: &str = "step_attempt";
    /// An attempt was served from the output cache.
    pub const CACHE_HIT: &str = "cache_hit";
    /// A review rejected an attempt that has retries left.
    pub const STEP_REJECTED: &str = "step_rejected";
    /// A stage finished, approved or not.
    pub const STEP_COMPLETED: &str = "step_completed";
    /// A wave of independent stages is starting.
    pub const WAVE_START: &str = "wave_start";
    /// A stage or run failed.
    pub const ERROR: &str = "error";
    /// A post-step hook ran.
    pub const HOOK_COMPLETED: &str = "hook_completed";
    /// The run finished.
    pub const RUN_COMPLETED: &str = "run_completed";
}
