//! Shared run state.
//!
//! The [`StateStore`] is the key-value map stages read their inputs from and
//! write their results to. Keys are flat strings, conventionally prefixed
//! with the stage name (`draft.content`, `draft.review`, ...).

mod diff;
mod render;
mod store;

pub use diff::{diff_summary, DiffSummary};
pub use render::render_task;
pub use store::{StateSnapshot, StateStore};

/// Builds the conventional `<stage>.<field>` state key.
#[must_use]
pub fn stage_key(stage: &str, field: &str) -> String {
    format!("{stage}.{field}")
}
