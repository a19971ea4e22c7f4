//! Logging setup and span helpers.

mod spans;
mod subscriber;

pub use spans::{run_span, stage_span};
pub use subscriber::init_tracing;
