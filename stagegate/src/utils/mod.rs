//! Small helpers shared across the engine: run ids, timestamps and
//! deterministic per-stage seeds.

mod ids;
mod seed;
pub mod timestamps;

pub use ids::{encode_run_id, generate_run_id};
pub use seed::seed_for;
pub use timestamps::{elapsed_ms, iso_timestamp, now_millis};
