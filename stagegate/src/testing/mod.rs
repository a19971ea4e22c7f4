//! Testing utilities for stagegate pipelines.
//!
//! This module provides:
//! - Mock producers, reviewers and hooks
//! - Fixtures for registries, stages and summaries
//! - Assertions over run results

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_history_order, assert_ran_before, assert_stage_approved, assert_stage_failed,
    assert_state_has,
};
pub use mocks::{
    EchoProducer, EmptyProducer, FailingProducer, FailingReviewer, FixedReviewer, RecordingHook,
    ScriptedReviewer, SlowProducer, StaticProducer,
};
