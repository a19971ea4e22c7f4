//! Assertions over run results.

use crate::errors::ReasonCode;
use crate::pipeline::RunResult;

/// Asserts that `stage` ran and was approved.
pub fn assert_stage_approved(result: &RunResult, stage: &str) {
    let step = result
        .step(stage)
        .unwrap_or_else(|| panic!("Expected stage '{stage}' in history, got {:?}", stage_names(result)));
    assert!(
        step.approved,
        "Expected stage '{stage}' to be approved, got {:?} with score {}",
        step.error_reason, step.score
    );
}

/// Asserts that `stage` ran and failed with `reason`.
pub fn assert_stage_failed(result: &RunResult, stage: &str, reason: ReasonCode) {
    let step = result
        .step(stage)
        .unwrap_or_else(|| panic!("Expected stage '{stage}' in history, got {:?}", stage_names(result)));
    assert!(!step.approved, "Expected stage '{stage}' to fail, but it was approved");
    assert_eq!(
        step.error_reason,
        Some(reason),
        "Unexpected failure reason for stage '{stage}'"
    );
}

/// Asserts the exact order of the history.
pub fn assert_history_order(result: &RunResult, expected: &[&str]) {
    assert_eq!(stage_names(result), expected, "Unexpected history order");
}

/// Asserts that `first` appears in the history before `second`.
pub fn assert_ran_before(result: &RunResult, first: &str, second: &str) {
    let names = stage_names(result);
    let position = |name: &str| {
        names
            .iter()
            .position(|n| *n == name)
            .unwrap_or_else(|| panic!("Expected stage '{name}' in history, got {names:?}"))
    };
    assert!(
        position(first) < position(second),
        "Expected '{first}' to run before '{second}', got {names:?}"
    );
}

/// Asserts that the final state contains `key`.
pub fn assert_state_has(result: &RunResult, key: &str) {
    assert!(
        result.state.contains_key(key),
        "Expected state to contain '{key}'. Keys: {:?}",
        result.state.keys().collect::<Vec<_>>()
    );
}

fn stage_names(result: &RunResult) -> Vec<&str> {
    result.history.iter().map(|s| s.stage.as_str()).collect()
}
