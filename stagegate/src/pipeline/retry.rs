//! Exponential backoff with symmetric jitter.
//!
//! The delay before retry `n` (1-based) is `base * growth_factor^(n-1)`,
//! perturbed by a uniform factor in `±jitter_fraction` and floored at zero.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy with exponential backoff and jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in seconds.
    pub base_seconds: f64,
    /// Multiplier applied per further attempt.
    pub growth_factor: f64,
    /// Fraction of the delay used as jitter amplitude (`0.2` = ±20%).
    pub jitter_fraction: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_seconds: 0.25,
            growth_factor: 2.0,
            jitter_fraction: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Creates the default policy (3 attempts, 250ms base, x2, ±20%).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base_seconds = base.as_secs_f64();
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Sets the jitter fraction.
    #[must_use]
    pub fn with_jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction;
        self
    }

    /// Disables jitter, making delays deterministic.
    #[must_use]
    pub fn without_jitter(self) -> Self {
        self.with_jitter_fraction(0.0)
    }

    fn expected_seconds(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        self.base_seconds * self.growth_factor.powi(exponent)
    }

    /// The un-jittered delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn expected_delay(&self, attempt: u32) -> Duration {
        to_duration(self.expected_seconds(attempt))
    }

    /// The jittered delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let expected = self.expected_seconds(attempt);
        let jitter = if self.jitter_fraction > 0.0 {
            let unit: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
            expected * self.jitter_fraction * unit
        } else {
            0.0
        };
        to_duration(expected + jitter)
    }

    /// Sleeps for [`delay`](Self::delay) of `attempt`.
    pub async fn sleep(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Negative and NaN delays floor at zero; delays too large to represent
/// saturate at [`Duration::MAX`].
fn to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

/// Runs `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// Sleeps between attempts, never after the last one. The final error is
/// returned unchanged. A policy with zero attempts still runs once.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(
                    operation = label,
                    attempts = attempt,
                    error = %e,
                    "Giving up after final attempt"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay(attempt);
                tracing::debug!(
                    operation = label,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
