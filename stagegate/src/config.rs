//! Orchestrator configuration.
//!
//! Everything is passed explicitly at construction. [`OrchestratorConfig::from_env`]
//! reads the `ORCH_*` variables once for callers that want 12-factor style
//! configuration; nothing in the engine reads the environment on its own.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::BackoffPolicy;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable held an unparsable value.
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A log filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Engine-wide settings shared by both orchestrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Producer timeout when neither policy nor producer sets one.
    pub default_timeout_seconds: f64,
    /// Whether the output cache is consulted and filled.
    pub use_cache: bool,
    /// Concurrent stages per wave.
    pub max_workers: usize,
    /// Root directory for file checkpoints. Unset keeps checkpoints in
    /// memory unless a store is injected.
    pub checkpoint_root: Option<PathBuf>,
    /// JSON Lines event log, if any.
    pub event_log_path: Option<PathBuf>,
    /// Pause between review-rejected attempts, if any.
    pub review_backoff: Option<BackoffPolicy>,
    /// Retry policy for checkpoint saves.
    pub checkpoint_retry: BackoffPolicy,
    /// Logging settings.
    pub log: LogConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 60.0,
            use_cache: true,
            max_workers: 4,
            checkpoint_root: None,
            event_log_path: None,
            review_backoff: None,
            checkpoint_retry: BackoffPolicy::new()
                .with_max_attempts(3)
                .with_base(Duration::from_millis(50))
                .with_growth_factor(2.0)
                .with_jitter_fraction(0.2),
            log: LogConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Enables or disables the output cache.
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Sets the wave concurrency (at least 1).
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Keeps checkpoints as files under `root`.
    #[must_use]
    pub fn with_checkpoint_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.checkpoint_root = Some(root.into());
        self
    }

    /// Sets the event log path.
    #[must_use]
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log_path = Some(path.into());
        self
    }

    /// Sets the backoff between rejected attempts.
    #[must_use]
    pub fn with_review_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.review_backoff = Some(policy);
        self
    }

    /// Sets the checkpoint save retry policy.
    #[must_use]
    pub fn with_checkpoint_retry(mut self, policy: BackoffPolicy) -> Self {
        self.checkpoint_retry = policy;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Reads overrides from the process environment.
    ///
    /// Recognized variables: `ORCH_TIMEOUT` (seconds), `ORCH_USE_CACHE`
    /// (bool), `ORCH_MAX_WORKERS`, `ORCH_CHECKPOINT_ROOT`, `ORCH_EVENTLOG`,
    /// `ORCH_LOG_JSON` (bool). Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first variable with an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first variable with an unparsable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("ORCH_TIMEOUT") {
            let seconds: f64 = raw
                .trim()
                .parse()
                .map_err(|e| invalid("ORCH_TIMEOUT", &raw, e))?;
            if seconds.is_nan() || seconds < 0.0 {
                return Err(invalid("ORCH_TIMEOUT", &raw, "must be non-negative"));
            }
            config.default_timeout_seconds = seconds;
        }
        if let Some(raw) = lookup("ORCH_USE_CACHE") {
            config.use_cache = parse_bool("ORCH_USE_CACHE", &raw)?;
        }
        if let Some(raw) = lookup("ORCH_MAX_WORKERS") {
            let workers: usize = raw
                .trim()
                .parse()
                .map_err(|e| invalid("ORCH_MAX_WORKERS", &raw, e))?;
            if workers == 0 {
                return Err(invalid("ORCH_MAX_WORKERS", &raw, "must be at least 1"));
            }
            config.max_workers = workers;
        }
        if let Some(raw) = lookup("ORCH_CHECKPOINT_ROOT") {
            config.checkpoint_root = (!raw.trim().is_empty()).then(|| PathBuf::from(raw));
        }
        if let Some(raw) = lookup("ORCH_EVENTLOG") {
            config.event_log_path = (!raw.trim().is_empty()).then(|| PathBuf::from(raw));
        }
        if let Some(raw) = lookup("ORCH_LOG_JSON") {
            config.log.json = parse_bool("ORCH_LOG_JSON", &raw)?;
        }
        Ok(config)
    }
}

fn invalid(var: &str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected a boolean")),
    }
}
