use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LogConfig};

/// Installs a global `tracing` subscriber configured by `config`.
///
/// `RUST_LOG`, when set, overrides `config.filter`. Output is
/// human-readable unless `config.json` is set. Returns `Ok(false)` when a
/// subscriber was already installed, so calling this repeatedly is
/// harmless.
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed.
pub fn init_tracing(config: &LogConfig) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| ConfigError::InvalidFilter(format!("{}: {e}", config.filter)))?,
    };

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok()
    };
    Ok(installed)
}
