//! Wall-clock timeouts for producer work.
//!
//! The work runs on its own tokio task. When the deadline passes the caller
//! gets [`ExecutionError::TimedOut`] immediately, but the task is **not**
//! aborted: it keeps running detached until it finishes on its own. A
//! watcher task logs its late outcome so failures after the deadline still
//! show up in the logs.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

/// Failure of the execution itself, as opposed to an error of the work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// The deadline passed before the work finished.
    #[error("operation timed out after {seconds}s")]
    TimedOut {
        /// The timeout that was exceeded.
        seconds: f64,
    },

    /// The work panicked.
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// The worker task was cancelled, usually by runtime shutdown.
    #[error("operation was cancelled")]
    Cancelled,
}

impl From<JoinError> for ExecutionError {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            return Self::Cancelled;
        }
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(message)
    }
}

/// `None` when the timeout is too large to represent, which waits forever.
fn deadline(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0)).ok()
}

async fn run_detaching<F, T, L>(future: F, seconds: f64, on_late: L) -> Result<T, ExecutionError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    L: FnOnce(Result<T, JoinError>) + Send + 'static,
{
    let mut handle: JoinHandle<T> = tokio::spawn(future);
    let Some(limit) = deadline(seconds) else {
        return handle.await.map_err(ExecutionError::from);
    };

    match tokio::time::timeout(limit, &mut handle).await {
        Ok(joined) => joined.map_err(ExecutionError::from),
        Err(_) => {
            tokio::spawn(async move { on_late(handle.await) });
            Err(ExecutionError::TimedOut { seconds })
        }
    }
}

/// Runs `future` on a worker task, waiting at most `seconds`.
///
/// An infinite (or unrepresentably large) timeout waits forever; negative
/// or NaN values behave like zero. The worker's output is returned unchanged.
pub async fn run_with_timeout<F, T>(future: F, seconds: f64) -> Result<T, ExecutionError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    run_detaching(future, seconds, move |late| match late {
        Ok(_) => tracing::debug!(timeout_s = seconds, "Detached task finished after timeout"),
        Err(e) => tracing::warn!(timeout_s = seconds, error = %e, "Detached task failed after timeout"),
    })
    .await
}

/// Like [`run_with_timeout`] for fallible work: errors the work produces
/// after the deadline are logged at `warn` with `label`.
pub async fn run_fallible_with_timeout<F, T, E>(
    future: F,
    seconds: f64,
    label: String,
) -> Result<Result<T, E>, ExecutionError>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    run_detaching(future, seconds, move |late| match late {
        Ok(Ok(_)) => tracing::debug!(
            task = %label,
            timeout_s = seconds,
            "Detached task finished after timeout; result discarded"
        ),
        Ok(Err(e)) => tracing::warn!(
            task = %label,
            timeout_s = seconds,
            error = %e,
            "Detached task failed after timeout"
        ),
        Err(e) => tracing::warn!(
            task = %label,
            timeout_s = seconds,
            error = %e,
            "Detached task panicked after timeout"
        ),
    })
    .await
}
