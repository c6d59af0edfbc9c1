//! Deadline-bounded execution
//!
//! [`DeadlineGuard::run`] bounds how long the *caller* waits. The operation is
//! spawned onto the runtime and awaited with a timer; when the timer fires the
//! caller gets [`GuardError::Timeout`] while the operation keeps running until
//! it finishes on its own. Its eventual result is discarded.
//!
//! The timer belongs to the `tokio::time::timeout` future and is dropped on
//! every exit path, so no pending timers outlive a call.

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Failure of a guarded operation
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The deadline passed before the operation produced a result
    #[error("operation exceeded its deadline of {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The operation finished in time with its own error
    #[error("{0}")]
    Operation(E),

    /// The operation task panicked or was aborted
    #[error("operation task failed: {0}")]
    Aborted(String),
}

impl<E> GuardError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GuardError::Timeout(_))
    }
}

/// Bounds caller wait time for backing-store queries
#[derive(Debug, Clone, Copy)]
pub struct DeadlineGuard {
    default_timeout: Duration,
}

impl DeadlineGuard {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `operation` with the default timeout
    pub async fn run_default<F, T, E>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.run(operation, self.default_timeout).await
    }

    /// Run `operation`, releasing the caller after at most `timeout`
    pub async fn run<F, T, E>(&self, operation: F, timeout: Duration) -> Result<T, GuardError<E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let started = Instant::now();
        // Dropping the JoinHandle on timeout detaches the task instead of
        // cancelling it.
        let handle = tokio::spawn(operation);

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(GuardError::Operation(err)),
            Ok(Err(join_err)) => Err(GuardError::Aborted(join_err.to_string())),
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Guarded operation exceeded deadline, releasing caller"
                );
                Err(GuardError::Timeout(timeout))
            }
        }
    }
}
