//! Execution Timeout Management
//!
//! Bounds how long a diagnostic subprocess may hold a request.

use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Upper bound accepted from configuration
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Returned when a future does not finish within its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Command execution timed out after {0:?}")]
pub struct TimedOut(pub Duration);

/// Execution timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTimeout {
    duration: Duration,
}

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self::short()
    }
}

impl ExecutionTimeout {
    /// Create a new execution timeout
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use admin_diagnostics::tools::ExecutionTimeout;
    ///
    /// let timeout = ExecutionTimeout::new(Duration::from_secs(30));
    /// assert_eq!(timeout.duration(), Duration::from_secs(30));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Quick operations (10 seconds, default)
    pub fn short() -> Self {
        Self::new(Duration::from_secs(10))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Drive `future` to completion or give up after the budget
    ///
    /// When the budget runs out the future is dropped. Child processes
    /// spawned with `kill_on_drop` are killed as part of that drop.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, TimedOut>
    where
        F: Future,
    {
        time::timeout(self.duration, future)
            .await
            .map_err(|_| TimedOut(self.duration))
    }
}
