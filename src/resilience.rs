//! Resilience utilities: reconnect policy and bounded collaborator calls.
//!
//! - [`ReconnectPolicy`]: flat-interval, bounded retry for reconnects
//! - [`bounded`]: run a collaborator future under a timeout

use crate::error::{LifecycleError, Result};
use crate::store::StoreResult;
use std::any::Any;
use std::future::Future;
use std::time::Duration;

/// Reconnect retry policy.
///
/// Every attempt waits the same interval; there is no exponential growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed before the connection is marked `error`.
    pub max_attempts: u32,

    /// Delay before each attempt.
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::flat(3, Duration::from_millis(5000))
    }
}

impl ReconnectPolicy {
    pub fn flat(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Fast-fail policy for tests.
    pub fn testing() -> Self {
        Self::flat(3, Duration::from_millis(10))
    }

    /// Delay before the given attempt (1-based). Flat for every attempt.
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.interval
    }

    /// Whether `attempts` already used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    pub fn attempts_remaining(&self, attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts)
    }
}

/// Run a collaborator call under `limit`.
///
/// Store errors are mapped with `on_error`; an elapsed timeout becomes
/// [`LifecycleError::Timeout`].
pub async fn bounded<T, Fut>(
    store_id: &str,
    operation: &'static str,
    limit: Duration,
    fut: Fut,
    on_error: impl FnOnce(crate::store::StoreError) -> LifecycleError,
) -> Result<T>
where
    Fut: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(on_error(e)),
        Err(_) => Err(LifecycleError::Timeout {
            store_id: store_id.to_string(),
            operation,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
