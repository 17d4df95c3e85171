//! Bounded retry policy for ledger reads
//!
//! Every wait in the engine goes through a [`RetryPolicy`] with an explicit
//! attempt ceiling. Exhaustion is reported to the caller, never looped on.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use super::rpc_errors::{RpcManagerError, RpcResult};

/// Retry policy `{max_attempts, backoff}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Policy used for address-table read-back after creation
    pub fn table_poll() -> Self {
        Self::new(20, Duration::from_millis(500))
    }
}

/// Retry an async operation while its error is retryable
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> RpcResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RpcResult<T>>,
{
    let start_time = Instant::now();
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            sleep(policy.backoff).await;
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                "Retrying operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_retryable() => {
                warn!(operation = operation_name, error = %err, "Permanent error, not retrying");
                return Err(err);
            }
            Err(err) => {
                debug!(operation = operation_name, attempt = attempt + 1, error = %err, "Transient error");
                last_error = Some(err);
            }
        }
    }

    warn!(
        operation = operation_name,
        attempts = policy.max_attempts,
        "All retry attempts exhausted"
    );
    Err(last_error.unwrap_or_else(|| {
        RpcManagerError::Internal(format!("{operation_name}: retry policy allows no attempts"))
    }))
}

/// Poll until the operation yields `Some`
///
/// `Ok(None)` from the operation and retryable errors count as "not yet".
/// Returns `Ok(None)` when the attempt ceiling is reached; non-retryable
/// errors end the poll immediately.
pub async fn poll_until<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> RpcResult<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RpcResult<Option<T>>>,
{
    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            sleep(policy.backoff).await;
        }

        match operation(attempt + 1).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {
                debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    "Not visible yet"
                );
            }
            Err(err) if err.is_retryable() => {
                debug!(operation = operation_name, attempt = attempt + 1, error = %err, "Transient error while polling");
            }
            Err(err) => return Err(err),
        }
    }

    warn!(
        operation = operation_name,
        attempts = policy.max_attempts,
        "Poll attempts exhausted"
    );
    Ok(None)
}
