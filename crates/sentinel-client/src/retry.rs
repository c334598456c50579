//! Bounded retry with reconnect hook
//!
//! [`retry_on_failure`] drives every transport-touching operation in this
//! crate. The loop is strictly sequential: classify, sleep, run the failure
//! hook, then re-run the operation. A retried operation therefore never executes
//! against the transport that just failed.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, warn};

use crate::classify::{classify, ErrorClass};
use crate::error::{ClientError, ClientResult};

/// Boxed future returned by retryable operations and failure hooks
pub type OpFuture<'a, T> = Pin<Box<dyn Future<Output = ClientResult<T>> + Send + 'a>>;

/// Failure hook invoked between retryable attempts
///
/// This is where a connection tears down its broken transport and installs
/// a fresh one. An error returned from the hook aborts the retry loop and
/// propagates to the caller.
pub type FailureHook<'h, 'f> = &'h mut (dyn FnMut() -> OpFuture<'f, ()> + Send);

/// How often an operation is attempted and how long to pause in between
///
/// `max_attempts` counts *re*tries: an operation is run `max_attempts + 1`
/// times in total, and `max_attempts == 0` means "try once, no retries".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first failed attempt
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Run `operation`, retrying classified-retryable failures up to the policy
/// budget.
///
/// Per failed attempt, in order: the failure is classified (fatal failures
/// propagate unmodified, immediately, without invoking the hook); the
/// policy delay elapses (skipped entirely when `max_attempts == 0`, since
/// there is no further attempt to pace); the failure hook runs. The hook
/// runs on every retryable failure, including the one that exhausts the
/// budget: recovery is always attempted before giving up.
///
/// # Errors
///
/// Returns the original error for fatal failures, the hook's error if
/// recovery itself failed, or [`ClientError::RetryLimitExceeded`] carrying
/// the attempt count and the last retryable failure once the budget is
/// spent. Callers can rely on never seeing a bare intermediate failure.
pub async fn retry_on_failure<'op, 'f, T>(
    policy: &RetryPolicy,
    mut operation: impl FnMut() -> OpFuture<'op, T> + Send,
    mut on_failure: Option<FailureHook<'_, 'f>>,
) -> ClientResult<T>
where
    T: Send + 'op,
{
    let mut attempt: u32 = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let class = classify(&error);
        if !class.is_retryable() {
            return Err(error);
        }

        debug!(attempt, error = %error, ?class, "retryable failure");

        if policy.max_attempts != 0 {
            tokio::time::sleep(policy.delay).await;
        }

        if let Some(hook) = on_failure.as_mut() {
            hook().await?;
        }

        if attempt >= policy.max_attempts {
            let attempts = attempt + 1;
            warn!(attempts, error = %error, "retry budget exhausted");
            return Err(ClientError::RetryLimitExceeded {
                attempts,
                source: Box::new(error),
            });
        }

        attempt += 1;
    }
}
