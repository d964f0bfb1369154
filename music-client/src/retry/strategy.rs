//! Bounded retry with linear backoff
//!
//! Attempts are numbered from zero. Attempt `n` that fails with a retryable
//! error is followed by a sleep of either the server's `Retry-After` hint or
//! `base_delay * (n + 1)`. There is no sleep after the final attempt and no
//! jitter.

use std::future::Future;
use std::time::Duration;

use echona_async_utils::{CancelErr, OrCancelExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClassifiedError, ErrorKind, RawFailure};
use crate::retry::with_deadline;

/// Retry budget and per-attempt deadline for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_attempts + 1`.
    pub max_attempts: u32,
    /// Unit of the linear backoff. Must be non-zero.
    pub base_delay: Duration,
    /// Deadline applied to each attempt separately. Must be non-zero.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            timeout,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(300),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Delay before the attempt following `attempt`.
pub fn backoff_delay(attempt: u32, error: &ClassifiedError, policy: &RetryPolicy) -> Duration {
    error
        .retry_after()
        .unwrap_or_else(|| policy.base_delay.saturating_mul(attempt.saturating_add(1)))
}

/// Execute `operation` under `policy`.
///
/// Every attempt is bounded by `policy.timeout`. Failures are classified;
/// permanent kinds return immediately, transient kinds are retried until the
/// budget is spent. The returned error is the classification of the last
/// failure.
///
/// Callers attach an operation label by instrumenting the returned future
/// with a span.
pub async fn execute<F, Fut, T>(operation: F, policy: &RetryPolicy) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, RawFailure>> + Send,
    T: Send,
{
    run(operation, policy, None).await
}

/// Like [`execute`], but abandons the call as soon as `cancel` fires.
///
/// Cancellation is observed before each attempt, during each attempt and
/// during each backoff sleep. A cancelled call fails as `NetworkError`.
pub async fn execute_cancellable<F, Fut, T>(
    operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, RawFailure>> + Send,
    T: Send,
{
    run(operation, policy, Some(cancel)).await
}

async fn run<F, Fut, T>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, RawFailure>> + Send,
    T: Send,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(cancelled(attempt));
        }

        let bounded = with_deadline(operation(), policy.timeout);
        let outcome = match cancel {
            Some(token) => match bounded.or_cancel(token).await {
                Ok(outcome) => outcome,
                Err(CancelErr::Cancelled) => return Err(cancelled(attempt)),
            },
            None => bounded.await,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(
                attempt,
                kind = %err.kind(),
                status = ?err.http_status(),
                "upstream call failed permanently"
            );
            return Err(err);
        }

        if attempt >= policy.max_attempts {
            warn!(
                attempts = policy.total_attempts(),
                kind = %err.kind(),
                status = ?err.http_status(),
                "upstream retries exhausted"
            );
            return Err(err);
        }

        let delay = backoff_delay(attempt, &err, policy);
        debug!(
            attempt,
            kind = %err.kind(),
            ?delay,
            "retrying upstream call"
        );

        let slept = tokio::time::sleep(delay);
        match cancel {
            Some(token) => {
                if slept.or_cancel(token).await.is_err() {
                    return Err(cancelled(attempt));
                }
            }
            None => slept.await,
        }

        attempt += 1;
    }
}

fn cancelled(attempt: u32) -> ClassifiedError {
    info!(attempt, "upstream call cancelled");
    ClassifiedError::new(ErrorKind::NetworkError, None)
}
