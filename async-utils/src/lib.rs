//! Async utilities for racing futures against cancellation and deadlines.
//!
//! Provides two extension traits:
//! - [`OrCancelExt`] races a future against a tokio `CancellationToken`.
//! - [`OrDeadlineExt`] races a future against a relative deadline.
//!
//! In both cases the losing side is dropped before the call returns, so no
//! timer or in-flight future outlives the race.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error returned when a future is cancelled.
#[derive(Debug, PartialEq, Eq)]
pub enum CancelErr {
    Cancelled,
}

/// Error returned when a deadline elapses before the future settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineElapsed {
    /// The deadline that was exceeded.
    pub limit: Duration,
}

impl std::fmt::Display for DeadlineElapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline of {}ms elapsed", self.limit.as_millis())
    }
}

impl std::error::Error for DeadlineElapsed {}

/// Extension trait for making futures cancellable.
///
/// Returns `Err(CancelErr::Cancelled)` if the token is cancelled before the
/// future completes. A token that is already cancelled wins immediately.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CancelErr::Cancelled),
            res = self => Ok(res),
        }
    }
}

/// Extension trait for bounding a future by a deadline.
///
/// The timer is owned by the returned future: it is released when the race
/// settles either way, and the wrapped future is dropped if the deadline wins.
#[async_trait]
pub trait OrDeadlineExt: Sized {
    type Output;

    async fn or_deadline(self, limit: Duration) -> Result<Self::Output, DeadlineElapsed>;
}

#[async_trait]
impl<F> OrDeadlineExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_deadline(self, limit: Duration) -> Result<Self::Output, DeadlineElapsed> {
        tokio::time::timeout(limit, self)
            .await
            .map_err(|_| DeadlineElapsed { limit })
    }
}
