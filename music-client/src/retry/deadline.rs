//! Per-attempt deadline.

use std::future::Future;
use std::time::Duration;

use echona_async_utils::OrDeadlineExt;

use crate::error::{ClassifiedError, RawFailure};
use crate::retry::classify;

/// Run `operation` with an upper bound of `timeout`.
///
/// The deadline timer and the operation are both owned by the returned
/// future; whichever side loses the race is dropped before this returns.
/// An elapsed deadline classifies as `Timeout`, any other failure goes
/// through [`classify`].
pub async fn with_deadline<F, T>(operation: F, timeout: Duration) -> Result<T, ClassifiedError>
where
    F: Future<Output = Result<T, RawFailure>> + Send,
    T: Send,
{
    match operation.or_deadline(timeout).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(classify(&failure)),
        Err(_elapsed) => Err(classify(&RawFailure::Timeout)),
    }
}
