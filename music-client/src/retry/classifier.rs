//! Error classification for upstream failures
//!
//! Maps a [`RawFailure`] onto the closed [`ErrorKind`] taxonomy. Whether a
//! failure is retried is decided here and nowhere else.

use std::time::Duration;

use crate::error::{ClassifiedError, DEFAULT_RATE_LIMIT_DELAY, ErrorKind, RawFailure};

/// Classify a raw upstream failure.
///
/// | input         | kind                  |
/// |---------------|-----------------------|
/// | 401           | `Unauthorized`        |
/// | 403           | `Forbidden`           |
/// | 404           | `NotFound`            |
/// | 429           | `RateLimited`         |
/// | 500..=599     | `UpstreamServerError` |
/// | other status  | `UpstreamClientError` |
/// | network       | `NetworkError`        |
/// | timeout       | `Timeout`             |
/// | bad 2xx body  | `UpstreamServerError` |
pub fn classify(failure: &RawFailure) -> ClassifiedError {
    match failure {
        RawFailure::Status {
            status,
            retry_after,
        } => classify_status(*status, retry_after.as_deref()),
        RawFailure::Network(_) => ClassifiedError::new(ErrorKind::NetworkError, None),
        RawFailure::Timeout => ClassifiedError::new(ErrorKind::Timeout, None),
        RawFailure::Malformed(_) => ClassifiedError::new(ErrorKind::UpstreamServerError, None),
    }
}

fn classify_status(status: u16, retry_after: Option<&str>) -> ClassifiedError {
    let kind = match status {
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        429 => {
            return ClassifiedError::rate_limited(Some(status), parse_retry_after(retry_after));
        }
        500..=599 => ErrorKind::UpstreamServerError,
        _ => ErrorKind::UpstreamClientError,
    };
    ClassifiedError::new(kind, Some(status))
}

/// Longest server-requested pause honored before the next attempt.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Convert a `Retry-After` header (delta seconds) into a delay.
///
/// Missing, unparsable, non-finite and non-positive values all fall back to
/// [`DEFAULT_RATE_LIMIT_DELAY`]. Fractional seconds are honored. Hints above
/// [`MAX_RETRY_AFTER`] are clamped to it.
pub fn parse_retry_after(header: Option<&str>) -> Duration {
    header
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_or(MAX_RETRY_AFTER, |delay| delay.min(MAX_RETRY_AFTER))
        })
        .unwrap_or(DEFAULT_RATE_LIMIT_DELAY)
}
