//! Error taxonomy for outbound upstream calls.
//!
//! Every failure that leaves this crate's upstream layer is a
//! [`ClassifiedError`]: one of eight [`ErrorKind`]s plus a fixed,
//! caller-safe message. Raw transport failures are captured as
//! [`RawFailure`] and normalized by [`crate::retry::classify`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delay used for a rate-limited response that carries no usable hint.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(500);

/// Closed set of upstream failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    Timeout,
    UpstreamServerError,
    UpstreamClientError,
    NetworkError,
}

impl ErrorKind {
    /// Transient kinds are retried by the retry engine; permanent kinds
    /// surface on first occurrence.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::Timeout
                | ErrorKind::UpstreamServerError
                | ErrorKind::NetworkError
        )
    }

    /// True for the kinds that trigger the app-level search fallback.
    pub fn is_authorization(self) -> bool {
        matches!(self, ErrorKind::Unauthorized | ErrorKind::Forbidden)
    }

    /// Fixed caller-facing template. Upstream bodies never reach callers.
    pub fn caller_message(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Authorization expired. Reconnect your account to continue.",
            ErrorKind::Forbidden => {
                "This action requires a Premium account or additional permissions."
            }
            ErrorKind::NotFound => "The requested resource or device was not found.",
            ErrorKind::RateLimited => "The service is rate limiting requests. Please retry shortly.",
            ErrorKind::Timeout => "The upstream service did not respond in time.",
            ErrorKind::UpstreamServerError => "The upstream service is temporarily unavailable.",
            ErrorKind::UpstreamClientError => "The upstream service rejected the request.",
            ErrorKind::NetworkError => "Could not reach the upstream service.",
        }
    }

    /// HTTP status a route handler should answer with for this kind.
    pub fn response_status(self) -> u16 {
        match self {
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::Timeout => 504,
            ErrorKind::UpstreamServerError | ErrorKind::NetworkError => 503,
            ErrorKind::UpstreamClientError => 502,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UpstreamServerError => "upstream_server_error",
            ErrorKind::UpstreamClientError => "upstream_client_error",
            ErrorKind::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized upstream failure.
///
/// `retryable` and `caller_message` are derived from `kind`; `retry_after`
/// is only ever present for [`ErrorKind::RateLimited`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.kind.caller_message())]
pub struct ClassifiedError {
    kind: ErrorKind,
    http_status: Option<u16>,
    retry_after: Option<Duration>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, http_status: Option<u16>) -> Self {
        let retry_after = (kind == ErrorKind::RateLimited).then_some(DEFAULT_RATE_LIMIT_DELAY);
        Self {
            kind,
            http_status,
            retry_after,
        }
    }

    pub fn rate_limited(http_status: Option<u16>, retry_after: Duration) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            http_status,
            retry_after: Some(retry_after),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Absent for network and timeout failures.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Server-requested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn caller_message(&self) -> &'static str {
        self.kind.caller_message()
    }
}

/// An upstream failure before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// Non-success HTTP response. `retry_after` is the raw `Retry-After`
    /// header value, if the server sent one.
    Status {
        status: u16,
        retry_after: Option<String>,
    },
    /// Connection refused, DNS failure, reset or aborted transfer.
    Network(String),
    /// A deadline elapsed before the upstream answered.
    Timeout,
    /// A success response whose body could not be decoded.
    Malformed(String),
}

impl RawFailure {
    pub fn status(status: u16) -> Self {
        RawFailure::Status {
            status,
            retry_after: None,
        }
    }

    /// Captures status and retry hint from an error response. The body is
    /// deliberately not read.
    pub fn from_response(response: &reqwest::Response) -> Self {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        RawFailure::Status {
            status: response.status().as_u16(),
            retry_after,
        }
    }
}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawFailure::Status { status, .. } => write!(f, "upstream responded with HTTP {status}"),
            RawFailure::Network(detail) => write!(f, "network failure: {detail}"),
            RawFailure::Timeout => f.write_str("upstream timed out"),
            RawFailure::Malformed(detail) => write!(f, "malformed upstream response: {detail}"),
        }
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RawFailure::Timeout
        } else if err.is_decode() {
            RawFailure::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            RawFailure::status(status.as_u16())
        } else {
            RawFailure::Network(err.without_url().to_string())
        }
    }
}
