//! Retry logic with linear backoff
//!
//! This module provides:
//! - Error classification into a closed taxonomy (retryable vs permanent)
//! - A per-attempt deadline
//! - Linear backoff honoring server `Retry-After` hints
//! - Cancellation support via tokio `CancellationToken`

pub mod classifier;
pub mod deadline;
pub mod strategy;

pub use classifier::{MAX_RETRY_AFTER, classify, parse_retry_after};
pub use deadline::with_deadline;
pub use strategy::{RetryPolicy, backoff_delay, execute, execute_cancellable};
