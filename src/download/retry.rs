//! Response classification and retry policy for page fetches.
//!
//! # Overview
//!
//! Every HTTP answer is classified into a [`ResponseClass`]:
//! - [`ResponseClass::Success`] - `200 OK`, the body is the page
//! - [`ResponseClass::Throttled`] - `429 Too Many Requests`, wait and try again
//! - [`ResponseClass::Failed`] - anything else, give up on the URL
//!
//! Transport errors are classified into a [`FailureType`] with
//! [`classify_error`]. The [`RetryPolicy`] then decides whether a throttled
//! or disconnected URL gets another attempt, and after which delay. Both
//! delays are fixed; there is no exponential growth.
//!
//! # Example
//!
//! ```
//! use crawler_core::download::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//!
//! // A first disconnect earns one retry
//! assert!(matches!(policy.after_disconnect(1), RetryDecision::Retry { .. }));
//!
//! // A second one does not
//! assert!(matches!(policy.after_disconnect(2), RetryDecision::DoNotRetry { .. }));
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{
    DEFAULT_DISCONNECT_BACKOFF, DEFAULT_DISCONNECT_RETRIES, DEFAULT_THROTTLE_BACKOFF,
};
use crate::config::DownloaderConfig;

/// Classification of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// `200 OK`.
    Success,
    /// `429 Too Many Requests`.
    Throttled,
    /// Any other status. Not retried.
    Failed,
}

/// Classifies an HTTP status code.
///
/// Only an exact `200` counts as success; other 2xx codes carry no page
/// body worth caching.
#[must_use]
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200 => ResponseClass::Success,
        429 => ResponseClass::Throttled,
        _ => ResponseClass::Failed,
    }
}

/// Classification of fetch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The server dropped the connection; one more try may succeed.
    Transient,

    /// Retrying would not help (bad URL, protocol error).
    Permanent,

    /// The batch cannot continue (cache I/O, closed gate, crashed task).
    Fatal,
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Disconnected | Transient |
/// | Network, InvalidUrl | Permanent |
/// | Cache, GateClosed, TaskFailed, Config | Fatal |
///
/// The fatal set is the one reported by [`DownloadError::is_fatal`].
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    if error.is_fatal() {
        return FailureType::Fatal;
    }
    match error {
        DownloadError::Disconnected { .. } => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Decision on whether to retry a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry configuration for throttled and disconnected fetches.
///
/// # Default Values
///
/// - `throttle_backoff`: 10 seconds
/// - `max_throttle_retries`: unbounded
/// - `disconnect_backoff`: 10 seconds
/// - `disconnect_retries`: 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed wait after a 429.
    throttle_backoff: Duration,

    /// Optional cap on 429 retries for one URL.
    max_throttle_retries: Option<u32>,

    /// Fixed wait after a disconnect.
    disconnect_backoff: Duration,

    /// Retries granted after a disconnect.
    disconnect_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            throttle_backoff: DEFAULT_THROTTLE_BACKOFF,
            max_throttle_retries: None,
            disconnect_backoff: DEFAULT_DISCONNECT_BACKOFF,
            disconnect_retries: DEFAULT_DISCONNECT_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    #[must_use]
    pub fn new(
        throttle_backoff: Duration,
        max_throttle_retries: Option<u32>,
        disconnect_backoff: Duration,
        disconnect_retries: u32,
    ) -> Self {
        Self {
            throttle_backoff,
            max_throttle_retries,
            disconnect_backoff,
            disconnect_retries,
        }
    }

    /// Builds the policy described by a downloader configuration.
    #[must_use]
    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self::new(
            config.throttle_backoff(),
            config.max_throttle_retries,
            config.disconnect_backoff(),
            config.disconnect_retries,
        )
    }

    /// Returns the fixed 429 backoff.
    #[must_use]
    pub fn throttle_backoff(&self) -> Duration {
        self.throttle_backoff
    }

    /// Returns the 429 retry cap, if any.
    #[must_use]
    pub fn max_throttle_retries(&self) -> Option<u32> {
        self.max_throttle_retries
    }

    /// Returns the number of retries granted after a disconnect.
    #[must_use]
    pub fn disconnect_retries(&self) -> u32 {
        self.disconnect_retries
    }

    /// Decides whether to retry after the `throttled`-th consecutive 429.
    ///
    /// Without a cap this always retries.
    #[instrument(level = "trace", skip(self))]
    pub fn after_throttle(&self, throttled: u32) -> RetryDecision {
        if let Some(max) = self.max_throttle_retries {
            if throttled > max {
                debug!(throttled, max, "throttle retries exhausted");
                return RetryDecision::DoNotRetry {
                    reason: format!("still throttled after {max} retries"),
                };
            }
        }
        RetryDecision::Retry {
            delay: self.throttle_backoff,
            attempt: throttled + 1,
        }
    }

    /// Decides whether to retry after the `attempt`-th attempt ended in a disconnect.
    #[instrument(level = "trace", skip(self))]
    pub fn after_disconnect(&self, attempt: u32) -> RetryDecision {
        if attempt > self.disconnect_retries {
            return RetryDecision::DoNotRetry {
                reason: "repeated server disconnect".to_string(),
            };
        }
        RetryDecision::Retry {
            delay: self.disconnect_backoff,
            attempt: attempt + 1,
        }
    }
}
