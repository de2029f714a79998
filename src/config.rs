//! Downloader configuration.
//!
//! [`DownloaderConfig`] is the single knob set a [`Downloader`](crate::Downloader)
//! is built from. It is serde-friendly so callers can embed it in their own
//! configuration files, and validated once at construction time.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::download::constants::{
    DEFAULT_CONNECTION_ATTEMPTS, DEFAULT_DISCONNECT_BACKOFF, DEFAULT_DISCONNECT_RETRIES,
    DEFAULT_THROTTLE_BACKOFF,
};

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Default request rate (and concurrency) bound.
pub const DEFAULT_QPS: u32 = 10;

/// Minimum allowed qps value.
const MIN_QPS: u32 = 1;

/// Maximum allowed qps value.
const MAX_QPS: u32 = 1000;

/// Maximum allowed transport-level attempts per request.
const MAX_CONNECTION_ATTEMPTS: u32 = 10;

/// Error type for invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid qps value provided.
    #[error("invalid qps value {value}: must be between {MIN_QPS} and {MAX_QPS}")]
    InvalidQps {
        /// The invalid value that was provided.
        value: u32,
    },

    /// Invalid transport-level attempt count provided.
    #[error(
        "invalid connection_attempts value {value}: must be between 1 and {MAX_CONNECTION_ATTEMPTS}"
    )]
    InvalidConnectionAttempts {
        /// The invalid value that was provided.
        value: u32,
    },
}

/// Configuration for a [`Downloader`](crate::Downloader).
///
/// # Default Values
///
/// - `cache_dir`: `cache`
/// - `qps`: 10
/// - `throttle_backoff_ms`: 10 000
/// - `disconnect_backoff_ms`: 10 000
/// - `disconnect_retries`: 1
/// - `connection_attempts`: 3
/// - `max_throttle_retries`: unbounded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Directory holding one file per cached URL. `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Requests per second, also used as the in-flight request bound.
    pub qps: u32,
    /// Sleep after an HTTP 429 response, in milliseconds.
    pub throttle_backoff_ms: u64,
    /// Sleep before retrying a dropped connection, in milliseconds.
    pub disconnect_backoff_ms: u64,
    /// How many times a URL is retried after a dropped connection.
    pub disconnect_retries: u32,
    /// Transport-level attempts the HTTP client makes per request.
    pub connection_attempts: u32,
    /// Cap on 429 retries per URL. `None` retries for as long as the server throttles.
    pub max_throttle_retries: Option<u32>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
            qps: DEFAULT_QPS,
            throttle_backoff_ms: duration_ms(DEFAULT_THROTTLE_BACKOFF),
            disconnect_backoff_ms: duration_ms(DEFAULT_DISCONNECT_BACKOFF),
            disconnect_retries: DEFAULT_DISCONNECT_RETRIES,
            connection_attempts: DEFAULT_CONNECTION_ATTEMPTS,
            max_throttle_retries: None,
        }
    }
}

impl DownloaderConfig {
    /// Creates a configuration with the given cache directory and qps, defaults elsewhere.
    #[must_use]
    pub fn new(cache_dir: Option<PathBuf>, qps: u32) -> Self {
        Self {
            cache_dir,
            qps,
            ..Self::default()
        }
    }

    /// Sets the 429 backoff.
    #[must_use]
    pub fn with_throttle_backoff(mut self, backoff: Duration) -> Self {
        self.throttle_backoff_ms = duration_ms(backoff);
        self
    }

    /// Sets the disconnect backoff.
    #[must_use]
    pub fn with_disconnect_backoff(mut self, backoff: Duration) -> Self {
        self.disconnect_backoff_ms = duration_ms(backoff);
        self
    }

    /// Caps the number of 429 retries per URL.
    #[must_use]
    pub fn with_max_throttle_retries(mut self, max: u32) -> Self {
        self.max_throttle_retries = Some(max);
        self
    }

    /// Returns the 429 backoff as a duration.
    #[must_use]
    pub fn throttle_backoff(&self) -> Duration {
        Duration::from_millis(self.throttle_backoff_ms)
    }

    /// Returns the disconnect backoff as a duration.
    #[must_use]
    pub fn disconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.disconnect_backoff_ms)
    }

    /// Validates config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_QPS..=MAX_QPS).contains(&self.qps) {
            return Err(ConfigError::InvalidQps { value: self.qps });
        }
        if !(1..=MAX_CONNECTION_ATTEMPTS).contains(&self.connection_attempts) {
            return Err(ConfigError::InvalidConnectionAttempts {
                value: self.connection_attempts,
            });
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
