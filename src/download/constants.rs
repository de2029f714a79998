//! Constants for the download module (intervals, retry counts, cache key budget).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes; pages are small compared to file downloads).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Width of the trailing window the rate limiter counts admissions in.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Fixed sleep after a server answers 429 Too Many Requests.
pub const DEFAULT_THROTTLE_BACKOFF: Duration = Duration::from_secs(10);

/// Fixed sleep before retrying a URL whose connection was dropped.
pub const DEFAULT_DISCONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// Retries the orchestrator grants a URL after a disconnect.
pub const DEFAULT_DISCONNECT_RETRIES: u32 = 1;

/// Transport-level attempts made by the HTTP client before reporting a disconnect.
pub const DEFAULT_CONNECTION_ATTEMPTS: u32 = 3;

/// Pause between transport-level attempts inside the HTTP client.
pub const CONNECTION_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Filename length budget shared by the cache directory path and the cache key.
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Character that stands in for `/` in cache keys.
pub const PATH_SEPARATOR_REPLACEMENT: char = '_';
