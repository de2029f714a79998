//! Rolling-window rate limiting for page requests.
//!
//! This module provides the [`RateLimiter`] struct which caps how many
//! requests may *start* in any trailing one-second window, independent of how
//! many are still in flight.
//!
//! # Overview
//!
//! Admission timestamps are kept oldest-first. Before each admission decision
//! the limiter lazily drops timestamps that have left the window; if the
//! window is still full it sleeps until the oldest one expires, then records
//! the new admission.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use crawler_core::download::RateLimiter;
//!
//! # async fn example() {
//! // At most 2 requests per second
//! let limiter = Arc::new(RateLimiter::new(2));
//!
//! // First two requests proceed immediately
//! limiter.admit().await;
//! limiter.admit().await;
//!
//! // Third request waits until the first leaves the window
//! limiter.admit().await;
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::constants::RATE_WINDOW;

/// Trailing-window request rate limiter.
///
/// This struct is designed to be wrapped in `Arc` and shared across every
/// per-URL task of a downloader, and it outlives individual batches so the
/// rate budget carries over between `download_all` calls.
///
/// # Thread Safety
///
/// The prune/check/record sequence runs under a `tokio::sync::Mutex` that is
/// held across the wait, so concurrent callers queue up and are admitted one
/// at a time. Two callers can never both observe the same free slot.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum admissions per window.
    qps: usize,

    /// Window width (one second outside of tests).
    window: Duration,

    /// Admission instants, oldest first.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter admitting at most `qps` requests per second.
    ///
    /// A `qps` of zero is treated as one.
    #[must_use]
    #[instrument(level = "debug")]
    pub fn new(qps: u32) -> Self {
        Self::with_window(qps, RATE_WINDOW)
    }

    /// Creates a rate limiter with a custom window width.
    #[must_use]
    pub fn with_window(qps: u32, window: Duration) -> Self {
        let qps = usize::try_from(qps.max(1)).unwrap_or(usize::MAX);
        debug!(qps, window_ms = window.as_millis(), "creating rate limiter");
        Self {
            qps,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(qps.min(1024))),
        }
    }

    /// Returns the configured admissions per window.
    #[must_use]
    pub fn qps(&self) -> usize {
        self.qps
    }

    /// Waits until a request may start, then records it.
    ///
    /// Returns the time spent waiting.
    #[instrument(level = "trace", skip(self))]
    pub async fn admit(&self) -> Duration {
        let start = Instant::now();
        let mut timestamps = self.timestamps.lock().await;

        loop {
            let now = Instant::now();
            prune(&mut timestamps, now, self.window);

            if timestamps.len() < self.qps {
                break;
            }

            // Window is full: the oldest admission is the next one to expire.
            let Some(&oldest) = timestamps.front() else {
                break;
            };
            let sleep_for = (oldest + self.window).saturating_duration_since(now);
            debug!(
                in_window = timestamps.len(),
                delay_ms = sleep_for.as_millis(),
                "rate limit reached, waiting"
            );
            tokio::time::sleep(sleep_for).await;
        }

        timestamps.push_back(Instant::now());
        start.elapsed()
    }

    /// Returns how many admissions are recorded, without pruning.
    #[cfg(test)]
    async fn recorded(&self) -> usize {
        self.timestamps.lock().await.len()
    }
}

/// Drops timestamps that are at least one window old.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = timestamps.front() {
        if now.saturating_duration_since(oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
