//! Single-URL fetch with admission control and throttle handling.
//!
//! [`FetchExecutor::try_fetch`] runs one URL through the admission gate and
//! the rate limiter, issues the request, and loops on `429` responses. The
//! loop goes back through the gate and the limiter each time, so a throttled
//! URL competes for slots like any fresh one.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, instrument, warn};

use super::client::PageFetcher;
use super::engine::BatchStats;
use super::gate::AdmissionGate;
use super::rate_limiter::RateLimiter;
use super::retry::{ResponseClass, RetryDecision, RetryPolicy, classify_status};
use super::DownloadError;

/// Shared "paused on a 429" indicator.
///
/// Counts the tasks currently sleeping off a throttle response, so one task
/// finishing its backoff does not clear the flag for another still waiting.
#[derive(Debug, Default)]
pub struct ThrottleFlag {
    sleeping: AtomicUsize,
}

impl ThrottleFlag {
    /// Returns true while at least one fetch is backing off from a 429.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.sleeping.load(Ordering::SeqCst) > 0
    }

    fn pause(&self) -> PauseGuard<'_> {
        self.sleeping.fetch_add(1, Ordering::SeqCst);
        PauseGuard { flag: self }
    }
}

/// Clears one pause when dropped, including when the owning task is aborted.
struct PauseGuard<'a> {
    flag: &'a ThrottleFlag,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.flag.sleeping.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Performs page fetches for one downloader instance.
///
/// Cloning is cheap; every clone shares the same gate, limiter and pause flag.
#[derive(Clone)]
pub struct FetchExecutor {
    fetcher: Arc<dyn PageFetcher>,
    gate: AdmissionGate,
    rate_limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    throttle: Arc<ThrottleFlag>,
}

impl std::fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchExecutor")
            .field("gate", &self.gate)
            .field("rate_limiter", &self.rate_limiter)
            .field("policy", &self.policy)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl FetchExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        gate: AdmissionGate,
        rate_limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            gate,
            rate_limiter,
            policy,
            throttle: Arc::new(ThrottleFlag::default()),
        }
    }

    /// Returns true while any fetch is backing off from a 429.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.throttle.is_paused()
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `url`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(body))` on `200 OK`
    /// - `Ok(None)` on any other status, or when a capped throttle budget runs out
    ///
    /// # Errors
    ///
    /// Transport errors from the [`PageFetcher`] are passed through unchanged
    /// (the orchestrator decides whether a disconnect earns a retry).
    /// [`DownloadError::GateClosed`] if the admission gate's semaphore is closed.
    #[instrument(skip(self, stats), fields(url = %url))]
    pub async fn try_fetch(
        &self,
        url: &str,
        stats: &BatchStats,
    ) -> Result<Option<String>, DownloadError> {
        let mut throttled = 0u32;

        loop {
            let response = {
                let _permit = self.gate.acquire().await?;
                let waited = self.rate_limiter.admit().await;
                if !waited.is_zero() {
                    debug!(delay_ms = waited.as_millis(), "rate limited before request");
                }
                self.fetcher.get(url).await?
            };

            match classify_status(response.status) {
                ResponseClass::Success => return Ok(Some(response.body)),
                ResponseClass::Failed => {
                    warn!(status = response.status, "error fetching page");
                    return Ok(None);
                }
                ResponseClass::Throttled => {
                    throttled += 1;
                    match self.policy.after_throttle(throttled) {
                        RetryDecision::Retry { delay, attempt } => {
                            warn!(
                                attempt,
                                delay_ms = delay.as_millis(),
                                "server throttled request (429), pausing"
                            );
                            stats.increment_retried();
                            let _paused = self.throttle.pause();
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            warn!(%reason, "giving up on throttled page");
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }
}
