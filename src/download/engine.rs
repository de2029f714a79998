//! Batch download orchestration with a serialized result callback.
//!
//! This module provides the [`Downloader`] which fetches a batch of URLs
//! concurrently, serves previously fetched pages from the [`CacheStore`], and
//! hands every result to a caller-supplied callback exactly once.
//!
//! # Overview
//!
//! Each URL gets its own Tokio task that either reads the cache or runs the
//! [`FetchExecutor`], then pushes a [`BatchResult`] onto an unbounded
//! channel. The calling task is the single consumer: it pops results in
//! completion order and runs the callback, so two callback invocations never
//! overlap and the callback may freely mutate captured state.
//!
//! The channel closes once every producer has dropped its sender, which only
//! happens after the producer has finished. When `recv` reports the channel
//! closed, every result has been delivered.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use crawler_core::{Downloader, DownloaderConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(DownloaderConfig::default())?;
//! let urls = vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()];
//!
//! let mut pages = HashMap::new();
//! let stats = downloader
//!     .download_all(&urls, |url, content| {
//!         pages.insert(url, content);
//!     })
//!     .await?;
//! println!("fetched {}, cached {}, failed {}", stats.fetched(), stats.cached(), stats.failed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::cache::CacheStore;
use super::client::{HttpClient, PageFetcher};
use super::executor::FetchExecutor;
use super::gate::AdmissionGate;
use super::rate_limiter::RateLimiter;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::DownloadError;
use crate::config::DownloaderConfig;

/// One delivered result: the URL and its page, or `None` on permanent failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// The submitted URL.
    pub url: String,
    /// Page body, absent when the URL failed permanently.
    pub content: Option<String>,
}

/// Statistics from a `download_all` call.
///
/// Uses atomic counters for thread-safe updates from concurrent per-URL tasks.
#[derive(Debug, Default)]
pub struct BatchStats {
    cached: AtomicUsize,
    fetched: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

impl BatchStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of URLs served from the cache.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cached.load(Ordering::SeqCst)
    }

    /// Returns the number of URLs fetched from the network.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    /// Returns the number of URLs delivered without content.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of retries (429 and disconnect) made.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns the total number of URLs resolved.
    #[must_use]
    pub fn total(&self) -> usize {
        self.cached() + self.fetched() + self.failed()
    }

    fn increment_cached(&self) {
        self.cached.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Self {
        Self {
            cached: AtomicUsize::new(self.cached()),
            fetched: AtomicUsize::new(self.fetched()),
            failed: AtomicUsize::new(self.failed()),
            retried: AtomicUsize::new(self.retried()),
        }
    }
}

/// Cache-backed, rate-limited batch downloader.
///
/// The cache, the rate limiter and the admission gate belong to the
/// instance and persist across `download_all` calls, so the request budget
/// carries over from one batch to the next. Per-batch state (channel, tasks)
/// is created fresh for each call.
///
/// # Concurrency Model
///
/// - Each URL runs in its own Tokio task
/// - Fetches acquire an admission slot (at most `qps` in flight) and then a
///   rate-limiter admission (at most `qps` started per trailing second)
/// - The callback runs only on the task that called `download_all`
///
/// # Retry Behavior
///
/// - `429` responses are retried after a fixed backoff, unbounded unless
///   `max_throttle_retries` is configured
/// - A dropped connection is retried once after a fixed backoff
/// - Any other non-200 status is a permanent failure delivered as `None`
#[derive(Debug, Clone)]
pub struct Downloader {
    cache: CacheStore,
    executor: FetchExecutor,
    qps: u32,
}

impl Downloader {
    /// Creates a downloader using the reqwest-backed [`HttpClient`].
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Config`] for invalid settings and
    /// [`DownloadError::Cache`] if the cache directory cannot be created.
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let client = HttpClient::with_connection_attempts(config.connection_attempts);
        Self::with_fetcher(config, Arc::new(client))
    }

    /// Creates a downloader that issues requests through `fetcher`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    #[instrument(level = "debug", skip(fetcher))]
    pub fn with_fetcher(
        config: DownloaderConfig,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, DownloadError> {
        config.validate()?;

        let cache = match &config.cache_dir {
            Some(dir) => CacheStore::open(dir)?,
            None => CacheStore::disabled(),
        };
        let rate_limiter = Arc::new(RateLimiter::new(config.qps));
        let gate = AdmissionGate::new(usize::try_from(config.qps).unwrap_or(usize::MAX));
        let policy = RetryPolicy::from_config(&config);

        debug!(
            qps = config.qps,
            cache_enabled = cache.is_enabled(),
            max_throttle_retries = ?policy.max_throttle_retries(),
            "creating downloader"
        );

        Ok(Self {
            cache,
            executor: FetchExecutor::new(fetcher, gate, rate_limiter, policy),
            qps: config.qps,
        })
    }

    /// Returns the configured qps.
    #[must_use]
    pub fn qps(&self) -> u32 {
        self.qps
    }

    /// Returns the cache store.
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Returns true while any fetch is backing off from a `429`.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.executor.is_paused()
    }

    /// Resolves every URL and delivers each result to `callback`.
    ///
    /// `callback(url, content)` is invoked exactly once per submitted URL
    /// (duplicates included), in completion order, never concurrently with
    /// itself. The call returns after every URL has been delivered.
    ///
    /// # Errors
    ///
    /// Per-URL failures never error; they are delivered as `None`. A cache
    /// read/write failure or a crashed task aborts the remaining tasks and is
    /// returned once the results already queued have been delivered.
    #[instrument(skip(self, urls, callback), fields(urls = urls.len()))]
    pub async fn download_all<F>(
        &self,
        urls: &[String],
        mut callback: F,
    ) -> Result<BatchStats, DownloadError>
    where
        F: FnMut(String, Option<String>),
    {
        let stats = Arc::new(BatchStats::new());
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchResult>();
        let mut tasks = JoinSet::new();

        info!("starting batch");

        for url in urls {
            let url = url.clone();
            let tx = tx.clone();
            let cache = self.cache.clone();
            let executor = self.executor.clone();
            let stats = Arc::clone(&stats);

            tasks.spawn(async move {
                let content = fetch_or_cache(&cache, &executor, &url, &stats).await?;
                // The receiver lives until the batch is drained or aborted.
                let _ = tx.send(BatchResult { url, content });
                Ok::<(), DownloadError>(())
            });
        }

        // Producers hold the only remaining senders.
        drop(tx);

        let mut delivered = 0usize;
        let mut fatal: Option<DownloadError> = None;

        loop {
            tokio::select! {
                biased;

                Some(result) = rx.recv() => {
                    delivered += 1;
                    callback(result.url, result.content);
                }
                Some(joined) = tasks.join_next(), if fatal.is_none() && !tasks.is_empty() => {
                    let failure = match joined {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(e),
                        Err(join_error) => Some(DownloadError::TaskFailed(join_error)),
                    };
                    if let Some(error) = failure {
                        warn!(error = %error, "fatal error, aborting batch");
                        tasks.abort_all();
                        fatal = Some(error);
                    }
                }
                else => break,
            }
        }

        if let Some(error) = fatal {
            return Err(error);
        }

        let stats = stats.snapshot();
        info!(
            delivered,
            cached = stats.cached(),
            fetched = stats.fetched(),
            failed = stats.failed(),
            retried = stats.retried(),
            "batch complete"
        );
        Ok(stats)
    }
}

/// Serves `url` from the cache or fetches it, applying the disconnect retry.
///
/// Only fatal errors escape; everything else becomes `Ok(None)`.
async fn fetch_or_cache(
    cache: &CacheStore,
    executor: &FetchExecutor,
    url: &str,
    stats: &BatchStats,
) -> Result<Option<String>, DownloadError> {
    if cache.has(url).await? {
        debug!(url, "found cache entry");
        let content = cache.get(url).await?;
        stats.increment_cached();
        return Ok(Some(content));
    }

    debug!(url, "downloading");
    let content = download_with_retry(executor, url, stats).await?;
    match content {
        Some(body) => {
            cache.put(url, &body).await?;
            stats.increment_fetched();
            Ok(Some(body))
        }
        None => {
            stats.increment_failed();
            Ok(None)
        }
    }
}

/// Runs the executor, retrying after a dropped connection per the policy.
async fn download_with_retry(
    executor: &FetchExecutor,
    url: &str,
    stats: &BatchStats,
) -> Result<Option<String>, DownloadError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match executor.try_fetch(url, stats).await {
            Ok(content) => return Ok(content),
            Err(e) => e,
        };

        match classify_error(&error) {
            FailureType::Fatal => return Err(error),
            FailureType::Permanent => {
                warn!(url, error = %error, "failed to download page");
                return Ok(None);
            }
            FailureType::Transient => match executor.policy().after_disconnect(attempt) {
                RetryDecision::Retry { delay, attempt } => {
                    info!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "server disconnected, we might have hit a crawler blocker; retrying"
                    );
                    stats.increment_retried();
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(url, %reason, "failed to download page");
                    return Ok(None);
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::download::FetchResponse;

    /// Serves a fixed page map and records every requested URL.
    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, FetchResponse>,
        disconnects: Mutex<HashMap<String, usize>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with_pages(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| ((*url).to_string(), FetchResponse::ok(*body)))
                    .collect(),
                ..Self::default()
            }
        }

        fn disconnect_first(self, url: &str, times: usize) -> Self {
            self.disconnects
                .lock()
                .unwrap()
                .insert(url.to_string(), times);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
            self.calls.lock().unwrap().push(url.to_string());
            {
                let mut disconnects = self.disconnects.lock().unwrap();
                if let Some(remaining) = disconnects.get_mut(url) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(DownloadError::disconnected(url, "stub reset"));
                    }
                }
            }
            Ok(self
                .pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| FetchResponse::new(404, "")))
        }
    }

    fn config(dir: Option<&TempDir>, qps: u32) -> DownloaderConfig {
        DownloaderConfig::new(dir.map(|d| d.path().to_path_buf()), qps)
            .with_disconnect_backoff(Duration::from_millis(10))
            .with_throttle_backoff(Duration::from_millis(10))
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| (*u).to_string()).collect()
    }

    #[test]
    fn test_downloader_rejects_invalid_qps() {
        let result = Downloader::with_fetcher(
            DownloaderConfig::new(None, 0),
            Arc::new(StubFetcher::default()),
        );
        assert!(matches!(result, Err(DownloadError::Config(_))));
    }

    #[tokio::test]
    async fn test_download_all_empty_batch() {
        let downloader =
            Downloader::with_fetcher(config(None, 10), Arc::new(StubFetcher::default())).unwrap();
        let mut calls = 0;
        let stats = downloader.download_all(&[], |_, _| calls += 1).await.unwrap();
        assert_eq!(calls, 0);
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_download_all_delivers_each_url_once() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::with_pages(&[("u1", "p1"), ("u2", "p2")]));
        let downloader = Downloader::with_fetcher(config(Some(&temp), 10), fetcher).unwrap();

        let mut seen = Vec::new();
        let stats = downloader
            .download_all(&urls(&["u1", "u2", "u3"]), |url, content| {
                seen.push((url, content));
            })
            .await
            .unwrap();

        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("u1".to_string(), Some("p1".to_string())),
                ("u2".to_string(), Some("p2".to_string())),
                ("u3".to_string(), None),
            ]
        );
        assert_eq!(stats.fetched(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.total(), 3);
    }

    #[tokio::test]
    async fn test_download_all_second_batch_served_from_cache() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::with_pages(&[("u1", "p1")]));
        let downloader = Downloader::with_fetcher(config(Some(&temp), 10), fetcher.clone()).unwrap();

        downloader.download_all(&urls(&["u1"]), |_, _| {}).await.unwrap();
        let stats = downloader
            .download_all(&urls(&["u1"]), |_, content| {
                assert_eq!(content.as_deref(), Some("p1"));
            })
            .await
            .unwrap();

        assert_eq!(stats.cached(), 1);
        assert_eq!(fetcher.calls(), vec!["u1".to_string()]);
        assert!(downloader.cache().has("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_download_all_failures_are_not_cached() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::default());
        let downloader = Downloader::with_fetcher(config(Some(&temp), 10), fetcher.clone()).unwrap();

        downloader.download_all(&urls(&["gone"]), |_, _| {}).await.unwrap();
        downloader.download_all(&urls(&["gone"]), |_, _| {}).await.unwrap();

        assert!(!downloader.cache().has("gone").await.unwrap());
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_download_all_retries_disconnect_once() {
        let fetcher = Arc::new(StubFetcher::with_pages(&[("u1", "p1")]).disconnect_first("u1", 1));
        let downloader = Downloader::with_fetcher(config(None, 10), fetcher.clone()).unwrap();

        let mut delivered = Vec::new();
        let stats = downloader
            .download_all(&urls(&["u1"]), |url, content| delivered.push((url, content)))
            .await
            .unwrap();

        assert_eq!(delivered, vec![("u1".to_string(), Some("p1".to_string()))]);
        assert_eq!(fetcher.calls().len(), 2);
        assert_eq!(stats.retried(), 1);
    }

    #[tokio::test]
    async fn test_download_all_second_disconnect_is_permanent() {
        let fetcher = Arc::new(StubFetcher::with_pages(&[("u1", "p1")]).disconnect_first("u1", 2));
        let downloader = Downloader::with_fetcher(config(None, 10), fetcher.clone()).unwrap();

        let mut delivered = Vec::new();
        downloader
            .download_all(&urls(&["u1"]), |url, content| delivered.push((url, content)))
            .await
            .unwrap();

        assert_eq!(delivered, vec![("u1".to_string(), None)]);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_download_all_duplicate_urls_each_delivered() {
        let fetcher = Arc::new(StubFetcher::with_pages(&[("u1", "p1")]));
        let downloader = Downloader::with_fetcher(config(None, 10), fetcher).unwrap();

        let mut count = 0;
        downloader
            .download_all(&urls(&["u1", "u1"]), |_, _| count += 1)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_download_all_unreadable_cache_entry_is_fatal() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::with_pages(&[("u1", "p1")]));
        let downloader = Downloader::with_fetcher(config(Some(&temp), 10), fetcher).unwrap();

        // A directory where the entry file should be: has() is true, get() cannot read it.
        let entry = downloader.cache().entry_path("u1").unwrap();
        std::fs::create_dir(&entry).unwrap();
        std::fs::write(entry.join("blocker"), "x").unwrap();

        let result = downloader.download_all(&urls(&["u1"]), |_, _| {}).await;
        assert!(matches!(result, Err(DownloadError::Cache(_))));
    }

    #[tokio::test]
    async fn test_download_all_cache_lookup_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache");
        let fetcher = Arc::new(StubFetcher::with_pages(&[("u1", "p1")]));
        let config = DownloaderConfig::new(Some(dir.clone()), 10);
        let downloader = Downloader::with_fetcher(config, fetcher.clone()).unwrap();

        std::fs::remove_dir(&dir).unwrap();
        std::fs::write(&dir, "not a directory").unwrap();

        let result = downloader.download_all(&urls(&["u1"]), |_, _| {}).await;
        assert!(matches!(result, Err(DownloadError::Cache(_))));
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_batch_stats_total() {
        let stats = BatchStats::new();
        stats.increment_cached();
        stats.increment_fetched();
        stats.increment_fetched();
        stats.increment_failed();
        stats.increment_retried();
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.retried(), 1);
        assert_eq!(stats.snapshot().fetched(), 2);
    }
}
