//! Cache-backed, rate-limited page downloading.
//!
//! This module fetches batches of pages for crawlers: each URL is served from
//! the on-disk cache when possible, otherwise fetched under a shared
//! requests-per-second budget, and every result is handed to a callback
//! that is never invoked concurrently with itself.
//!
//! # Features
//!
//! - Persistent URL-keyed page cache (one file per URL)
//! - Trailing one-second window rate limiting shared across batches
//! - Bounded in-flight requests via an admission gate
//! - Fixed-backoff retry on HTTP 429 and on dropped connections
//! - Exactly-once, serialized result delivery
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::download::Downloader;
//! use crawler_core::DownloaderConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(DownloaderConfig::default())?;
//! let urls = vec!["https://example.com/".to_string()];
//! downloader
//!     .download_all(&urls, |url, content| {
//!         println!("{url}: {} bytes", content.map_or(0, |c| c.len()));
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
pub mod constants;
mod engine;
mod error;
mod executor;
mod gate;
pub mod rate_limiter;
mod retry;

pub use cache::{CacheError, CacheStore, cache_key};
pub use client::{FetchResponse, HttpClient, PageFetcher};
pub use engine::{BatchResult, BatchStats, Downloader};
pub use error::DownloadError;
pub use executor::{FetchExecutor, ThrottleFlag};
pub use gate::{AdmissionGate, GatePermit};
pub use rate_limiter::RateLimiter;
pub use retry::{
    FailureType, ResponseClass, RetryDecision, RetryPolicy, classify_error, classify_status,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
