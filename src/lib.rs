//! Crawler Core Library
//!
//! This library provides the page downloader shared by the crawler tools:
//! a batch fetcher that honours a requests-per-second budget, serves
//! previously fetched pages from a persistent cache, retries throttled and
//! dropped requests, and delivers every result exactly once to a callback.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Downloader configuration and validation
//! - [`download`] - Cache store, rate limiter, admission gate, fetch executor
//!   and the batch orchestrator

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;

// Re-export commonly used types
pub use config::{ConfigError, DEFAULT_CACHE_DIR, DEFAULT_QPS, DownloaderConfig};
pub use download::{
    BatchResult, BatchStats, CacheStore, DownloadError, Downloader, FetchResponse, HttpClient,
    PageFetcher, RateLimiter, RetryPolicy,
};
