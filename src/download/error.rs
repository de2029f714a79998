//! Error types for the download module.
//!
//! This module defines structured errors for page fetching and batch
//! orchestration. Per-URL failures (disconnects, bad URLs) are normally
//! absorbed by the orchestrator and surface to callers as absent content;
//! only the fatal variants escape [`Downloader::download_all`](super::Downloader::download_all).

use thiserror::Error;

use super::cache::CacheError;
use crate::config::ConfigError;

/// Errors that can occur while fetching pages.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The connection dropped (reset, refused, timed out) after all
    /// transport-level attempts. Retried once more by the orchestrator.
    #[error("server disconnected while fetching {url}: {reason}")]
    Disconnected {
        /// The URL being fetched.
        url: String,
        /// Description of the underlying transport failure.
        reason: String,
    },

    /// Non-retryable transport error (redirect loop, body decoding, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The provided URL is malformed or not absolute.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Cache read or write failed. Fatal to the batch.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The admission gate's semaphore reported closed. Nothing in the
    /// downloader closes it, so this indicates a broken invariant.
    #[error("admission gate closed unexpectedly")]
    GateClosed,

    /// A per-URL task panicked or was cancelled.
    #[error("download task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    /// Invalid downloader configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DownloadError {
    /// Creates a disconnect error.
    pub fn disconnected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Disconnected {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true if this error aborts the whole batch rather than a single URL.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cache(_) | Self::GateClosed | Self::TaskFailed(_) | Self::Config(_)
        )
    }
}
