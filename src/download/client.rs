//! HTTP transport for page fetches.
//!
//! The executor talks to the network through the [`PageFetcher`] trait so
//! tests (and callers with their own transport) can swap the client out.
//! [`HttpClient`] is the reqwest-backed implementation; it retries dropped
//! connections a few times on its own before reporting
//! [`DownloadError::Disconnected`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, CONNECTION_RETRY_DELAY, DEFAULT_CONNECTION_ATTEMPTS, READ_TIMEOUT_SECS,
};
use super::error::DownloadError;

/// A status code plus body text. The body is only read for `200 OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body (empty for non-200 responses).
    pub body: String,
}

impl FetchResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }
}

/// Issues a single GET for a page.
///
/// This trait uses `async_trait` to support dynamic dispatch via `Arc<dyn PageFetcher>`.
/// Rust 2024 native async traits are not object-safe, so `async_trait` is required
/// for trait objects.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Performs the GET.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Disconnected`] for dropped or refused
    /// connections, other variants for non-retryable failures. HTTP error
    /// statuses are *not* errors; they come back in [`FetchResponse::status`].
    async fn get(&self, url: &str) -> Result<FetchResponse, DownloadError>;
}

/// reqwest-backed [`PageFetcher`] with transport-level retries.
///
/// This client is designed to be created once and reused for every batch,
/// taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    connection_attempts: u32,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts and attempt count.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 2 minutes
    /// - Transport attempts: 3
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connection_attempts(DEFAULT_CONNECTION_ATTEMPTS)
    }

    /// Creates a new HTTP client making up to `attempts` transport-level tries per request.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_connection_attempts(attempts: u32) -> Self {
        let client = base_client_builder(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            connection_attempts: attempts.max(1),
        }
    }

    /// Returns the transport-level attempt count.
    #[must_use]
    pub fn connection_attempts(&self) -> u32 {
        self.connection_attempts
    }

    async fn get_once(&self, url: &str) -> Result<FetchResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Ok(FetchResponse::new(status.as_u16(), String::new()));
        }
        let body = response.text().await?;
        Ok(FetchResponse::new(status.as_u16(), body))
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.get_once(url).await {
                Ok(response) => return Ok(response),
                Err(e) if is_connection_error(&e) => {
                    if attempt >= self.connection_attempts {
                        return Err(DownloadError::disconnected(url, e.to_string()));
                    }
                    debug!(
                        attempt,
                        max_attempts = self.connection_attempts,
                        error = %e,
                        "connection failed, retrying"
                    );
                    tokio::time::sleep(CONNECTION_RETRY_DELAY).await;
                }
                Err(e) => {
                    warn!(error = %e, "request failed");
                    return Err(DownloadError::network(url, e));
                }
            }
        }
    }
}

/// Errors where the server went away rather than answered badly.
fn is_connection_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request() || error.is_body()
}

fn base_client_builder(connect_timeout_secs: u64, read_timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(default_user_agent())
}

/// Default User-Agent for page requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("crawler/{version}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_default_attempts() {
        let client = HttpClient::new();
        assert_eq!(client.connection_attempts(), 3);
    }

    #[test]
    fn test_http_client_attempts_minimum_is_one() {
        let client = HttpClient::with_connection_attempts(0);
        assert_eq!(client.connection_attempts(), 1);
    }

    #[test]
    fn test_default_user_agent_has_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("crawler/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_fetch_response_ok_constructor() {
        let response = FetchResponse::ok("page");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "page");
    }

    #[tokio::test]
    async fn test_http_client_rejects_relative_url() {
        let client = HttpClient::new();
        let result = client.get("/relative/path").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }
}
