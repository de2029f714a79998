use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crawler_core::{DownloadError, FetchResponse, PageFetcher};

/// In-process fetcher serving a fixed page map and recording every request.
///
/// Unknown URLs answer 404. Individual URLs can be given a fixed status.
pub struct StubFetcher {
    pages: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    latency: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubFetcher {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, page)| ((*url).to_string(), (*page).to_string()))
                .collect(),
            statuses: HashMap::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// The three-page fixture used by the end-to-end tests.
    pub fn fake_pages() -> Self {
        Self::new(&[("url1", "page1"), ("url2", "page2"), ("url3", "page3")])
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn pages(&self) -> HashMap<String, Option<String>> {
        self.pages
            .iter()
            .map(|(url, page)| (url.clone(), Some(page.clone())))
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.pages.keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        self.calls.lock().expect("calls lock").push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(status) = self.statuses.get(url) {
            return Ok(FetchResponse::new(*status, ""));
        }
        Ok(match self.pages.get(url) {
            Some(page) => FetchResponse::ok(page.clone()),
            None => FetchResponse::new(404, ""),
        })
    }
}

/// Detects overlapping callback invocations.
#[derive(Default)]
pub struct OverlapDetector {
    inside: AtomicBool,
    overlaps: AtomicUsize,
}

impl OverlapDetector {
    pub fn enter(&self) {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn exit(&self) {
        self.inside.store(false, Ordering::SeqCst);
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}
