//! Counting admission control for in-flight fetches.
//!
//! [`AdmissionGate`] bounds how many requests may be executing at once. It is
//! separate from the [`RateLimiter`](super::RateLimiter): the limiter caps
//! request *starts* per second, the gate caps requests that have started but
//! not yet finished.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use super::DownloadError;

/// Semaphore-backed gate with a fixed number of permits.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    permits: usize,
}

/// A held admission slot. The slot is returned when this value is dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Creates a gate with `permits` slots (at least one).
    #[must_use]
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
        }
    }

    /// Returns the total number of slots.
    #[must_use]
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Returns the number of slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::GateClosed`] if the semaphore reports itself
    /// closed. The downloader never closes it; the gate outlives every batch.
    pub async fn acquire(&self) -> Result<GatePermit, DownloadError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| DownloadError::GateClosed)?;
        trace!(available = self.available(), "admission slot acquired");
        Ok(GatePermit { _permit: permit })
    }
}
