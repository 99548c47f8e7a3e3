//! Process-wide admission control for outbound requests
//!
//! The RequestGate bounds how many HTTP calls may be in flight at once across
//! every retrieval in the process. Callers hold a [`GatePermit`] for exactly
//! one outbound call; dropping the permit returns it to the gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Global request gate shared across all retrievals
///
/// Cloning is cheap and every clone shares the same permits, so one gate can
/// be constructed at startup and handed to each [`PageClient`](crate::PageClient).
///
/// # Implementation
///
/// - `permits`: tokio semaphore holding the free capacity
/// - `outstanding`: permits currently held (acquired but not yet released)
/// - `peak`: highest value `outstanding` has reached
#[derive(Clone, Debug)]
pub struct RequestGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    outstanding: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// One acquired slot in the [`RequestGate`]
///
/// The slot is released when the permit is dropped, on every path including
/// errors and panics, so it can never be released twice or leaked.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    outstanding: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl RequestGate {
    /// Create a gate allowing at most `capacity` outstanding requests
    ///
    /// # Examples
    ///
    /// ```
    /// use wavy_history::request_gate::RequestGate;
    ///
    /// let gate = RequestGate::new(200);
    /// assert_eq!(gate.available(), 200);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            outstanding: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait until a permit is free and take it
    ///
    /// Dropping the returned future before it completes gives nothing back to
    /// the gate because nothing was taken.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Other("request gate closed".to_string()))?;
        Ok(self.track(permit))
    }

    /// Like [`acquire`](Self::acquire), but give up after `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<GatePermit> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    waited_ms = timeout.as_millis() as u64,
                    outstanding = self.outstanding(),
                    "Timed out waiting for a request permit"
                );
                Err(Error::PermitAcquisition { waited: timeout })
            }
        }
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits free right now
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Permits currently held
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Highest number of permits held at the same time since creation
    pub fn peak_outstanding(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        let now = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        GatePermit {
            _permit: permit,
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}
