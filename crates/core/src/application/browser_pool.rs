//! Browser session pool
//!
//! Bounds the number of concurrent browser-backed measurements and captures
//! across every job in the process. A checkout returns a [`BrowserLease`];
//! the session is returned to the pool when the lease drops, on every exit
//! path including adapter errors and panics.

use crate::port::CapabilityError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Clone)]
pub struct BrowserPool {
    permits: Arc<Semaphore>,
    size: usize,
    checkout_timeout: Duration,
}

/// Scoped browser session checkout
#[derive(Debug)]
pub struct BrowserLease {
    _permit: OwnedSemaphorePermit,
}

impl BrowserPool {
    pub fn new(size: usize, checkout_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            checkout_timeout,
        }
    }

    /// Wait for a free session, bounded by the checkout timeout
    pub async fn checkout(&self) -> Result<BrowserLease, CapabilityError> {
        let acquire = self.permits.clone().acquire_owned();
        match tokio::time::timeout(self.checkout_timeout, acquire).await {
            Ok(Ok(permit)) => {
                debug!(available = self.available(), "Browser session checked out");
                Ok(BrowserLease { _permit: permit })
            }
            Ok(Err(_)) => Err(CapabilityError::Unavailable(
                "browser pool closed".to_string(),
            )),
            Err(_) => Err(CapabilityError::Unavailable(format!(
                "no browser session free within {}ms",
                self.checkout_timeout.as_millis()
            ))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
