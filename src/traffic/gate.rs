//! # Concurrency Gate
//!
//! Bounds the number of origin calls in flight. A caller acquires a
//! [`Permit`] before talking to the origin and the permit is returned when it
//! is dropped, so the slot comes back on every exit path: success, error,
//! timeout or cancellation of the surrounding future.
//!
//! Waiters are served in FIFO order (tokio's semaphore is fair) and give up
//! with [`ProxyError::Busy`] once their deadline passes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::core::error::{ProxyError, ProxyResult};
use crate::observability::metrics;

/// A held slot of the gate; released on drop
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
    acquired_at: Instant,
}

impl Permit {
    /// How long this permit has been held
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let now = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_gate_in_flight(now);
    }
}

/// Counting gate over origin calls
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyGate {
    /// Create a gate with `capacity` slots; zero is treated as one
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a slot, giving up after the configured acquire timeout
    pub async fn acquire(&self) -> ProxyResult<Permit> {
        self.acquire_until(Instant::now() + self.acquire_timeout).await
    }

    /// Wait for a slot until `deadline`
    pub async fn acquire_until(&self, deadline: Instant) -> ProxyResult<Permit> {
        let started = Instant::now();

        match timeout_at(deadline, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                let waited = started.elapsed();
                if waited > Duration::from_millis(1) {
                    debug!(waited = ?waited, "Acquired origin slot after waiting");
                }
                Ok(self.wrap(permit))
            }
            // The semaphore is never closed; report it like exhaustion.
            Ok(Err(_)) | Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    waited_ms,
                    capacity = self.capacity,
                    "Timeout waiting for origin slot"
                );
                Err(ProxyError::Busy { waited_ms })
            }
        }
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<Permit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| self.wrap(permit))
    }

    /// Return a permit explicitly; equivalent to dropping it
    pub fn release(&self, permit: Permit) {
        drop(permit);
    }

    fn wrap(&self, permit: OwnedSemaphorePermit) -> Permit {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::set_gate_in_flight(now);
        Permit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
            acquired_at: Instant::now(),
        }
    }

    /// Number of permits currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of permits free right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
