//! Per-principal concurrency gauge.
//!
//! Each principal gets its own semaphore sized to its in-flight ceiling. A
//! slot is held by a [`ConcurrencyPermit`] and given back when the permit is
//! dropped, so the gauge can neither leak nor go negative.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Per-principal concurrency limiter
#[derive(Debug, Default)]
pub struct ConcurrencyLimiter {
    gauges: DashMap<String, Gauge>,
}

#[derive(Debug, Clone)]
struct Gauge {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Gauge {
    fn new(limit: Option<u32>) -> Self {
        let capacity = limit.map_or(Semaphore::MAX_PERMITS, |l| l as usize);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    fn in_flight(&self) -> u32 {
        let used = self.capacity - self.semaphore.available_permits();
        u32::try_from(used).unwrap_or(u32::MAX)
    }
}

impl ConcurrencyLimiter {
    /// Create an empty limiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a slot without waiting.
    ///
    /// `limit` is only read the first time a principal is seen; limits are
    /// fixed for the life of the process. On failure the current gauge value
    /// is returned.
    pub fn try_acquire(&self, principal: &str, limit: Option<u32>) -> Result<ConcurrencyPermit, u32> {
        let gauge = self
            .gauges
            .entry(principal.to_string())
            .or_insert_with(|| Gauge::new(limit))
            .clone();

        match Arc::clone(&gauge.semaphore).try_acquire_owned() {
            Ok(permit) => {
                debug!(
                    principal = %principal,
                    in_flight = gauge.in_flight(),
                    "Concurrency slot acquired"
                );
                Ok(ConcurrencyPermit {
                    _permit: permit,
                    principal: principal.to_string(),
                })
            }
            Err(_) => Err(gauge.in_flight()),
        }
    }

    /// Current in-flight count for a principal
    #[must_use]
    pub fn in_flight(&self, principal: &str) -> u32 {
        self.gauges.get(principal).map_or(0, |g| g.in_flight())
    }

    /// In-flight requests across every principal
    #[must_use]
    pub fn total_in_flight(&self) -> u64 {
        self.gauges.iter().map(|g| u64::from(g.in_flight())).sum()
    }
}

/// One occupied concurrency slot; released on drop
#[derive(Debug)]
pub struct ConcurrencyPermit {
    _permit: OwnedSemaphorePermit,
    principal: String,
}

impl ConcurrencyPermit {
    /// Principal holding the slot
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        debug!(principal = %self.principal, "Concurrency slot released");
    }
}
