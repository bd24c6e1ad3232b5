//! Coordinator counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters recorded by a coordinator.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    queries: AtomicU64,
    requeries: AtomicU64,
    writes: AtomicU64,
    failed_writes: AtomicU64,
    publishes: AtomicU64,
    suppressed_publishes: AtomicU64,
    dropped_deliveries: AtomicU64,
}

/// Point-in-time copy of [`CoordinatorMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Query callables run under the lock (single-shot and immediate emissions).
    pub queries: u64,
    /// Live query re-executions after a debounce window closed.
    pub requeries: u64,
    /// Write callables run under the lock.
    pub writes: u64,
    /// Write callables that failed or were skipped by the write executor.
    pub failed_writes: u64,
    /// Descriptions published to the bus.
    pub publishes: u64,
    /// Successful writes that published nothing.
    pub suppressed_publishes: u64,
    /// Live results dropped because the subscription was cancelled.
    pub dropped_deliveries: u64,
}

impl CoordinatorMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_requery(&self) {
        self.requeries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, failed: bool) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed_publish(&self) {
        self.suppressed_publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_delivery(&self) {
        self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            requeries: self.requeries.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            suppressed_publishes: self.suppressed_publishes.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
        }
    }
}
