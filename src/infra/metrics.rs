//! Lock-free counters for synchronization activity
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector shared by the aggregator and synchronizer
pub struct SyncMetrics {
    /// Live data updates that changed the stored value (monotonic)
    updates_changed: AtomicU64,
    /// Live data updates whose content hash matched the stored one (monotonic)
    updates_unchanged: AtomicU64,
    /// Records targeting an entity absent from the graph (monotonic)
    unknown_entity: AtomicU64,
    /// Records rejected by the validator (monotonic)
    invalid_livedata: AtomicU64,
    /// Update transactions that failed and were swallowed (monotonic)
    transaction_faults: AtomicU64,
    /// Batch records that failed to apply (monotonic)
    batch_failures: AtomicU64,
    /// Entity graph rebuilds (monotonic)
    graph_rebuilds: AtomicU64,
    /// Duration of the most recent rebuild in microseconds
    last_rebuild_us: AtomicU64,
    started_at: Instant,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSummary {
    pub updates_changed: u64,
    pub updates_unchanged: u64,
    pub unknown_entity: u64,
    pub invalid_livedata: u64,
    pub transaction_faults: u64,
    pub batch_failures: u64,
    pub graph_rebuilds: u64,
    pub last_rebuild_us: u64,
    pub uptime_secs: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            updates_changed: AtomicU64::new(0),
            updates_unchanged: AtomicU64::new(0),
            unknown_entity: AtomicU64::new(0),
            invalid_livedata: AtomicU64::new(0),
            transaction_faults: AtomicU64::new(0),
            batch_failures: AtomicU64::new(0),
            graph_rebuilds: AtomicU64::new(0),
            last_rebuild_us: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_changed(&self) {
        self.updates_changed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unchanged(&self) {
        self.updates_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_entity(&self) {
        self.unknown_entity.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid(&self) {
        self.invalid_livedata.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transaction_fault(&self) {
        self.transaction_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch_failure(&self) {
        self.batch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self, duration_us: u64) {
        self.graph_rebuilds.fetch_add(1, Ordering::Relaxed);
        self.last_rebuild_us.store(duration_us, Ordering::Relaxed);
    }

    pub fn graph_rebuilds(&self) -> u64 {
        self.graph_rebuilds.load(Ordering::Relaxed)
    }

    /// Snapshot all counters without resetting them
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            updates_changed: self.updates_changed.load(Ordering::Relaxed),
            updates_unchanged: self.updates_unchanged.load(Ordering::Relaxed),
            unknown_entity: self.unknown_entity.load(Ordering::Relaxed),
            invalid_livedata: self.invalid_livedata.load(Ordering::Relaxed),
            transaction_faults: self.transaction_faults.load(Ordering::Relaxed),
            batch_failures: self.batch_failures.load(Ordering::Relaxed),
            graph_rebuilds: self.graph_rebuilds.load(Ordering::Relaxed),
            last_rebuild_us: self.last_rebuild_us.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            updates_changed = %self.updates_changed,
            updates_unchanged = %self.updates_unchanged,
            unknown_entity = %self.unknown_entity,
            invalid_livedata = %self.invalid_livedata,
            transaction_faults = %self.transaction_faults,
            batch_failures = %self.batch_failures,
            graph_rebuilds = %self.graph_rebuilds,
            last_rebuild_us = %self.last_rebuild_us,
            uptime_secs = %self.uptime_secs,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SyncMetrics::new();
        metrics.record_changed();
        metrics.record_changed();
        metrics.record_unchanged();
        metrics.record_invalid();
        metrics.record_rebuild(1500);

        let summary = metrics.summary();
        assert_eq!(summary.updates_changed, 2);
        assert_eq!(summary.updates_unchanged, 1);
        assert_eq!(summary.invalid_livedata, 1);
        assert_eq!(summary.graph_rebuilds, 1);
        assert_eq!(summary.last_rebuild_us, 1500);
        assert_eq!(summary.transaction_faults, 0);
    }

    #[test]
    fn test_summary_does_not_reset() {
        let metrics = SyncMetrics::new();
        metrics.record_batch_failure();
        assert_eq!(metrics.summary().batch_failures, 1);
        assert_eq!(metrics.summary().batch_failures, 1);
    }
}
