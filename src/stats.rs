use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between producers, the worker and the controller.
///
/// Every failure the pipeline absorbs ends up in one of these.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Records accepted into the queue.
    pub enqueued: AtomicU64,
    /// Records rejected by validation before reaching the queue.
    pub dropped_invalid: AtomicU64,
    /// Records still queued when a stopped pipeline discarded its queue.
    pub dropped_on_shutdown: AtomicU64,
    pub delivered_records: AtomicU64,
    pub delivered_batches: AtomicU64,
    /// Batches discarded after a fatal error or exhausted retries.
    pub failed_batches: AtomicU64,
    pub failed_records: AtomicU64,
    /// Send attempts beyond the first one, across all batches.
    pub retries: AtomicU64,
    /// Records drained from the queue whose batch has not resolved yet.
    pub in_flight: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn incr(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Overflow drops are counted by the queue itself and are filled in by
    /// the pipeline.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_overflow: 0,
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            dropped_on_shutdown: self.dropped_on_shutdown.load(Ordering::Relaxed),
            delivered_records: self.delivered_records.load(Ordering::Relaxed),
            delivered_batches: self.delivered_batches.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_records: self.failed_records.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    /// Records evicted or rejected because the queue was full.
    pub dropped_overflow: u64,
    pub dropped_invalid: u64,
    pub dropped_on_shutdown: u64,
    pub delivered_records: u64,
    pub delivered_batches: u64,
    pub failed_batches: u64,
    pub failed_records: u64,
    pub retries: u64,
}

impl StatsSnapshot {
    /// Records that will never reach the collector, whatever the reason.
    pub fn total_dropped(&self) -> u64 {
        self.dropped_overflow
            + self.dropped_invalid
            + self.dropped_on_shutdown
            + self.failed_records
    }
}
