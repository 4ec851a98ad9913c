use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batch::Batch;
use crate::config::{Credentials, PipelineConfig};
use crate::queue::BoundedQueue;
use crate::record::LogRecord;
use crate::retry::{deliver, DeliveryOutcome, RetryPolicy};
use crate::stats::PipelineStats;
use crate::transport::Transport;

/// Reply channel of a flush request; receives `true` when every batch of
/// the cut was delivered.
pub(crate) type FlushRequest = oneshot::Sender<bool>;

/// Background task that cuts batches out of the queue and hands them to the
/// transport, one at a time and in order.
pub(crate) struct BatchWorker {
    queue: Arc<BoundedQueue>,
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    retry: RetryPolicy,
    batch_max_count: usize,
    batch_max_bytes: usize,
    batch_max_age: Duration,
    flush_interval: Duration,
    stats: Arc<PipelineStats>,
    /// Signalled by producers when the queue reaches the batch size or
    /// receives its first record.
    wake: Arc<Notify>,
    flush_rx: mpsc::UnboundedReceiver<FlushRequest>,
    shutdown: CancellationToken,
}

impl BatchWorker {
    pub(crate) fn new(
        config: &PipelineConfig,
        queue: Arc<BoundedQueue>,
        transport: Arc<dyn Transport>,
        stats: Arc<PipelineStats>,
        wake: Arc<Notify>,
        flush_rx: mpsc::UnboundedReceiver<FlushRequest>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            transport,
            credentials: config.credentials.clone(),
            retry: RetryPolicy::from(config),
            batch_max_count: config.batch_max_count,
            batch_max_bytes: config.batch_max_bytes,
            batch_max_age: config.batch_max_age,
            flush_interval: config.flush_interval,
            stats,
            wake,
            flush_rx,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("log delivery worker started");
        let mut last_cut = Instant::now();

        loop {
            let deadline = self.next_deadline(last_cut);
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(reply) = self.flush_rx.recv() => {
                    let ok = self.flush_queued().await;
                    last_cut = Instant::now();
                    if reply.send(ok).is_err() {
                        debug!("flush requester went away before completion");
                    }
                }

                _ = self.wake.notified() => {
                    while self.queue.len() >= self.batch_max_count && !self.shutdown.is_cancelled() {
                        self.cut_and_send().await;
                        last_cut = Instant::now();
                    }
                }

                _ = sleep_until(deadline) => {
                    if !self.queue.is_empty() {
                        self.cut_and_send().await;
                    }
                    last_cut = Instant::now();
                }
            }
        }

        debug!(pending = self.queue.len(), "log delivery worker draining");
        let ok = self.drain_all().await;

        self.flush_rx.close();
        while let Ok(reply) = self.flush_rx.try_recv() {
            let _ = reply.send(ok);
        }
        debug!("log delivery worker stopped");
    }

    /// Earliest of the flush interval since the last cut and the age limit
    /// of the oldest queued record.
    fn next_deadline(&self, last_cut: Instant) -> Instant {
        let interval_deadline = last_cut + self.flush_interval;
        match self.queue.oldest_enqueued_at() {
            Some(oldest) => interval_deadline.min(oldest + self.batch_max_age),
            None => interval_deadline,
        }
    }

    async fn cut_and_send(&self) -> bool {
        let records = self.queue.drain(self.batch_max_count);
        self.send_records(records).await
    }

    /// Deliver what was queued when the flush request was picked up.
    async fn flush_queued(&self) -> bool {
        let mut remaining = self.queue.len();
        let mut ok = true;
        while remaining > 0 {
            let records = self.queue.drain(remaining.min(self.batch_max_count));
            if records.is_empty() {
                break;
            }
            remaining = remaining.saturating_sub(records.len());
            ok &= self.send_records(records).await;
        }
        ok
    }

    async fn drain_all(&self) -> bool {
        let mut ok = true;
        loop {
            let records = self.queue.drain(self.batch_max_count);
            if records.is_empty() {
                return ok;
            }
            ok &= self.send_records(records).await;
        }
    }

    /// Records drained but not yet resolved stay in `in_flight` until their
    /// batch is delivered or dropped.
    async fn send_records(&self, records: Vec<LogRecord>) -> bool {
        self.stats
            .in_flight
            .store(records.len() as u64, Ordering::Relaxed);

        let mut ok = true;
        for batch in Batch::split(records, self.batch_max_bytes) {
            ok &= self.send_batch(&batch).await;
            self.stats
                .in_flight
                .fetch_sub(batch.len() as u64, Ordering::Relaxed);
        }
        ok
    }

    async fn send_batch(&self, batch: &Batch) -> bool {
        let n = batch.len() as u64;
        let outcome = deliver(
            &*self.transport,
            batch,
            &self.credentials,
            &self.retry,
            &self.shutdown,
            &self.stats,
        )
        .await;

        match outcome {
            DeliveryOutcome::Delivered { attempts } => {
                debug!(records = n, attempts, "log batch delivered");
                PipelineStats::incr(&self.stats.delivered_records, n);
                PipelineStats::incr(&self.stats.delivered_batches, 1);
                true
            }
            DeliveryOutcome::Rejected { attempts, reason } => {
                error!(records = n, attempts, "log batch rejected by collector, dropping: {reason}");
                self.record_failure(n);
                false
            }
            DeliveryOutcome::Exhausted { attempts, reason } => {
                warn!(records = n, attempts, "log batch undeliverable, dropping: {reason}");
                self.record_failure(n);
                false
            }
        }
    }

    fn record_failure(&self, records: u64) {
        PipelineStats::incr(&self.stats.failed_batches, 1);
        PipelineStats::incr(&self.stats.failed_records, records);
    }
}
