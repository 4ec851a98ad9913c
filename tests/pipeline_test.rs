use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use logbull::batch::Batch;
use logbull::{
    ConfigError, Credentials, LogBull, LogBullConfig, OverflowPolicy, PipelineConfig,
    PipelineState, Transport, TransportError,
};
use tokio::time::{sleep, Instant};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    /// Retryable failure for the first `n` calls, success afterwards.
    FailFirst(usize),
    AlwaysRetryable,
    AlwaysFatal,
    Hang,
}

/// Records every batch it receives, in call order.
struct MockTransport {
    behavior: Behavior,
    calls: AtomicUsize,
    delivered: Mutex<Vec<Vec<String>>>,
}

impl MockTransport {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, batch: &Batch, _credentials: &Credentials) -> Result<(), TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::FailFirst(n) if call < n => {
                Err(TransportError::Retryable("connection reset".into()))
            }
            Behavior::FailFirst(_) => Ok(()),
            Behavior::AlwaysRetryable => Err(TransportError::Retryable("unreachable".into())),
            Behavior::AlwaysFatal => Err(TransportError::Fatal("401 unauthorized".into())),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        };
        if outcome.is_ok() {
            let messages = batch.iter().map(|r| r.message().to_string()).collect();
            self.delivered.lock().unwrap().push(messages);
        }
        outcome
    }
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new("http://localhost:4005", "project");
    config.flush_interval = Duration::from_secs(1);
    config.batch_max_age = Duration::from_secs(3600);
    config
}

fn log(pipeline: &LogBull, message: &str) -> bool {
    pipeline.log("INFO", message, BTreeMap::new())
}

fn messages(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| format!("m{i}")).collect()
}

#[tokio::test(start_paused = true)]
async fn size_trigger_cuts_full_batch_then_time_trigger_cuts_rest() {
    let transport = MockTransport::new(Behavior::Succeed);
    let mut config = config();
    config.batch_max_count = 3;
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    for i in 1..=5 {
        assert!(log(&pipeline, &format!("m{i}")));
    }

    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.batches(), vec![messages(1..=3)]);
    assert_eq!(pipeline.pending(), 2);

    sleep(Duration::from_millis(1100)).await;
    assert_eq!(transport.batches(), vec![messages(1..=3), messages(4..=5)]);
    assert_eq!(pipeline.pending(), 0);

    pipeline.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn batch_max_age_forces_a_cut_before_flush_interval() {
    let transport = MockTransport::new(Behavior::Succeed);
    let mut config = config();
    config.flush_interval = Duration::from_secs(60);
    config.batch_max_age = Duration::from_millis(200);
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    sleep(Duration::from_secs(5)).await;
    log(&pipeline, "aged");

    sleep(Duration::from_millis(100)).await;
    assert!(transport.batches().is_empty());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.batches(), vec![vec!["aged".to_string()]]);
}

#[tokio::test(start_paused = true)]
async fn empty_time_trigger_sends_nothing() {
    let transport = MockTransport::new(Behavior::Succeed);
    let pipeline = LogBull::with_transport(config(), transport.clone()).unwrap();

    sleep(Duration::from_secs(10)).await;

    assert_eq!(transport.calls(), 0);
    pipeline.shutdown(Duration::from_secs(1)).await;
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn retries_until_third_attempt_succeeds() {
    let transport = MockTransport::new(Behavior::FailFirst(2));
    let mut config = config();
    config.max_retry_attempts = 3;
    config.backoff_base = Duration::from_millis(100);
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    log(&pipeline, "m1");
    let start = Instant::now();
    assert!(pipeline.flush(Duration::from_secs(10)).await);

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(transport.calls(), 3);
    assert_eq!(transport.batches(), vec![vec!["m1".to_string()]]);

    let stats = pipeline.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.delivered_batches, 1);
    assert_eq!(stats.delivered_records, 1);
    assert_eq!(stats.failed_batches, 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_drop_batch_and_count_failure() {
    let transport = MockTransport::new(Behavior::AlwaysRetryable);
    let mut config = config();
    config.max_retry_attempts = 2;
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    log(&pipeline, "m1");
    log(&pipeline, "m2");
    assert!(!pipeline.flush(Duration::from_secs(60)).await);

    assert_eq!(transport.calls(), 3);
    let stats = pipeline.stats();
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.failed_records, 2);
    assert_eq!(pipeline.pending(), 0);

    // The worker keeps going after a lost batch.
    let calls = transport.calls();
    log(&pipeline, "m3");
    assert!(!pipeline.flush(Duration::from_secs(60)).await);
    assert_eq!(transport.calls(), calls + 3);
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_is_not_retried() {
    let transport = MockTransport::new(Behavior::AlwaysFatal);
    let pipeline = LogBull::with_transport(config(), transport.clone()).unwrap();

    log(&pipeline, "m1");
    assert!(!pipeline.flush(Duration::from_secs(10)).await);

    assert_eq!(transport.calls(), 1);
    let stats = pipeline.stats();
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.retries, 0);
    assert_eq!(pipeline.state(), PipelineState::Running);
}

#[tokio::test(start_paused = true)]
async fn batches_preserve_enqueue_order() {
    let transport = MockTransport::new(Behavior::Succeed);
    let mut config = config();
    config.batch_max_count = 4;
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    for i in 1..=18 {
        log(&pipeline, &format!("m{i}"));
    }
    assert!(pipeline.flush(Duration::from_secs(10)).await);

    let batches = transport.batches();
    assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 4));
    assert_eq!(batches.concat(), messages(1..=18));
    assert_eq!(pipeline.stats().delivered_records, 18);
}

#[tokio::test(start_paused = true)]
async fn records_are_delivered_within_flush_interval() {
    let transport = MockTransport::new(Behavior::Succeed);
    let pipeline = LogBull::with_transport(config(), transport.clone()).unwrap();

    log(&pipeline, "m1");
    log(&pipeline, "m2");
    sleep(Duration::from_millis(1100)).await;

    assert_eq!(transport.batches(), vec![messages(1..=2)]);
}

#[tokio::test(start_paused = true)]
async fn overflow_policies_are_counted() {
    let transport = MockTransport::new(Behavior::Succeed);
    let mut drop_oldest = config();
    drop_oldest.queue_capacity = 2;
    let pipeline = LogBull::with_transport(drop_oldest.clone(), transport.clone()).unwrap();

    assert!(log(&pipeline, "a"));
    assert!(log(&pipeline, "b"));
    assert!(log(&pipeline, "c"));
    assert!(pipeline.flush(Duration::from_secs(10)).await);
    assert_eq!(transport.batches(), vec![vec!["b".to_string(), "c".to_string()]]);
    assert_eq!(pipeline.stats().dropped_overflow, 1);

    let transport = MockTransport::new(Behavior::Succeed);
    let mut reject_new = drop_oldest;
    reject_new.overflow_policy = OverflowPolicy::RejectNew;
    let pipeline = LogBull::with_transport(reject_new, transport.clone()).unwrap();

    assert!(log(&pipeline, "a"));
    assert!(log(&pipeline, "b"));
    assert!(!log(&pipeline, "c"));
    assert!(pipeline.flush(Duration::from_secs(10)).await);
    assert_eq!(transport.batches(), vec![vec!["a".to_string(), "b".to_string()]]);
    assert_eq!(pipeline.stats().dropped_overflow, 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_entries_are_dropped_and_counted() {
    let transport = MockTransport::new(Behavior::Succeed);
    let pipeline = LogBull::with_transport(config(), transport.clone()).unwrap();

    assert!(!pipeline.log("LOUD", "x", BTreeMap::new()));
    assert!(!pipeline.log("INFO", "   ", BTreeMap::new()));
    assert!(pipeline.log("info", "ok", BTreeMap::new()));
    assert!(pipeline.flush(Duration::from_secs(10)).await);

    let stats = pipeline.stats();
    assert_eq!(stats.dropped_invalid, 2);
    assert_eq!(stats.delivered_records, 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_pipeline_is_a_successful_noop() {
    let pipeline = LogBull::new(LogBullConfig::default()).unwrap();

    assert_eq!(pipeline.state(), PipelineState::Disabled);
    assert!(!pipeline.is_enabled());
    assert!(!log(&pipeline, "ignored"));

    let start = Instant::now();
    assert!(pipeline.flush(Duration::from_secs(5)).await);
    assert_eq!(start.elapsed(), Duration::ZERO);

    pipeline.shutdown(Duration::from_secs(5)).await;
    pipeline.shutdown(Duration::from_secs(5)).await;
    assert_eq!(pipeline.state(), PipelineState::Disabled);
    assert_eq!(pipeline.stats(), Default::default());
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_queue_and_is_idempotent() {
    let transport = MockTransport::new(Behavior::Succeed);
    let pipeline = LogBull::with_transport(config(), transport.clone()).unwrap();

    for i in 1..=5 {
        log(&pipeline, &format!("m{i}"));
    }
    pipeline.shutdown(Duration::from_secs(5)).await;

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(transport.batches().concat(), messages(1..=5));
    let delivered = pipeline.stats().delivered_records;

    pipeline.shutdown(Duration::from_secs(5)).await;
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(pipeline.stats().delivered_records, delivered);
    assert_eq!(transport.batches().concat(), messages(1..=5));

    assert!(!log(&pipeline, "late"));
    assert!(!pipeline.flush(Duration::from_secs(1)).await);
    assert_eq!(pipeline.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_with_unreachable_collector_skips_backoff() {
    let transport = MockTransport::new(Behavior::AlwaysRetryable);
    let mut config = config();
    config.queue_capacity = 10;
    config.batch_max_count = 5;
    config.max_retry_attempts = 5;
    config.backoff_base = Duration::from_secs(10);
    config.backoff_cap = Duration::from_secs(60);
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    for i in 1..=10 {
        log(&pipeline, &format!("m{i}"));
    }
    // Let the worker pick up the first batch and enter its backoff.
    sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.calls(), 1);

    let start = Instant::now();
    pipeline.shutdown(Duration::from_secs(2)).await;

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(pipeline.pending(), 0);
    // First batch: initial attempt + one final attempt; second batch: one attempt.
    assert_eq!(transport.calls(), 3);

    let stats = pipeline.stats();
    assert_eq!(stats.failed_batches, 2);
    assert_eq!(stats.failed_records, 10);
    assert_eq!(stats.delivered_records, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_returns_after_timeout_when_transport_hangs() {
    let transport = MockTransport::new(Behavior::Hang);
    let mut config = config();
    config.queue_capacity = 10;
    config.batch_max_count = 5;
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    for i in 1..=10 {
        log(&pipeline, &format!("m{i}"));
    }
    sleep(Duration::from_millis(1)).await;

    let start = Instant::now();
    pipeline.shutdown(Duration::from_secs(1)).await;

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(pipeline.pending(), 0);

    let stats = pipeline.stats();
    assert_eq!(stats.failed_records, 5);
    assert_eq!(stats.dropped_on_shutdown, 5);
    assert_eq!(stats.total_dropped(), 10);
}

#[tokio::test(start_paused = true)]
async fn shutdown_timeout_counts_every_batch_of_a_split_chunk() {
    let transport = MockTransport::new(Behavior::Hang);
    let mut config = config();
    config.batch_max_count = 5;
    config.batch_max_bytes = 1;
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    for i in 1..=5 {
        log(&pipeline, &format!("m{i}"));
    }
    // One chunk of five, split into five single-record batches.
    sleep(Duration::from_millis(1)).await;
    assert_eq!(pipeline.pending(), 0);
    assert_eq!(transport.calls(), 1);

    pipeline.shutdown(Duration::from_secs(1)).await;

    let stats = pipeline.stats();
    assert_eq!(stats.enqueued, 5);
    assert_eq!(stats.delivered_records, 0);
    assert_eq!(stats.failed_records, 5);
    assert_eq!(stats.total_dropped() + stats.delivered_records, stats.enqueued);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producers_racing_shutdown_lose_nothing_uncounted() {
    let transport = MockTransport::new(Behavior::Succeed);
    let mut config = config();
    config.batch_max_count = 20;
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let mut accepted = 0u64;
                for i in 0..500 {
                    if log(&pipeline, &format!("p{p}-{i}")) {
                        accepted += 1;
                    }
                    if i % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                accepted
            })
        })
        .collect();

    tokio::task::yield_now().await;
    pipeline.shutdown(Duration::from_secs(10)).await;

    let mut accepted = 0;
    for producer in producers {
        accepted += producer.await.unwrap();
    }

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(!log(&pipeline, "after stop"));

    let stats = pipeline.stats();
    assert_eq!(stats.enqueued, accepted);
    assert_eq!(stats.delivered_records + stats.total_dropped(), stats.enqueued);
    assert_eq!(transport.batches().concat().len() as u64, stats.delivered_records);
    assert_eq!(pipeline.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_last_handle_drains_queue() {
    let transport = MockTransport::new(Behavior::Succeed);
    let pipeline = LogBull::with_transport(config(), transport.clone()).unwrap();
    let clone = pipeline.clone();

    for i in 1..=3 {
        log(&clone, &format!("m{i}"));
    }
    drop(clone);
    assert!(transport.batches().is_empty());
    drop(pipeline);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.batches(), vec![messages(1..=3)]);
}

#[tokio::test(start_paused = true)]
async fn flush_timeout_keeps_records_for_shutdown() {
    let transport = MockTransport::new(Behavior::FailFirst(1));
    let mut config = config();
    config.backoff_base = Duration::from_secs(30);
    config.backoff_cap = Duration::from_secs(30);
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    for i in 1..=3 {
        log(&pipeline, &format!("m{i}"));
    }
    assert!(!pipeline.flush(Duration::from_secs(1)).await);
    assert!(transport.batches().is_empty());

    pipeline.shutdown(Duration::from_secs(5)).await;

    assert_eq!(transport.batches(), vec![messages(1..=3)]);
    let stats = pipeline.stats();
    assert_eq!(stats.delivered_records, 3);
    assert_eq!(stats.total_dropped(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_producers_lose_nothing_below_capacity() {
    let transport = MockTransport::new(Behavior::Succeed);
    let mut config = config();
    config.batch_max_count = 50;
    let pipeline = LogBull::with_transport(config, transport.clone()).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                for i in 0..250 {
                    log(&pipeline, &format!("p{p}-{i}"));
                    if i % 25 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    pipeline.shutdown(Duration::from_secs(10)).await;

    let delivered = transport.batches().concat();
    assert_eq!(delivered.len(), 1000);
    for p in 0..4 {
        let own: Vec<_> = delivered
            .iter()
            .filter(|m| m.starts_with(&format!("p{p}-")))
            .cloned()
            .collect();
        let expected: Vec<_> = (0..250).map(|i| format!("p{p}-{i}")).collect();
        assert_eq!(own, expected);
    }
}

#[test]
fn construction_requires_a_runtime() {
    let transport = MockTransport::new(Behavior::Succeed);
    let err = LogBull::with_transport(config(), transport).unwrap_err();
    assert_eq!(err, ConfigError::NoRuntime);
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let transport = MockTransport::new(Behavior::Succeed);
    let mut config = config();
    config.queue_capacity = 0;
    let err = LogBull::with_transport(config, transport).unwrap_err();
    assert_eq!(err, ConfigError::ZeroQueueCapacity);
}
