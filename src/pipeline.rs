//! Lifecycle controller of the delivery pipeline.
//!
//! [`LogBull`] is the handle every adapter talks to. It is either
//! *disabled* (no credentials configured, every call is a no-op) or
//! *active*, in which case it owns a bounded queue and one background
//! [`BatchWorker`](crate::worker::BatchWorker) task.
//!
//! ```text
//!   enqueue ──▶ BoundedQueue ──▶ BatchWorker ──▶ Transport ──▶ collector
//!                    ▲               │
//!   flush ───────────┼── request ───▶│
//!   shutdown ────────┴── cancel ────▶│ drain, stop
//! ```
//!
//! None of the public methods return errors or panic once the handle
//! exists; failures show up in [`LogBull::stats`] and as `tracing`
//! diagnostics.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, Once, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{LogBullConfig, PipelineConfig};
use crate::error::ConfigError;
use crate::format::{format_log_entry, validate_log_entry};
use crate::queue::BoundedQueue;
use crate::record::LogRecord;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::timestamp::next_timestamp_ns;
use crate::transport::Transport;
use crate::worker::{BatchWorker, FlushRequest};

/// Printed, or logged, when a pipeline is built without credentials.
pub(crate) const DISABLED_NOTICE: &str = "LogBull: no credentials provided, remote log shipping \
     is disabled and logs will not be sent to a LogBull server";

/// Externally visible lifecycle state of a [`LogBull`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No credentials were configured; nothing is ever shipped.
    Disabled,
    /// Worker active, records accepted.
    Running,
    /// Shutdown requested; the worker is delivering what is left.
    Draining,
    /// Terminal. Records are no longer accepted.
    Stopped,
}

/// Handle to a log delivery pipeline.
///
/// Cheap to clone; all clones share the same pipeline. Dropping the last
/// clone of a running pipeline tells the worker to drain and stop, but
/// only [`shutdown`](Self::shutdown) waits for that to happen.
#[derive(Clone)]
pub struct LogBull {
    mode: Mode,
}

#[derive(Clone)]
enum Mode {
    Disabled,
    Active(Arc<ActivePipeline>),
}

impl LogBull {
    /// Build a pipeline from user configuration.
    ///
    /// Without a project id or host the handle is disabled, which is not an
    /// error. With credentials, invalid tuning values are rejected and the
    /// default HTTP transport is used. Must be called from within a tokio
    /// runtime when credentials are present.
    pub fn new(config: LogBullConfig) -> Result<Self, ConfigError> {
        match config.into_pipeline_config()? {
            None => Ok(Self::disabled()),
            Some(pipeline_config) => {
                let transport = default_transport(&pipeline_config)?;
                Self::with_transport(pipeline_config, transport)
            }
        }
    }

    /// A handle that accepts nothing and ships nothing.
    pub fn disabled() -> Self {
        static NOTICE: Once = Once::new();
        NOTICE.call_once(|| info!("{DISABLED_NOTICE}"));
        Self {
            mode: Mode::Disabled,
        }
    }

    /// Build an active pipeline delivering through a custom transport.
    pub fn with_transport(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let queue = Arc::new(BoundedQueue::new(config.queue_capacity, config.overflow_policy));
        let stats = Arc::new(PipelineStats::default());
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();

        let worker = BatchWorker::new(
            &config,
            Arc::clone(&queue),
            transport,
            Arc::clone(&stats),
            Arc::clone(&wake),
            flush_rx,
            shutdown.clone(),
        );
        let handle = runtime.spawn(worker.run());

        debug!(
            endpoint = %config.endpoint,
            queue_capacity = queue.capacity(),
            overflow_policy = ?queue.policy(),
            batch_max_count = config.batch_max_count,
            "LogBull pipeline started"
        );

        Ok(Self {
            mode: Mode::Active(Arc::new(ActivePipeline {
                state: RwLock::new(PipelineState::Running),
                queue,
                stats,
                wake,
                batch_max_count: config.batch_max_count,
                flush_tx,
                shutdown,
                worker: Mutex::new(Some(handle)),
            })),
        })
    }

    pub fn state(&self) -> PipelineState {
        match &self.mode {
            Mode::Disabled => PipelineState::Disabled,
            Mode::Active(p) => p.state(),
        }
    }

    /// `false` for a disabled handle, `true` otherwise (even once stopped).
    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Active(_))
    }

    /// Queue a ready-made record for delivery.
    ///
    /// Returns whether the record was accepted. Never blocks on I/O.
    pub fn enqueue(&self, record: LogRecord) -> bool {
        match &self.mode {
            Mode::Disabled => false,
            Mode::Active(p) => p.enqueue(record),
        }
    }

    /// Validate, timestamp and queue a raw log entry.
    ///
    /// Invalid entries are dropped, counted and reported as a diagnostic.
    pub fn log(
        &self,
        level: &str,
        message: &str,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> bool {
        let Mode::Active(pipeline) = &self.mode else {
            return false;
        };

        match validate_log_entry(level, message, fields) {
            Ok(entry) => pipeline.enqueue(format_log_entry(entry, next_timestamp_ns())),
            Err(e) => {
                warn!("LogBull: dropping invalid log entry: {e}");
                PipelineStats::incr(&pipeline.stats.dropped_invalid, 1);
                false
            }
        }
    }

    /// Count an entry an adapter rejected before it reached [`enqueue`](Self::enqueue).
    pub(crate) fn record_invalid(&self) {
        if let Mode::Active(p) = &self.mode {
            PipelineStats::incr(&p.stats.dropped_invalid, 1);
        }
    }

    /// Deliver everything queued right now and wait up to `timeout`.
    ///
    /// Returns `true` when every batch of the cut was delivered in time.
    /// A disabled handle has nothing to deliver and returns `true`; a
    /// draining or stopped pipeline returns `false`. Records not delivered
    /// before the timeout stay queued or under retry.
    pub async fn flush(&self, timeout: Duration) -> bool {
        match &self.mode {
            Mode::Disabled => true,
            Mode::Active(p) => p.flush(timeout).await,
        }
    }

    /// Stop the pipeline, delivering what is queued within `timeout`.
    ///
    /// Idempotent: only the first call does anything. Whatever could not
    /// be delivered in time is discarded and counted.
    pub async fn shutdown(&self, timeout: Duration) {
        if let Mode::Active(p) = &self.mode {
            p.shutdown(timeout).await;
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        match &self.mode {
            Mode::Disabled => StatsSnapshot::default(),
            Mode::Active(p) => p.stats(),
        }
    }

    /// Records currently waiting in the queue.
    pub fn pending(&self) -> usize {
        match &self.mode {
            Mode::Disabled => 0,
            Mode::Active(p) => p.queue.len(),
        }
    }
}

impl std::fmt::Debug for LogBull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBull")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

struct ActivePipeline {
    state: RwLock<PipelineState>,
    queue: Arc<BoundedQueue>,
    stats: Arc<PipelineStats>,
    wake: Arc<Notify>,
    batch_max_count: usize,
    flush_tx: mpsc::UnboundedSender<FlushRequest>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ActivePipeline {
    fn state(&self) -> PipelineState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn enqueue(&self, record: LogRecord) -> bool {
        // Held across the push so shutdown cannot flip the state between
        // the check and the insert.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if *state != PipelineState::Running {
            return false;
        }

        let (accepted, len) = self.queue.push(record);
        if accepted {
            PipelineStats::incr(&self.stats.enqueued, 1);
        }
        if len == 1 || len >= self.batch_max_count {
            self.wake.notify_one();
        }
        accepted
    }

    async fn flush(&self, timeout: Duration) -> bool {
        if self.state() != PipelineState::Running {
            return false;
        }

        let (tx, rx) = oneshot::channel();
        if self.flush_tx.send(tx).is_err() {
            warn!("LogBull: flush requested but the delivery worker is gone");
            return false;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(_)) => false,
            Err(_) => {
                debug!(pending = self.queue.len(), "LogBull: flush timed out");
                false
            }
        }
    }

    async fn shutdown(&self, timeout: Duration) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state != PipelineState::Running {
                return;
            }
            *state = PipelineState::Draining;
        }
        self.shutdown.cancel();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut handle) = handle {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("LogBull: delivery worker failed: {e}"),
                Err(_) => {
                    warn!("LogBull: shutdown timed out, abandoning undelivered logs");
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        // Drained by a worker that never finished with them.
        let lost = self.stats.in_flight.swap(0, Ordering::Relaxed);
        if lost > 0 {
            warn!(lost, "LogBull: abandoning logs that were being delivered");
            PipelineStats::incr(&self.stats.failed_batches, 1);
            PipelineStats::incr(&self.stats.failed_records, lost);
        }

        let discarded = self.queue.clear();
        if discarded > 0 {
            warn!(discarded, "LogBull: discarding logs left in the queue");
            PipelineStats::incr(&self.stats.dropped_on_shutdown, discarded as u64);
        }
        self.set_state(PipelineState::Stopped);
        debug!("LogBull pipeline stopped");
    }

    fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.dropped_overflow = self.queue.dropped();
        snapshot
    }
}

impl Drop for ActivePipeline {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(feature = "http")]
fn default_transport(config: &PipelineConfig) -> Result<Arc<dyn Transport>, ConfigError> {
    let transport = crate::http::HttpTransport::new(config)?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "http"))]
fn default_transport(_config: &PipelineConfig) -> Result<Arc<dyn Transport>, ConfigError> {
    Err(ConfigError::HttpFeatureDisabled)
}
