use crate::format::{format_log_entry, validate_log_entry};
use crate::pipeline::LogBull;
use crate::record::LogLevel;
use crate::timestamp::next_timestamp_ns;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Target prefix of this crate's own diagnostics, which the layer never
/// forwards.
const SELF_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `tracing_subscriber` layer that turns events into LogBull records and
/// hands them to a [`LogBull`] pipeline.
///
/// Only events at or above `min_level` are forwarded. The layer does no I/O
/// itself; enqueueing is a short lock on the pipeline's queue.
pub struct LogBullLayer {
    pipeline: LogBull,
    min_level: LogLevel,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Accepted by the pipeline.
    pub enqueued_events: Arc<AtomicU64>,
    /// Rejected by validation or by the pipeline.
    pub dropped_events: Arc<AtomicU64>,
}

impl LogBullLayer {
    pub fn new(pipeline: LogBull, min_level: LogLevel) -> Self {
        Self {
            pipeline,
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn pipeline(&self) -> &LogBull {
        &self.pipeline
    }
}

impl<S> Layer<S> for LogBullLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if is_own_target(meta.target()) {
            return;
        }
        let level = LogLevel::from(*meta.level());
        if level < self.min_level || !self.pipeline.is_enabled() {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        fields.insert(
            "target".to_string(),
            serde_json::Value::String(meta.target().to_string()),
        );
        let message = message.unwrap_or_else(|| meta.name().to_string());

        let accepted = match validate_log_entry(level.as_str(), &message, fields) {
            Ok(entry) => self
                .pipeline
                .enqueue(format_log_entry(entry, next_timestamp_ns())),
            Err(_) => {
                self.pipeline.record_invalid();
                false
            }
        };

        if accepted {
            self.enqueued_events.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(SELF_TARGET)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

/// Collects an event's fields, pulling `message` out separately.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
