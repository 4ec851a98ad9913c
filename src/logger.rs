use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::config::LogBullConfig;
use crate::error::ConfigError;
use crate::format::{format_log_entry, validate_log_entry};
use crate::pipeline::{LogBull, DISABLED_NOTICE};
use crate::record::{LogLevel, LogRecord};
use crate::stats::StatsSnapshot;
use crate::timestamp::next_timestamp_ns;

pub type Fields = BTreeMap<String, serde_json::Value>;

/// Direct logging API on top of a [`LogBull`] pipeline.
///
/// Every call validates the entry, stamps it, optionally echoes it to
/// stdout and queues it for delivery. Without credentials the logger runs
/// in console-only mode: entries are printed but never shipped.
///
/// Loggers derived with [`with_context`](Self::with_context) share the
/// pipeline of their parent.
#[derive(Clone, Debug)]
pub struct Logger {
    pipeline: LogBull,
    min_level: LogLevel,
    echo: bool,
    context: Arc<Fields>,
}

impl Logger {
    /// Build a logger and its pipeline; console echo is on only when the
    /// pipeline is disabled.
    pub fn new(config: LogBullConfig) -> Result<Self, ConfigError> {
        let pipeline = LogBull::new(config)?;
        let console_only = !pipeline.is_enabled();
        if console_only {
            write_disabled_notice(&mut std::io::stdout().lock());
        }
        Ok(Self::from_pipeline(pipeline).echo(console_only))
    }

    pub fn from_pipeline(pipeline: LogBull) -> Self {
        Self {
            pipeline,
            min_level: LogLevel::Info,
            echo: false,
            context: Arc::new(Fields::new()),
        }
    }

    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Print every accepted entry to stdout as well.
    pub fn echo(mut self, enabled: bool) -> Self {
        self.echo = enabled;
        self
    }

    /// `true` when entries are printed but never shipped.
    pub fn console_only_mode(&self) -> bool {
        !self.pipeline.is_enabled()
    }

    /// A logger that adds `context` to the fields of every entry. Fields
    /// passed at the call site win over context fields with the same key.
    pub fn with_context(&self, context: Fields) -> Self {
        let mut merged = (*self.context).clone();
        merged.extend(context);
        Self {
            context: Arc::new(merged),
            ..self.clone()
        }
    }

    pub fn debug(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Info, message, fields);
    }

    pub fn warning(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Warning, message, fields);
    }

    pub fn error(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Error, message, fields);
    }

    pub fn critical(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Critical, message, fields);
    }

    /// Log one entry; returns whether it was queued for delivery.
    pub fn log(&self, level: LogLevel, message: &str, fields: Fields) -> bool {
        if level < self.min_level {
            return false;
        }

        let mut all_fields = (*self.context).clone();
        all_fields.extend(fields);

        let entry = match validate_log_entry(level.as_str(), message, all_fields) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("LogBull: dropping invalid log entry: {e}");
                self.pipeline.record_invalid();
                return false;
            }
        };
        let record = format_log_entry(entry, next_timestamp_ns());

        if self.echo {
            let line = format_console_line(&record);
            let _ = writeln!(std::io::stdout().lock(), "{line}");
        }
        self.pipeline.enqueue(record)
    }

    pub async fn flush(&self, timeout: Duration) -> bool {
        self.pipeline.flush(timeout).await
    }

    pub async fn shutdown(&self, timeout: Duration) {
        self.pipeline.shutdown(timeout).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.pipeline.stats()
    }

    pub fn pipeline(&self) -> &LogBull {
        &self.pipeline
    }
}

// Shown even when no `tracing` subscriber is installed.
fn write_disabled_notice(out: &mut impl Write) {
    let _ = writeln!(out, "{DISABLED_NOTICE}");
}

/// `[<timestamp>] [LEVEL] message key=value ...`
pub fn format_console_line(record: &LogRecord) -> String {
    let nanos = i64::try_from(record.timestamp_ns()).unwrap_or(i64::MAX);
    let timestamp =
        DateTime::<Utc>::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut line = format!("[{timestamp}] [{}] {}", record.level(), record.message());
    for (key, value) in record.fields() {
        match value {
            serde_json::Value::String(s) => line.push_str(&format!(" {key}={s}")),
            other => line.push_str(&format!(" {key}={other}")),
        }
    }
    line
}
