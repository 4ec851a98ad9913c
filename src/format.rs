//! Validation and normalization of raw log entries.
//!
//! Adapters call [`validate_log_entry`] with whatever their framework hands
//! them, stamp the result with [`crate::timestamp::next_timestamp_ns`] and
//! build the final [`LogRecord`] with [`format_log_entry`].

use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::record::{LogLevel, LogRecord};

pub const MAX_MESSAGE_CHARS: usize = 10_000;
pub const MAX_FIELDS: usize = 100;
pub const MAX_FIELD_KEY_CHARS: usize = 100;

const TRUNCATION_SUFFIX: &str = "...";

/// A log entry that passed validation but has no timestamp yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEntry {
    pub level: LogLevel,
    pub message: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Check and normalize a raw `(level, message, fields)` triple.
///
/// The message is trimmed and truncated to [`MAX_MESSAGE_CHARS`]; field
/// keys are trimmed.
pub fn validate_log_entry(
    level: &str,
    message: &str,
    fields: BTreeMap<String, serde_json::Value>,
) -> Result<ValidatedEntry, ValidationError> {
    let level: LogLevel = level.parse()?;

    let message = message.trim();
    if message.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }

    if fields.len() > MAX_FIELDS {
        return Err(ValidationError::TooManyFields {
            count: fields.len(),
            max: MAX_FIELDS,
        });
    }

    let mut normalized = BTreeMap::new();
    for (key, value) in fields {
        let trimmed = key.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_FIELD_KEY_CHARS {
            return Err(ValidationError::InvalidFieldKey(key));
        }
        normalized.insert(trimmed.to_string(), value);
    }

    Ok(ValidatedEntry {
        level,
        message: truncate_message(message),
        fields: normalized,
    })
}

/// Build the immutable record that enters the delivery pipeline.
pub fn format_log_entry(entry: ValidatedEntry, timestamp_ns: u64) -> LogRecord {
    LogRecord::new(entry.level, entry.message, entry.fields, timestamp_ns)
}

fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MAX_MESSAGE_CHARS) {
        None => message.to_string(),
        Some(_) => {
            let keep = MAX_MESSAGE_CHARS - TRUNCATION_SUFFIX.len();
            let mut out: String = message.chars().take(keep).collect();
            out.push_str(TRUNCATION_SUFFIX);
            out
        }
    }
}
