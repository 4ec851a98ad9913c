use std::ops::Deref;
use std::sync::Arc;

use crate::record::LogRecord;

/// An ordered, non-empty group of records delivered in one attempt.
///
/// Cheap to clone; every clone shares the same immutable records, so a
/// batch retried several times is always the exact batch that was cut.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Arc<[LogRecord]>,
}

impl Batch {
    /// Returns `None` for an empty record list.
    pub fn new(records: Vec<LogRecord>) -> Option<Self> {
        if records.is_empty() {
            None
        } else {
            Some(Self {
                records: records.into(),
            })
        }
    }

    /// Split drained records into batches of at most `max_bytes` encoded
    /// bytes each, preserving order.
    ///
    /// A record that alone exceeds the limit is sent in its own batch.
    pub fn split(records: Vec<LogRecord>, max_bytes: usize) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_bytes = 0usize;

        for record in records {
            let size = record.encoded_len();
            if !current.is_empty() && current_bytes.saturating_add(size) > max_bytes {
                batches.extend(Batch::new(std::mem::take(&mut current)));
                current_bytes = 0;
            }
            current_bytes = current_bytes.saturating_add(size);
            current.push(record);
        }
        batches.extend(Batch::new(current));
        batches
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }
}

impl Deref for Batch {
    type Target = [LogRecord];

    fn deref(&self) -> &[LogRecord] {
        &self.records
    }
}
