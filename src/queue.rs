use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use crate::record::LogRecord;

/// What [`BoundedQueue::enqueue`] does when the queue is already full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to make room for the new one.
    #[default]
    DropOldest,
    /// Keep the queue as is and drop the incoming record.
    RejectNew,
}

/// Capacity-limited FIFO of records awaiting delivery.
///
/// Many producers may call [`enqueue`](Self::enqueue) concurrently while a
/// single consumer drains it. The lock is only held for constant-time
/// push/pop work.
#[derive(Debug)]
pub struct BoundedQueue {
    inner: Mutex<VecDeque<Entry>>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

#[derive(Debug)]
struct Entry {
    record: LogRecord,
    enqueued_at: Instant,
}

impl BoundedQueue {
    /// Capacity is clamped to at least one record.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Add a record, applying the overflow policy when full.
    ///
    /// Returns whether `record` itself was admitted. Under
    /// [`OverflowPolicy::DropOldest`] this is always `true`.
    pub fn enqueue(&self, record: LogRecord) -> bool {
        self.push(record).0
    }

    /// Like [`enqueue`](Self::enqueue), also returning the queue length
    /// right after the operation.
    pub(crate) fn push(&self, record: LogRecord) -> (bool, usize) {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match self.policy {
                OverflowPolicy::RejectNew => return (false, queue.len()),
                OverflowPolicy::DropOldest => {
                    queue.pop_front();
                }
            }
        }
        queue.push_back(Entry {
            record,
            enqueued_at: Instant::now(),
        });
        (true, queue.len())
    }

    /// Remove and return up to `max_items` records in FIFO order.
    pub fn drain(&self, max_items: usize) -> Vec<LogRecord> {
        let mut queue = self.lock();
        let n = max_items.min(queue.len());
        queue.drain(..n).map(|e| e.record).collect()
    }

    /// Discard everything still queued, returning how many records were lost.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Number of records lost to the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// When the record at the head of the queue was admitted.
    pub fn oldest_enqueued_at(&self) -> Option<Instant> {
        self.lock().front().map(|e| e.enqueued_at)
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
