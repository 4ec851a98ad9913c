use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static LAST_TIMESTAMP_NS: AtomicU64 = AtomicU64::new(0);

/// Return a nanosecond Unix timestamp that is unique and strictly
/// increasing across all callers in this process.
///
/// When the wall clock is coarser than a nanosecond, or steps backwards,
/// the previous value plus one is handed out instead.
pub fn next_timestamp_ns() -> u64 {
    let now = wall_clock_ns();
    let mut last = LAST_TIMESTAMP_NS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last.saturating_add(1));
        match LAST_TIMESTAMP_NS.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

fn wall_clock_ns() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}
