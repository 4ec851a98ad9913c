//! Environment variable names understood by [`crate::config::LogBullConfig::from_env`].
//!
//! These are purely helpers; the pipeline itself never reads the
//! environment.

/// LogBull project identifier.
pub const LOGBULL_PROJECT_ID_ENV: &str = "LOGBULL_PROJECT_ID";

/// Collector base URL, e.g. `http://localhost:4005`.
pub const LOGBULL_HOST_ENV: &str = "LOGBULL_HOST";

/// Optional API key sent as `X-API-Key`.
pub const LOGBULL_API_KEY_ENV: &str = "LOGBULL_API_KEY";

/// Maximum records per batch.
pub const LOGBULL_BATCH_SIZE_ENV: &str = "LOGBULL_BATCH_SIZE";

/// In-memory queue capacity.
pub const LOGBULL_QUEUE_CAPACITY_ENV: &str = "LOGBULL_QUEUE_CAPACITY";

/// Flush interval in milliseconds.
pub const LOGBULL_FLUSH_INTERVAL_MS_ENV: &str = "LOGBULL_FLUSH_INTERVAL_MS";

/// Read a non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.trim().parse().ok())
}
