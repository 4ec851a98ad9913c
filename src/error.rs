use std::time::Duration;

/// Error returned when a pipeline cannot be built from its configuration.
///
/// This is the only error that ever crosses the public API, and only at
/// construction time. Everything that happens after a pipeline is running
/// is absorbed into counters and diagnostics.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("queue capacity must be greater than zero")]
    ZeroQueueCapacity,

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("batch byte limit must be greater than zero")]
    ZeroBatchBytes,

    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,

    #[error("batch max age must be greater than zero")]
    ZeroBatchMaxAge,

    #[error("backoff base must be greater than zero")]
    ZeroBackoffBase,

    #[error("backoff cap {cap:?} is lower than backoff base {base:?}")]
    BackoffCapBelowBase { base: Duration, cap: Duration },

    #[error("project id must not be empty")]
    EmptyProjectId,

    #[error("invalid host {0:?}: expected an http:// or https:// URL")]
    InvalidHost(String),

    #[error("no tokio runtime available to run the delivery worker")]
    NoRuntime,

    #[error("http feature is not enabled")]
    HttpFeatureDisabled,

    #[error("failed to build http client: {0}")]
    HttpClient(String),

    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet,
}

/// Error describing why a single log entry was rejected before queuing.
///
/// Validation errors never reach the logging call site; the entry is
/// dropped, counted, and reported as a diagnostic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown log level {0:?}")]
    UnknownLevel(String),

    #[error("log message is empty")]
    EmptyMessage,

    #[error("too many fields: {count} exceeds maximum {max}")]
    TooManyFields { count: usize, max: usize },

    #[error("field key {0:?} is empty or too long")]
    InvalidFieldKey(String),
}
