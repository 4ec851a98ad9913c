use std::time::Duration;

use crate::env;
use crate::error::ConfigError;
use crate::queue::OverflowPolicy;

/// Identity presented to the collector with every batch.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub project_id: String,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// User-facing configuration.
///
/// Leaving `project_id` or `host` unset is valid and puts the pipeline in
/// disabled mode: nothing is shipped and every operation is a no-op.
///
/// **Fields**
/// - `batch_size`: maximum number of records per batch; reaching it in
///   the queue triggers an immediate cut.
/// - `batch_max_bytes`: maximum encoded size of one batch.
/// - `batch_max_age`: how long a queued record may wait before a cut is
///   forced.
/// - `flush_interval`: maximum time between cuts even for a partial batch.
/// - `queue_capacity`: records held in memory before the overflow policy
///   applies.
/// - `max_retry_attempts`, `backoff_base`, `backoff_cap`: retry schedule
///   for failed sends.
#[derive(Clone, Debug)]
pub struct LogBullConfig {
    pub project_id: Option<String>,
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub batch_max_bytes: usize,
    pub batch_max_age: Duration,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub max_retry_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub request_timeout: Duration,
}

impl Default for LogBullConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            host: None,
            api_key: None,
            batch_size: 1000,
            batch_max_bytes: 1024 * 1024,
            batch_max_age: Duration::from_secs(1),
            flush_interval: Duration::from_secs(1),
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::DropOldest,
            max_retry_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl LogBullConfig {
    /// Shorthand for a config with credentials and default tuning.
    pub fn new(project_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            host: Some(host.into()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build a config from the `LOGBULL_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            project_id: env::env_opt(env::LOGBULL_PROJECT_ID_ENV),
            host: env::env_opt(env::LOGBULL_HOST_ENV),
            api_key: env::env_opt(env::LOGBULL_API_KEY_ENV),
            batch_size: env::env_parse(env::LOGBULL_BATCH_SIZE_ENV).unwrap_or(defaults.batch_size),
            queue_capacity: env::env_parse(env::LOGBULL_QUEUE_CAPACITY_ENV)
                .unwrap_or(defaults.queue_capacity),
            flush_interval: env::env_parse(env::LOGBULL_FLUSH_INTERVAL_MS_ENV)
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            ..defaults
        }
    }

    /// `true` when both a project id and a host are present.
    pub fn has_credentials(&self) -> bool {
        self.project_id.is_some() && self.host.is_some()
    }

    /// Validate into a [`PipelineConfig`].
    ///
    /// Returns `Ok(None)` when credentials are absent (disabled mode).
    pub fn into_pipeline_config(self) -> Result<Option<PipelineConfig>, ConfigError> {
        let (Some(project_id), Some(host)) = (self.project_id, self.host) else {
            return Ok(None);
        };

        let config = PipelineConfig {
            endpoint: normalize_host(&host)?,
            credentials: Credentials {
                project_id: project_id.trim().to_string(),
                api_key: self.api_key.filter(|k| !k.trim().is_empty()),
            },
            batch_max_count: self.batch_size,
            batch_max_bytes: self.batch_max_bytes,
            batch_max_age: self.batch_max_age,
            queue_capacity: self.queue_capacity,
            overflow_policy: self.overflow_policy,
            flush_interval: self.flush_interval,
            max_retry_attempts: self.max_retry_attempts,
            backoff_base: self.backoff_base,
            backoff_cap: self.backoff_cap,
            request_timeout: self.request_timeout,
        };
        config.validate()?;
        Ok(Some(config))
    }
}

/// Validated, immutable parameters of one active pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Collector base URL without a trailing slash.
    pub endpoint: String,
    pub credentials: Credentials,
    pub batch_max_count: usize,
    pub batch_max_bytes: usize,
    pub batch_max_age: Duration,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub flush_interval: Duration,
    pub max_retry_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub request_timeout: Duration,
}

impl PipelineConfig {
    /// A config pointing at `endpoint` with default tuning, mostly useful
    /// together with a custom [`crate::transport::Transport`].
    pub fn new(endpoint: impl Into<String>, project_id: impl Into<String>) -> Self {
        let defaults = LogBullConfig::default();
        Self {
            endpoint: endpoint.into(),
            credentials: Credentials {
                project_id: project_id.into(),
                api_key: None,
            },
            batch_max_count: defaults.batch_size,
            batch_max_bytes: defaults.batch_max_bytes,
            batch_max_age: defaults.batch_max_age,
            queue_capacity: defaults.queue_capacity,
            overflow_policy: defaults.overflow_policy,
            flush_interval: defaults.flush_interval,
            max_retry_attempts: defaults.max_retry_attempts,
            backoff_base: defaults.backoff_base,
            backoff_cap: defaults.backoff_cap,
            request_timeout: defaults.request_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.batch_max_count == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.batch_max_bytes == 0 {
            return Err(ConfigError::ZeroBatchBytes);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.batch_max_age.is_zero() {
            return Err(ConfigError::ZeroBatchMaxAge);
        }
        if self.backoff_base.is_zero() {
            return Err(ConfigError::ZeroBackoffBase);
        }
        if self.backoff_cap < self.backoff_base {
            return Err(ConfigError::BackoffCapBelowBase {
                base: self.backoff_base,
                cap: self.backoff_cap,
            });
        }
        if self.credentials.project_id.trim().is_empty() {
            return Err(ConfigError::EmptyProjectId);
        }
        Ok(())
    }
}

fn normalize_host(host: &str) -> Result<String, ConfigError> {
    let trimmed = host.trim().trim_end_matches('/');
    let authority = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));

    match authority {
        Some(rest) if !rest.is_empty() && !rest.contains(char::is_whitespace) => {
            Ok(trimmed.to_string())
        }
        _ => Err(ConfigError::InvalidHost(host.to_string())),
    }
}
