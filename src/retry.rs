use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::config::{Credentials, PipelineConfig};
use crate::stats::PipelineStats;
use crate::transport::{Transport, TransportError};

/// Exponential backoff schedule for failed sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a batch gets at most
    /// `1 + max_retry_attempts` sends.
    pub max_retry_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    /// `min(backoff_base * 2^attempt, backoff_cap)`, with `attempt`
    /// counting from zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_cap, |d| d.min(self.backoff_cap))
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retry_attempts: config.max_retry_attempts,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
        }
    }
}

/// Final result of delivering one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    /// The transport reported a fatal error.
    Rejected { attempts: u32, reason: String },
    /// Every allowed attempt failed, or shutdown cut the schedule short.
    Exhausted { attempts: u32, reason: String },
}

/// Send `batch` until it succeeds, fails fatally, or runs out of attempts.
///
/// Once `shutdown` is cancelled no further backoff waits happen: a pending
/// wait is cut short and the batch gets one last immediate attempt.
pub async fn deliver(
    transport: &dyn Transport,
    batch: &Batch,
    credentials: &Credentials,
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    stats: &PipelineStats,
) -> DeliveryOutcome {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let err = match transport.send(batch, credentials).await {
            Ok(()) => return DeliveryOutcome::Delivered { attempts },
            Err(e) => e,
        };

        let reason = err.to_string();
        if let TransportError::Fatal(_) = err {
            return DeliveryOutcome::Rejected { attempts, reason };
        }

        let retry = attempts - 1;
        if retry >= policy.max_retry_attempts || shutdown.is_cancelled() {
            return DeliveryOutcome::Exhausted { attempts, reason };
        }

        let backoff = policy.delay(retry);
        debug!(
            records = batch.len(),
            attempt = attempts,
            ?backoff,
            "log batch send failed, retrying: {reason}"
        );
        PipelineStats::incr(&stats.retries, 1);

        tokio::select! {
            _ = sleep(backoff) => {}
            _ = shutdown.cancelled() => {
                warn!(records = batch.len(), "shutdown during backoff, making final attempt");
                attempts += 1;
                return match transport.send(batch, credentials).await {
                    Ok(()) => DeliveryOutcome::Delivered { attempts },
                    Err(e @ TransportError::Fatal(_)) => DeliveryOutcome::Rejected {
                        attempts,
                        reason: e.to_string(),
                    },
                    Err(e) => DeliveryOutcome::Exhausted {
                        attempts,
                        reason: e.to_string(),
                    },
                };
            }
        }
    }
}
