use async_trait::async_trait;

use crate::batch::Batch;
use crate::config::Credentials;

/// Outcome of a failed send attempt.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Transient failure (network error, timeout, 5xx); the batch may be
    /// retried after a backoff.
    #[error("retryable transport failure: {0}")]
    Retryable(String),

    /// Permanent rejection (bad credentials, malformed payload); the batch
    /// is discarded without further attempts.
    #[error("fatal transport failure: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Retryable(_))
    }
}

/// Asynchronous destination for [`Batch`]es cut by the delivery worker.
///
/// Implementations perform exactly one network call per invocation; retry
/// and backoff are handled by the pipeline. `send` is only ever called from
/// the background worker, never on the application's logging call site.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one batch to the remote collector.
    ///
    /// **Returns**
    /// - `Ok(())` if the collector accepted the batch.
    /// - `Err(TransportError::Retryable(..))` for transient failures.
    /// - `Err(TransportError::Fatal(..))` when retrying cannot help.
    async fn send(&self, batch: &Batch, credentials: &Credentials) -> Result<(), TransportError>;
}

/// A transport that accepts and drops every batch.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// external I/O.
#[derive(Clone, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send(&self, _batch: &Batch, _credentials: &Credentials) -> Result<(), TransportError> {
        Ok(())
    }
}
