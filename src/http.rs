use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::batch::Batch;
use crate::config::{Credentials, PipelineConfig};
use crate::error::ConfigError;
use crate::record::{LogLevel, LogRecord};
use crate::transport::{Transport, TransportError};

/// Header carrying the optional project API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// [`Transport`] that posts batches to a LogBull collector over HTTP.
///
/// Each batch becomes one `POST {host}/api/v1/logs/receiving/{project_id}`
/// request with a JSON body of the form `{"logs": [...]}`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for `config.endpoint` with the configured
    /// per-request timeout.
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, credentials: &Credentials) -> String {
        format!(
            "{}/api/v1/logs/receiving/{}",
            self.base_url,
            urlencoding::encode(&credentials.project_id)
        )
    }

    fn map_record(record: &LogRecord) -> WireEntry<'_> {
        WireEntry {
            level: record.level(),
            message: record.message(),
            timestamp: format_timestamp(record.timestamp_ns()),
            fields: record.fields(),
        }
    }
}

#[derive(Serialize)]
struct WireBatch<'a> {
    logs: Vec<WireEntry<'a>>,
}

#[derive(Serialize)]
struct WireEntry<'a> {
    level: LogLevel,
    message: &'a str,
    timestamp: String,
    fields: &'a BTreeMap<String, serde_json::Value>,
}

/// RFC 3339 UTC timestamp with nanosecond precision.
pub fn format_timestamp(timestamp_ns: u64) -> String {
    let nanos = i64::try_from(timestamp_ns).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// 408, 429 and 5xx are worth retrying; any other failure status is not.
fn classify_status(status: StatusCode) -> Option<bool> {
    if status.is_success() {
        None
    } else {
        Some(
            status.is_server_error()
                || status == StatusCode::REQUEST_TIMEOUT
                || status == StatusCode::TOO_MANY_REQUESTS,
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &Batch, credentials: &Credentials) -> Result<(), TransportError> {
        let body = WireBatch {
            logs: batch.iter().map(Self::map_record).collect(),
        };

        let mut request = self.client.post(self.endpoint(credentials)).json(&body);
        if let Some(api_key) = &credentials.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_builder() {
                TransportError::Fatal(format!("failed to build request: {e}"))
            } else {
                TransportError::Retryable(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status();
        match classify_status(status) {
            None => Ok(()),
            Some(retryable) => {
                let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                let message = format!("LogBull collector responded with status {status}: {text}");
                if retryable {
                    Err(TransportError::Retryable(message))
                } else {
                    Err(TransportError::Fatal(message))
                }
            }
        }
    }
}
