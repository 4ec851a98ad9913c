use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logbull::batch::Batch;
use logbull::init::{init_tracing_with_pipeline, LayerConfig};
use logbull::{Credentials, LogBull, PipelineConfig, Transport, TransportError};
use tracing::{error, info};

/// Example of shipping batches somewhere other than a LogBull server by
/// implementing the `Transport` trait directly. Imagine this talks to some
/// proprietary store for which this crate has no built-in transport.
struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, batch: &Batch, credentials: &Credentials) -> Result<(), TransportError> {
        // Here you would call your own client library. Returning
        // `TransportError::Retryable` makes the pipeline back off and retry.
        for record in batch.iter() {
            println!(
                "[{}] {} {} {:?}",
                credentials.project_id,
                record.level(),
                record.message(),
                record.fields()
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let pipeline = LogBull::with_transport(
        PipelineConfig::new("http://unused.local", "custom-transport-demo"),
        Arc::new(StdoutTransport),
    )
    .expect("valid pipeline config");

    let layer_config = LayerConfig {
        enable_stdout: false,
        ..LayerConfig::default()
    };
    let pipeline = init_tracing_with_pipeline(pipeline, layer_config)
        .expect("no other global subscriber");

    info!("custom transport example started");
    error!(store = "my-custom-store", "simulated error sent via custom transport");

    pipeline.shutdown(Duration::from_secs(5)).await;
}
