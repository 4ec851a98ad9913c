use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use logbull::init::{init_tracing_with_pipeline, LayerConfig};
use logbull::transport::NoopTransport;
use logbull::{LogBull, PipelineConfig};

#[tokio::main]
async fn main() {
    let pipeline = LogBull::with_transport(
        PipelineConfig::new("http://localhost:4005", "load-test"),
        Arc::new(NoopTransport),
    )
    .expect("valid pipeline config");
    let pipeline = init_tracing_with_pipeline(pipeline, LayerConfig::default())
        .expect("no other global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    pipeline.shutdown(Duration::from_secs(5)).await;
    println!("{:?}", pipeline.stats());
}
