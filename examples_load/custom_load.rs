use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use logbull::init::{init_tracing_with_pipeline, LayerConfig};
use logbull::transport::NoopTransport;
use logbull::{LogBull, LogLevel, OverflowPolicy, PipelineConfig};

#[tokio::main]
async fn main() {
    let mut config = PipelineConfig::new("http://localhost:4005", "load-test");
    config.queue_capacity = 50_000;
    config.batch_max_count = 1_000;
    config.flush_interval = Duration::from_millis(200);
    config.overflow_policy = OverflowPolicy::RejectNew;

    let pipeline = LogBull::with_transport(config, Arc::new(NoopTransport))
        .expect("valid pipeline config");

    let layer_config = LayerConfig {
        min_level: LogLevel::Warning,
        enable_stdout: false,
    };
    let pipeline = init_tracing_with_pipeline(pipeline, layer_config)
        .expect("no other global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let flushed = pipeline.flush(Duration::from_secs(5)).await;
    pipeline.shutdown(Duration::from_secs(5)).await;
    println!("flushed: {flushed}, {:?}", pipeline.stats());
}
