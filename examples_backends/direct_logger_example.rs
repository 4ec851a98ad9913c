use std::time::Duration;

use logbull::logger::Fields;
use logbull::{LogBullConfig, Logger};
use serde_json::json;

/// Direct logging without `tracing`.
///
/// Reads `LOGBULL_PROJECT_ID`, `LOGBULL_HOST` and `LOGBULL_API_KEY`. When
/// they are missing the logger only prints to stdout.
#[tokio::main]
async fn main() {
    let logger = Logger::new(LogBullConfig::from_env()).expect("valid LogBull config");
    if logger.console_only_mode() {
        println!("LOGBULL_PROJECT_ID / LOGBULL_HOST not set, running console-only");
    }

    logger.info("service starting", Fields::new());

    let request_logger = logger.with_context(Fields::from([
        ("request_id".to_string(), json!("req-42")),
        ("user".to_string(), json!("john_doe")),
    ]));
    request_logger.info("user logged in", Fields::new());
    request_logger.warning(
        "slow request",
        Fields::from([("elapsed_ms".to_string(), json!(1840))]),
    );

    if !logger.flush(Duration::from_secs(5)).await {
        eprintln!("some logs could not be delivered");
    }
    logger.shutdown(Duration::from_secs(5)).await;
    println!("{:?}", logger.stats());
}
