pub mod batch;
pub mod config;
pub mod env;
pub mod error;
pub mod format;
pub mod init;
pub mod layer;
pub mod logger;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod retry;
pub mod stats;
pub mod timestamp;
pub mod transport;
mod worker;

#[cfg(feature = "http")]
pub mod http;

pub use config::{Credentials, LogBullConfig, PipelineConfig};
pub use error::{ConfigError, ValidationError};
pub use logger::Logger;
pub use pipeline::{LogBull, PipelineState};
pub use queue::OverflowPolicy;
pub use record::{LogLevel, LogRecord};
pub use transport::{Transport, TransportError};
