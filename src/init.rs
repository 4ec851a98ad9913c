use crate::config::LogBullConfig;
use crate::error::ConfigError;
use crate::layer::LogBullLayer;
use crate::pipeline::LogBull;
use crate::record::LogLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// How the `tracing` integration is installed.
///
/// **Fields**
/// - `min_level`: events below this level are not shipped.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`LogBullLayer`] so events are also printed locally.
///   This is what keeps logs visible when the pipeline is disabled.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: LogLevel,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            enable_stdout: true,
        }
    }
}

/// Build a pipeline from `config` and install it as the global `tracing`
/// subscriber.
///
/// **Returns**
/// - the [`LogBull`] handle, to be flushed or shut down before exit.
/// - `Err(ConfigError)` for invalid pipeline parameters or when a global
///   subscriber is already set.
pub fn init_tracing_with_config(
    config: LogBullConfig,
    layer_config: LayerConfig,
) -> Result<LogBull, ConfigError> {
    let pipeline = LogBull::new(config)?;
    init_tracing_with_pipeline(pipeline, layer_config)
}

/// Install an already built pipeline, e.g. one using a custom
/// [`Transport`](crate::transport::Transport), as the global subscriber.
pub fn init_tracing_with_pipeline(
    pipeline: LogBull,
    layer_config: LayerConfig,
) -> Result<LogBull, ConfigError> {
    let layer = LogBullLayer::new(pipeline.clone(), layer_config.min_level);

    // The two branches produce different subscriber types, so each one is
    // installed separately.
    let installed = if layer_config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.map_err(|_| ConfigError::SubscriberAlreadySet)?;

    Ok(pipeline)
}

/// Initialize tracing with [`LayerConfig::default`].
pub fn init_tracing(config: LogBullConfig) -> Result<LogBull, ConfigError> {
    init_tracing_with_config(config, LayerConfig::default())
}
