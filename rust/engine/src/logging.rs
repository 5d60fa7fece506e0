use crate::config::EngineConfig;
use env_logger::Env;

/// Installs the global logger. `RUST_LOG` wins over the configured filter.
///
/// Returns `false` when a logger was already installed.
pub fn init_logging(config: &EngineConfig) -> bool {
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_filter.as_str()))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
