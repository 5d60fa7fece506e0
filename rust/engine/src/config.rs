use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::str::FromStr;

pub const ENV_BIND: &str = "RESTFUL_BIND";
pub const ENV_KEEP_ALIVE: &str = "RESTFUL_KEEP_ALIVE";
pub const ENV_MAX_BODY_BYTES: &str = "RESTFUL_MAX_BODY_BYTES";
pub const ENV_LOG: &str = "RESTFUL_LOG";

/// Transport settings for [`HttpEngine`](crate::HttpEngine).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Listen address, e.g. `127.0.0.1:8080`. Port 0 picks a free port.
    pub bind: String,
    /// HTTP/1 keep-alive on accepted connections.
    pub keep_alive: bool,
    /// Requests with a larger body are answered with 413.
    pub max_body_bytes: usize,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            keep_alive: true,
            max_body_bytes: 1024 * 1024,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RESTFUL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.socket_addr()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(bind) = lookup(ENV_BIND) {
            config.bind = bind;
        }
        if let Some(raw) = lookup(ENV_KEEP_ALIVE) {
            config.keep_alive = parse_flag(ENV_KEEP_ALIVE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_BODY_BYTES) {
            config.max_body_bytes = parse_value(ENV_MAX_BODY_BYTES, &raw)?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            config.log_filter = filter;
        }
        config.socket_addr()?;
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.bind.clone()))
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
    })
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}
