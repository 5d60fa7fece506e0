use thiserror::Error;

/// Configuration could not be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidValue { .. } => "RUST_ENGINE_CONFIG_INVALID_VALUE",
            Self::InvalidBind(_) => "RUST_ENGINE_CONFIG_INVALID_BIND",
            Self::Malformed(_) => "RUST_ENGINE_CONFIG_MALFORMED",
        }
    }
}

/// Failure starting or running the transport.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("server already running")]
    AlreadyRunning,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
