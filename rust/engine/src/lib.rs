//! # RESTFUL ENGINE
//!
//! **TRANSPORT:** hyper server feeding a `restful` dispatcher
//! **CONFIGURATION:** `EngineConfig` from defaults, `RESTFUL_*` variables or JSON
//! **LOGGING:** `env_logger` bootstrap behind the `log` facade

pub mod config;
pub mod error;
pub mod logging;
pub mod server;

pub use config::EngineConfig;
pub use error::{ConfigError, EngineError};
pub use logging::init_logging;
pub use server::HttpEngine;
