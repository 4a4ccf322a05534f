//! Layered configuration resolution for the IVR navigation agent.
//!
//! `settings` holds the process-wide configuration loaded from files and
//! environment; `resolver` merges it with per-call and per-turn overrides
//! into the `ivr_core::CallConfig` each component actually consumes.

pub mod resolver;
pub mod settings;

pub use resolver::{ConfigResolver, TurnOverride};
pub use settings::{
    AuthConfig, CallDefaults, HistoryPersistenceConfig, LlmConfig, ObservabilityConfig,
    RuntimeEnvironment, ServerConfig, Settings, load_settings,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
    #[error("missing required configuration field: {0}")]
    MissingField(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
