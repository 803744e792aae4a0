//! Frontier-Bridge: a message-broker backend for a crawl frontier
//!
//! This crate connects a crawl frontier to a topic-based broker. Fetch requests
//! are consumed from a "todo" topic and crawl results are published to a "done"
//! topic, with bounded retries and lazy reconnection on both paths.

pub mod backend;
pub mod broker;
pub mod codec;
pub mod config;
pub mod connection;
pub mod models;
pub mod retry;

use thiserror::Error;

/// Main error type for Frontier-Bridge operations
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] broker::BrokerError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid value for setting {key}: {value}")]
    InvalidSetting { key: String, value: String },
}

/// Result type alias for Frontier-Bridge operations
pub type Result<T> = std::result::Result<T, FrontierError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use backend::{Backend, BatchSource, BrokerBackend, LifecycleState, NextBatch};
pub use config::{BrokerConfig, Config};
pub use models::{Request, Response};
