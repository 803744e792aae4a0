//! Configuration module for Frontier-Bridge
//!
//! This module handles loading, parsing, and validating the broker connection
//! settings, either from a TOML file or from the frontier manager's settings map.
//!
//! # Example
//!
//! ```no_run
//! use frontier_bridge::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("frontier.toml")).unwrap();
//! println!("Polling topic: {}", config.broker.topic_todo);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrokerConfig, Config, DEFAULT_COMM_TRIES, DEFAULT_GROUP, DEFAULT_SERVER, DEFAULT_TOPIC_DONE,
    DEFAULT_TOPIC_TODO, DEFAULT_WAIT_TIME,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate_broker_config;
