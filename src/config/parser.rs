use crate::config::types::{BrokerConfig, Config};
use crate::config::validation::{validate, validate_broker_config};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Settings keys used by the frontier manager
const SETTING_SERVER: &str = "KAFKA_SERVER";
const SETTING_GROUP: &str = "KAFKA_GROUP";
const SETTING_TOPIC_TODO: &str = "KAFKA_TOPIC_TODO";
const SETTING_TOPIC_DONE: &str = "KAFKA_TOPIC_DONE";
const SETTING_WAIT_TIME: &str = "KAFKA_WAIT_TIME";
const SETTING_COMM_TRIES: &str = "KAFKA_COMM_TRIES";

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that every fetcher process can be matched to the
/// exact configuration it ran with.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

impl BrokerConfig {
    /// Builds a broker configuration from the frontier manager's settings
    ///
    /// Recognized keys are `KAFKA_SERVER`, `KAFKA_GROUP`, `KAFKA_TOPIC_TODO`,
    /// `KAFKA_TOPIC_DONE`, `KAFKA_WAIT_TIME` and `KAFKA_COMM_TRIES`. Missing
    /// keys keep their defaults; other keys are ignored.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = BrokerConfig::default();

        if let Some(server) = settings.get(SETTING_SERVER) {
            config.server = server.clone();
        }
        if let Some(group) = settings.get(SETTING_GROUP) {
            config.group = group.clone();
        }
        if let Some(topic) = settings.get(SETTING_TOPIC_TODO) {
            config.topic_todo = topic.clone();
        }
        if let Some(topic) = settings.get(SETTING_TOPIC_DONE) {
            config.topic_done = topic.clone();
        }
        if let Some(wait_time) = parse_setting(settings, SETTING_WAIT_TIME)? {
            config.wait_time = wait_time;
        }
        if let Some(comm_tries) = parse_setting(settings, SETTING_COMM_TRIES)? {
            config.comm_tries = comm_tries;
        }

        validate_broker_config(&config)?;
        Ok(config)
    }
}

fn parse_setting<T: FromStr>(
    settings: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match settings.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting {
                key: key.to_string(),
                value: raw.clone(),
            }),
    }
}
