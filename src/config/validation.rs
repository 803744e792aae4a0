use crate::config::types::{BrokerConfig, Config};
use crate::ConfigError;
use std::time::Duration;

/// Kafka refuses topic names longer than this
const MAX_TOPIC_NAME_LEN: usize = 249;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_broker_config(&config.broker)
}

/// Validates broker configuration
pub fn validate_broker_config(config: &BrokerConfig) -> Result<(), ConfigError> {
    if config.server.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server cannot be empty".to_string(),
        ));
    }

    if config.group.trim().is_empty() {
        return Err(ConfigError::Validation("group cannot be empty".to_string()));
    }

    validate_topic_name("topic-todo", &config.topic_todo)?;
    validate_topic_name("topic-done", &config.topic_done)?;

    if config.topic_todo == config.topic_done {
        return Err(ConfigError::Validation(format!(
            "topic-todo and topic-done must differ, both are '{}'",
            config.topic_todo
        )));
    }

    if !config.wait_time.is_finite() || config.wait_time < 0.0 {
        return Err(ConfigError::Validation(format!(
            "wait-time must be a non-negative number of seconds, got {}",
            config.wait_time
        )));
    }

    if Duration::try_from_secs_f64(config.wait_time).is_err() {
        return Err(ConfigError::Validation(format!(
            "wait-time of {} seconds is too large",
            config.wait_time
        )));
    }

    if config.comm_tries < 1 {
        return Err(ConfigError::Validation(format!(
            "comm-tries must be >= 1, got {}",
            config.comm_tries
        )));
    }

    Ok(())
}

/// Validates a topic name against the broker's naming rules
fn validate_topic_name(field: &str, topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
    }

    if topic.len() > MAX_TOPIC_NAME_LEN {
        return Err(ConfigError::Validation(format!(
            "{} must be at most {} characters, got {}",
            field,
            MAX_TOPIC_NAME_LEN,
            topic.len()
        )));
    }

    if !topic
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "{} '{}' may only contain ASCII letters, digits, '.', '_' and '-'",
            field, topic
        )));
    }

    Ok(())
}
