use serde::Deserialize;
use std::time::Duration;

/// Default broker endpoint
pub const DEFAULT_SERVER: &str = "localhost:9092";

/// Default consumer group on the todo topic
pub const DEFAULT_GROUP: &str = "scrapy-crawler";

/// Default topic polled for fetch requests
pub const DEFAULT_TOPIC_TODO: &str = "frontier-todo";

/// Default topic receiving crawl results
pub const DEFAULT_TOPIC_DONE: &str = "frontier-done";

/// Default per-attempt wait, in seconds
pub const DEFAULT_WAIT_TIME: f64 = 1.0;

/// Default retry ceiling for publish and batch-read
pub const DEFAULT_COMM_TRIES: u32 = 5;

/// Main configuration structure for Frontier-Bridge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Broker connection and exchange configuration
///
/// Every field is optional in the TOML file; unset fields take the
/// `DEFAULT_*` values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker address (`host:port`, or a comma-separated bootstrap list)
    pub server: String,

    /// Consumer group identifying this reader's offsets on the todo topic
    pub group: String,

    /// Topic polled for fetch requests
    #[serde(rename = "topic-todo")]
    pub topic_todo: String,

    /// Topic that crawl results are published to
    #[serde(rename = "topic-done")]
    pub topic_done: String,

    /// Per-poll timeout and pause between publish retries (seconds)
    #[serde(rename = "wait-time")]
    pub wait_time: f64,

    /// Maximum attempts for both publish and batch-read
    #[serde(rename = "comm-tries")]
    pub comm_tries: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            group: DEFAULT_GROUP.to_string(),
            topic_todo: DEFAULT_TOPIC_TODO.to_string(),
            topic_done: DEFAULT_TOPIC_DONE.to_string(),
            wait_time: DEFAULT_WAIT_TIME,
            comm_tries: DEFAULT_COMM_TRIES,
        }
    }
}

impl BrokerConfig {
    /// Returns the configured wait time as a `Duration`
    ///
    /// Values that validation rejects (negative, non-finite or too large to
    /// represent) collapse to zero.
    pub fn wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.wait_time).unwrap_or(Duration::ZERO)
    }
}
