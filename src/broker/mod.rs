//! Message broker abstraction
//!
//! The backend talks to the broker through three traits:
//! - `Broker`: the client handle, able to open producer and consumer roles
//! - `Producer`: publishes payloads to a topic
//! - `Consumer`: polls batches from the topic it was opened on
//!
//! `MemoryBroker` keeps topics in process and can inject failures. `KafkaBroker`
//! (feature `kafka`) is the production implementation.

#[cfg(feature = "kafka")]
mod kafka;
mod memory;

#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
pub use memory::{MemoryBroker, MemoryBrokerStats, ALWAYS};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a broker implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Broker unavailable at {server}: {reason}")]
    Unavailable { server: String, reason: String },

    #[error("Could not open {role}: {reason}")]
    Connection { role: &'static str, reason: String },

    #[error("Could not send to {topic}: {reason}")]
    Send { topic: String, reason: String },

    #[error("Could not poll {topic}: {reason}")]
    Poll { topic: String, reason: String },

    #[error("Could not flush producer: {0}")]
    Flush(String),
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// A message read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// A connected broker client
///
/// Opening a role may fail when the broker is reachable but not ready to serve
/// it (leader election, missing topic, ...). Such failures are recoverable:
/// callers are expected to try again later.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Opens a producer
    async fn create_producer(&self) -> BrokerResult<Box<dyn Producer>>;

    /// Opens a consumer reading `topic` under the consumer group `group`
    async fn create_consumer(&self, group: &str, topic: &str) -> BrokerResult<Box<dyn Consumer>>;
}

/// Publishing side of a broker connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publishes one payload to `topic`
    async fn send(&self, topic: &str, payload: &[u8]) -> BrokerResult<()>;

    /// Delivers any buffered messages, waiting at most `timeout`
    async fn flush(&self, timeout: Duration) -> BrokerResult<()>;
}

/// Reading side of a broker connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Returns up to `max_n` messages, waiting at most `timeout` for them
    ///
    /// An empty batch means nothing arrived within the timeout.
    async fn poll_batch(&self, max_n: usize, timeout: Duration)
        -> BrokerResult<Vec<BrokerMessage>>;
}
