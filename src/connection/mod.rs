//! Lazy connection management for the publisher and consumer roles
//!
//! Each role is opened on first use and re-opened from scratch after a failed
//! attempt. Role failures are recoverable: they are logged and reported as
//! `false`, never returned as errors.

mod state;

pub use state::ConnectionState;

use crate::broker::{Broker, Consumer, Producer};
use std::sync::Arc;
use std::time::Duration;

/// One broker role and the handle it holds while connected
struct Role<H: ?Sized> {
    handle: Option<Box<H>>,
    state: ConnectionState,
}

impl<H: ?Sized> Role<H> {
    fn new() -> Self {
        Self {
            handle: None,
            state: ConnectionState::Unconnected,
        }
    }

    fn connected(&mut self, handle: Box<H>) {
        self.handle = Some(handle);
        self.state = ConnectionState::Connected;
    }

    fn failed(&mut self) {
        self.handle = None;
        self.state = ConnectionState::Failed;
    }

    fn reset(&mut self) -> Option<Box<H>> {
        self.state = ConnectionState::Unconnected;
        self.handle.take()
    }
}

/// Owns the broker client and both role handles
pub struct ConnectionManager {
    broker: Arc<dyn Broker>,
    group: String,
    topic_todo: String,
    publisher: Role<dyn Producer>,
    consumer: Role<dyn Consumer>,
}

impl ConnectionManager {
    /// Creates a manager with both roles unconnected
    ///
    /// # Arguments
    ///
    /// * `broker` - The broker client the roles are opened on
    /// * `group` - Consumer group used for the todo topic
    /// * `topic_todo` - Topic the consumer role reads
    pub fn new(broker: Arc<dyn Broker>, group: &str, topic_todo: &str) -> Self {
        Self {
            broker,
            group: group.to_string(),
            topic_todo: topic_todo.to_string(),
            publisher: Role::new(),
            consumer: Role::new(),
        }
    }

    /// Makes sure the publisher role is connected
    ///
    /// Returns true immediately when it already is. Otherwise a producer is
    /// requested from the broker; on failure the role is left without a handle
    /// so that the next call starts over.
    pub async fn ensure_publisher_connected(&mut self) -> bool {
        if self.publisher.state.is_connected() {
            return true;
        }

        match self.broker.create_producer().await {
            Ok(producer) => {
                self.publisher.connected(producer);
                tracing::debug!("Producer connected");
                true
            }
            Err(e) => {
                self.publisher.failed();
                tracing::warn!("Could not connect producer to broker: {}", e);
                false
            }
        }
    }

    /// Makes sure the consumer role is connected to the todo topic
    pub async fn ensure_consumer_connected(&mut self) -> bool {
        if self.consumer.state.is_connected() {
            return true;
        }

        match self
            .broker
            .create_consumer(&self.group, &self.topic_todo)
            .await
        {
            Ok(consumer) => {
                self.consumer.connected(consumer);
                tracing::debug!(
                    "Consumer connected to {} (group {})",
                    self.topic_todo,
                    self.group
                );
                true
            }
            Err(e) => {
                self.consumer.failed();
                tracing::warn!("Could not connect consumer to broker: {}", e);
                false
            }
        }
    }

    /// Flushes and drops the producer, if any
    ///
    /// Flush failures are logged; the role ends up unconnected either way.
    pub async fn disconnect_publisher(&mut self, flush_timeout: Duration) {
        if let Some(producer) = self.publisher.reset() {
            match producer.flush(flush_timeout).await {
                Ok(()) => tracing::debug!("Producer flushed and closed"),
                Err(e) => tracing::warn!("Could not flush producer on close: {}", e),
            }
        }
    }

    /// The connected producer, if any
    pub fn publisher(&self) -> Option<&dyn Producer> {
        self.publisher.handle.as_deref()
    }

    /// The connected consumer, if any
    pub fn consumer(&self) -> Option<&dyn Consumer> {
        self.consumer.handle.as_deref()
    }

    pub fn publisher_state(&self) -> ConnectionState {
        self.publisher.state
    }

    pub fn consumer_state(&self) -> ConnectionState {
        self.consumer.state
    }
}
