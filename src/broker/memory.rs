//! In-process broker
//!
//! Topics are append-only logs and each consumer group keeps its own offset
//! per topic, so several backends sharing one `MemoryBroker` behave like
//! fetchers sharing a Kafka cluster. Failure counters let tests make role
//! connections, sends and polls fail on demand.

use crate::broker::{Broker, BrokerError, BrokerMessage, BrokerResult, Consumer, Producer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Failure count meaning "fail every time"
pub const ALWAYS: u32 = u32::MAX;

/// Counters of the calls a `MemoryBroker` has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryBrokerStats {
    pub producer_connects: u32,
    pub consumer_connects: u32,
    pub send_attempts: u32,
    pub polls: u32,
    pub flushes: u32,
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<Vec<u8>>>,
    offsets: HashMap<(String, String), usize>,
    failing_producer_connects: u32,
    failing_consumer_connects: u32,
    failing_sends: u32,
    failing_polls: u32,
    stats: MemoryBrokerStats,
}

/// Consumes one pending failure, returning true when the call should fail
fn take_failure(counter: &mut u32) -> bool {
    match *counter {
        0 => false,
        ALWAYS => true,
        _ => {
            *counter -= 1;
            true
        }
    }
}

/// A broker that keeps every topic in memory
///
/// Clones share the same topics, which lets a test keep a handle for
/// inspection after giving the broker to a backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Appends a payload to a topic directly, bypassing any producer
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.lock()
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(payload.into());
    }

    /// Returns every payload ever appended to a topic, oldest first
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.lock().topics.get(topic).cloned().unwrap_or_default()
    }

    /// Makes the next `n` producer connections fail (`ALWAYS` for all)
    pub fn fail_producer_connects(&self, n: u32) {
        self.lock().failing_producer_connects = n;
    }

    /// Makes the next `n` consumer connections fail (`ALWAYS` for all)
    pub fn fail_consumer_connects(&self, n: u32) {
        self.lock().failing_consumer_connects = n;
    }

    /// Makes the next `n` sends fail (`ALWAYS` for all)
    pub fn fail_sends(&self, n: u32) {
        self.lock().failing_sends = n;
    }

    /// Makes the next `n` polls fail (`ALWAYS` for all)
    pub fn fail_polls(&self, n: u32) {
        self.lock().failing_polls = n;
    }

    /// Shorthand for refusing every role connection
    pub fn set_unreachable(&self, unreachable: bool) {
        let n = if unreachable { ALWAYS } else { 0 };
        let mut state = self.lock();
        state.failing_producer_connects = n;
        state.failing_consumer_connects = n;
    }

    pub fn stats(&self) -> MemoryBrokerStats {
        self.lock().stats
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn create_producer(&self) -> BrokerResult<Box<dyn Producer>> {
        let mut state = self.lock();
        state.stats.producer_connects += 1;

        if take_failure(&mut state.failing_producer_connects) {
            return Err(BrokerError::Connection {
                role: "producer",
                reason: "memory broker refused the connection".to_string(),
            });
        }

        Ok(Box::new(MemoryProducer {
            state: Arc::clone(&self.state),
        }))
    }

    async fn create_consumer(&self, group: &str, topic: &str) -> BrokerResult<Box<dyn Consumer>> {
        let mut state = self.lock();
        state.stats.consumer_connects += 1;

        if take_failure(&mut state.failing_consumer_connects) {
            return Err(BrokerError::Connection {
                role: "consumer",
                reason: "memory broker refused the connection".to_string(),
            });
        }

        Ok(Box::new(MemoryConsumer {
            state: Arc::clone(&self.state),
            group: group.to_string(),
            topic: topic.to_string(),
        }))
    }
}

struct MemoryProducer {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> BrokerResult<()> {
        let mut state = lock_state(&self.state);
        state.stats.send_attempts += 1;

        if take_failure(&mut state.failing_sends) {
            return Err(BrokerError::Send {
                topic: topic.to_string(),
                reason: "memory broker rejected the message".to_string(),
            });
        }

        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(payload.to_vec());
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> BrokerResult<()> {
        lock_state(&self.state).stats.flushes += 1;
        Ok(())
    }
}

struct MemoryConsumer {
    state: Arc<Mutex<State>>,
    group: String,
    topic: String,
}

impl MemoryConsumer {
    fn take_available(&self, max_n: usize) -> Vec<BrokerMessage> {
        let mut state = lock_state(&self.state);
        let key = (self.group.clone(), self.topic.clone());
        let start = state.offsets.get(&key).copied().unwrap_or(0);

        let batch: Vec<BrokerMessage> = state
            .topics
            .get(&self.topic)
            .map(|log| {
                log.iter()
                    .enumerate()
                    .skip(start)
                    .take(max_n)
                    .map(|(offset, payload)| BrokerMessage {
                        topic: self.topic.clone(),
                        offset: offset as i64,
                        payload: payload.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        state.offsets.insert(key, start + batch.len());
        batch
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn poll_batch(
        &self,
        max_n: usize,
        timeout: Duration,
    ) -> BrokerResult<Vec<BrokerMessage>> {
        {
            let mut state = lock_state(&self.state);
            state.stats.polls += 1;

            if take_failure(&mut state.failing_polls) {
                return Err(BrokerError::Poll {
                    topic: self.topic.clone(),
                    reason: "memory broker poll failed".to_string(),
                });
            }
        }

        let batch = self.take_available(max_n);
        if !batch.is_empty() || max_n == 0 {
            return Ok(batch);
        }

        // Nothing yet: block for the timeout, then hand over whatever arrived
        tokio::time::sleep(timeout).await;
        Ok(self.take_available(max_n))
    }
}
