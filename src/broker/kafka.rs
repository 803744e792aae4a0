//! Kafka implementation of the broker traits, built on `rdkafka`

use crate::broker::{Broker, BrokerError, BrokerMessage, BrokerResult, Consumer, Producer};
use async_trait::async_trait;
use rdkafka::consumer::{BaseConsumer, Consumer as _, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Shortest delivery timeout handed to librdkafka, where zero means "forever"
const MIN_DELIVERY_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-message delivery bound for a given send timeout
fn delivery_timeout(send_timeout: Duration) -> Duration {
    send_timeout.max(MIN_DELIVERY_TIMEOUT)
}

/// A Kafka cluster client
pub struct KafkaBroker {
    server: String,
    send_timeout: Duration,
}

impl KafkaBroker {
    /// Connects to the cluster at `server`
    ///
    /// The cluster metadata is fetched once, on the blocking pool, so that an
    /// unreachable bootstrap list is reported here rather than on the first
    /// send or poll.
    ///
    /// # Arguments
    ///
    /// * `server` - Bootstrap servers (`host:port[,host:port...]`)
    /// * `connect_timeout` - Bound on the metadata request
    /// * `send_timeout` - Bound on delivering each published message
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaBroker)` - The cluster answered
    /// * `Err(BrokerError::Unavailable)` - No broker could be reached
    pub async fn connect(
        server: &str,
        connect_timeout: Duration,
        send_timeout: Duration,
    ) -> BrokerResult<Self> {
        let unavailable = |reason: String| BrokerError::Unavailable {
            server: server.to_string(),
            reason,
        };

        let bootstrap = server.to_string();
        let probe = tokio::task::spawn_blocking(move || {
            let consumer: BaseConsumer = ClientConfig::new()
                .set("bootstrap.servers", &bootstrap)
                .create()
                .map_err(|e| e.to_string())?;

            consumer
                .fetch_metadata(None, Timeout::After(connect_timeout))
                .map(|metadata| (metadata.brokers().len(), metadata.topics().len()))
                .map_err(|e| e.to_string())
        });

        let (brokers, topics) = probe
            .await
            .map_err(|e| unavailable(e.to_string()))?
            .map_err(unavailable)?;

        tracing::debug!(
            "Connected to Kafka at {} ({} brokers, {} topics)",
            server, brokers, topics
        );

        Ok(Self {
            server: server.to_string(),
            send_timeout,
        })
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn create_producer(&self) -> BrokerResult<Box<dyn Producer>> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.server)
            .set(
                "message.timeout.ms",
                delivery_timeout(self.send_timeout).as_millis().to_string(),
            )
            .create()
            .map_err(|e| BrokerError::Connection {
                role: "producer",
                reason: e.to_string(),
            })?;

        Ok(Box::new(KafkaProducer {
            producer,
            send_timeout: delivery_timeout(self.send_timeout),
        }))
    }

    async fn create_consumer(&self, group: &str, topic: &str) -> BrokerResult<Box<dyn Consumer>> {
        let connection_error = |reason: String| BrokerError::Connection {
            role: "consumer",
            reason,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.server)
            .set("group.id", group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| connection_error(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| connection_error(e.to_string()))?;

        Ok(Box::new(KafkaConsumer {
            consumer,
            topic: topic.to_string(),
        }))
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> BrokerResult<()> {
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);

        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| BrokerError::Send {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn flush(&self, timeout: Duration) -> BrokerResult<()> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| BrokerError::Flush(e.to_string()))
    }
}

struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn poll_batch(
        &self,
        max_n: usize,
        timeout: Duration,
    ) -> BrokerResult<Vec<BrokerMessage>> {
        let deadline = Instant::now() + timeout;
        let mut batch = Vec::with_capacity(max_n);

        while batch.len() < max_n {
            let received = match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Ok(received) => received,
                Err(_) => break,
            };

            match received {
                Ok(message) => batch.push(BrokerMessage {
                    topic: message.topic().to_string(),
                    offset: message.offset(),
                    payload: message.payload().unwrap_or_default().to_vec(),
                }),
                // Keep what was already read; the error resurfaces on the next poll
                Err(e) if !batch.is_empty() => {
                    tracing::debug!("Stopping batch early on {}: {}", self.topic, e);
                    break;
                }
                Err(e) => {
                    return Err(BrokerError::Poll {
                        topic: self.topic.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delivery_timeout_follows_send_timeout() {
        assert_eq!(
            delivery_timeout(Duration::from_secs(2)),
            Duration::from_secs(2)
        );
        assert_eq!(delivery_timeout(Duration::ZERO), MIN_DELIVERY_TIMEOUT);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unreachable_cluster_does_not_stall_runtime() {
        let ticks = Arc::new(AtomicU32::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let started = Instant::now();
        let result = KafkaBroker::connect(
            "127.0.0.1:1",
            Duration::from_millis(500),
            Duration::from_secs(1),
        )
        .await;
        let elapsed = started.elapsed();
        ticker.abort();

        assert!(matches!(result, Err(BrokerError::Unavailable { .. })));
        // A blocked runtime never lets the ticker run while connecting
        if elapsed >= Duration::from_millis(100) {
            assert!(ticks.load(Ordering::SeqCst) > 0);
        }
    }
}
