//! Broker-backed frontier backend
//!
//! Requests to fetch come from the todo topic, crawl results go to the done
//! topic. Seeds added by the frontier manager are served from memory before
//! the broker is polled at all.

use crate::backend::seeds::SeedBuffer;
use crate::backend::{Backend, BatchSource, LifecycleState, NextBatch};
#[cfg(feature = "kafka")]
use crate::broker::KafkaBroker;
use crate::broker::{Broker, BrokerMessage};
use crate::codec::{self, CrawlEvent};
use crate::config::BrokerConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::models::{Request, Response};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Bound on flushing buffered results when the backend stops
const STOP_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on reaching the cluster when the Kafka client is built
#[cfg(feature = "kafka")]
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frontier backend exchanging requests and results through a broker
pub struct BrokerBackend {
    config: BrokerConfig,
    connections: ConnectionManager,
    retry: RetryPolicy,
    seeds: SeedBuffer,
    state: LifecycleState,
}

impl BrokerBackend {
    /// Creates a backend on an already connected broker client
    ///
    /// Both roles are opened right away on a best-effort basis: failures are
    /// logged and the roles are retried when first needed.
    ///
    /// # Arguments
    ///
    /// * `config` - Topics, consumer group and retry settings
    /// * `broker` - The broker client; owned by this backend from now on
    pub async fn new(config: BrokerConfig, broker: Arc<dyn Broker>) -> Self {
        let connections = ConnectionManager::new(broker, &config.group, &config.topic_todo);
        let retry = RetryPolicy::from_config(&config);

        let mut backend = Self {
            config,
            connections,
            retry,
            seeds: SeedBuffer::new(),
            state: LifecycleState::NotStarted,
        };

        backend.connections.ensure_consumer_connected().await;
        backend.connections.ensure_publisher_connected().await;
        backend
    }

    /// Connects to the Kafka cluster named in `config` and creates a backend
    ///
    /// Each publish attempt is bounded by the configured wait time.
    ///
    /// # Returns
    ///
    /// * `Ok(BrokerBackend)` - The cluster was reachable
    /// * `Err(FrontierError::Config)` - `config` is invalid; nothing was contacted
    /// * `Err(FrontierError::Broker)` - No broker answered; nothing can work
    #[cfg(feature = "kafka")]
    pub async fn connect(config: BrokerConfig) -> crate::Result<Self> {
        crate::config::validate_broker_config(&config)?;

        let connected = KafkaBroker::connect(&config.server, CONNECT_TIMEOUT, config.wait()).await;
        let broker = match connected {
            Ok(broker) => broker,
            Err(e) => {
                tracing::error!("Could not connect to Kafka server {}: {}", config.server, e);
                return Err(e.into());
            }
        };

        Ok(Self::new(config, Arc::new(broker)).await)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn publisher_state(&self) -> ConnectionState {
        self.connections.publisher_state()
    }

    pub fn consumer_state(&self) -> ConnectionState {
        self.connections.consumer_state()
    }

    /// Number of seeds not yet handed out
    pub fn pending_seeds(&self) -> usize {
        self.seeds.len()
    }

    /// Publishes a crawl event to the done topic
    ///
    /// # Returns
    ///
    /// `true` if the broker accepted the event within the retry budget
    pub async fn send_event(&mut self, event: &CrawlEvent) -> bool {
        if self.state == LifecycleState::Stopped {
            tracing::warn!("Dropping result for {}: backend is stopped", event.url);
            return false;
        }

        let payload = match codec::encode(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Could not encode result for {}: {}", event.url, e);
                return false;
            }
        };

        if !self.connections.ensure_publisher_connected().await {
            tracing::warn!(
                "Could not publish result for {}: producer not connected",
                event.url
            );
            return false;
        }

        let Some(producer) = self.connections.publisher() else {
            return false;
        };

        let delivered = self
            .retry
            .send(producer, &self.config.topic_done, &payload)
            .await;

        if delivered {
            tracing::debug!(
                "Published {} with {} links to {}",
                event.url,
                event.links.len(),
                self.config.topic_done
            );
        } else {
            tracing::error!(
                "Giving up on result for {} after {} attempts",
                event.url,
                self.retry.max_attempts()
            );
        }

        delivered
    }

    /// Fetches the next batch of requests and reports where it came from
    ///
    /// Seeds always win: while any are buffered the broker is not touched.
    /// Otherwise the todo topic is polled; messages that cannot be decoded or
    /// carry no `url` are logged and skipped without affecting the rest.
    pub async fn next_batch(&mut self, max_n: usize) -> NextBatch {
        if !self.seeds.is_empty() {
            return NextBatch::new(self.seeds.drain_front(max_n), BatchSource::Seeds);
        }

        if self.state == LifecycleState::Stopped {
            return NextBatch::empty(BatchSource::Stopped);
        }

        if max_n == 0 {
            return NextBatch::empty(BatchSource::BrokerIdle);
        }

        if !self.connections.ensure_consumer_connected().await {
            tracing::warn!("Could not connect consumer to {}", self.config.topic_todo);
            return NextBatch::empty(BatchSource::ConsumerUnavailable);
        }

        let Some(consumer) = self.connections.consumer() else {
            return NextBatch::empty(BatchSource::ConsumerUnavailable);
        };

        match self.retry.poll(consumer, max_n).await {
            Some(messages) => {
                let requests = self.decode_requests(messages);
                tracing::debug!(
                    "Got {} requests from {}",
                    requests.len(),
                    self.config.topic_todo
                );
                NextBatch::new(requests, BatchSource::Broker)
            }
            None => NextBatch::empty(BatchSource::BrokerIdle),
        }
    }

    /// Turns todo-topic messages into requests, in arrival order
    fn decode_requests(&self, messages: Vec<BrokerMessage>) -> Vec<Request> {
        let mut requests = Vec::with_capacity(messages.len());

        for message in messages {
            let value = match codec::decode(&message.payload) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        "Could not decode {} message at offset {}: {} ({})",
                        self.config.topic_todo,
                        message.offset,
                        String::from_utf8_lossy(&message.payload),
                        e
                    );
                    continue;
                }
            };

            match codec::extract_url(&value) {
                Ok(url) => requests.push(Request::new(url)),
                Err(e) => tracing::warn!(
                    "Could not get url field in {} message at offset {}: {}",
                    self.config.topic_todo,
                    message.offset,
                    e
                ),
            }
        }

        requests
    }
}

#[async_trait]
impl Backend for BrokerBackend {
    async fn start(&mut self) {
        if self.state == LifecycleState::Stopped {
            tracing::warn!("Ignoring start: backend is already stopped");
            return;
        }

        if self.connections.ensure_consumer_connected().await {
            tracing::info!(
                "Successfully connected consumer to {}",
                self.config.topic_todo
            );
        } else {
            tracing::warn!(
                "Could not connect consumer to {}. Will try later.",
                self.config.topic_todo
            );
        }

        self.state = LifecycleState::Started;
    }

    async fn stop(&mut self) {
        if self.state == LifecycleState::Stopped {
            tracing::debug!("Backend already stopped");
            return;
        }

        self.connections
            .disconnect_publisher(STOP_FLUSH_TIMEOUT)
            .await;
        self.state = LifecycleState::Stopped;
        tracing::info!("Backend stopped");
    }

    fn add_seeds(&mut self, seeds: Vec<Request>) {
        tracing::debug!("Adding {} seeds", seeds.len());
        self.seeds.extend(seeds);
    }

    async fn page_crawled(&mut self, response: &Response, links: &[Request]) -> bool {
        let event = CrawlEvent::new(
            response.url.clone(),
            links.iter().map(|link| link.url.clone()).collect(),
        );
        self.send_event(&event).await
    }

    fn request_error(&mut self, request: &Request, error: &str) {
        // Not forwarded to the broker
        tracing::debug!("Fetch of {} failed: {}", request.url, error);
    }

    async fn get_next_requests(&mut self, max_n: usize) -> Vec<Request> {
        self.next_batch(max_n).await.requests
    }
}
