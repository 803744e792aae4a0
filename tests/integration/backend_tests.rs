//! Integration tests for the broker backend
//!
//! These tests drive `BrokerBackend` through the public `Backend` contract
//! against the in-memory broker, covering seed buffering, the retry bounds
//! and the exchange between a frontier and its fetchers.

use frontier_bridge::backend::{Backend, BatchSource, BrokerBackend, LifecycleState};
use frontier_bridge::broker::{MemoryBroker, ALWAYS};
use frontier_bridge::codec::{self, CrawlEvent};
use frontier_bridge::config::{parse_config, BrokerConfig};
use frontier_bridge::models::{Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Creates a test configuration with the given retry settings
fn create_test_config(comm_tries: u32, wait_time: f64) -> BrokerConfig {
    BrokerConfig {
        group: "test-fetchers".to_string(),
        topic_todo: "test-todo".to_string(),
        topic_done: "test-done".to_string(),
        wait_time,
        comm_tries,
        ..BrokerConfig::default()
    }
}

fn requests(urls: &[&str]) -> Vec<Request> {
    urls.iter().map(|url| Request::new(*url)).collect()
}

fn urls(requests: &[Request]) -> Vec<String> {
    requests.iter().map(|r| r.url.clone()).collect()
}

async fn create_backend(broker: &MemoryBroker, config: BrokerConfig) -> BrokerBackend {
    BrokerBackend::new(config, Arc::new(broker.clone())).await
}

#[tokio::test]
async fn test_seeds_drain_in_order_with_broker_unreachable() {
    let cases: Vec<(Vec<Vec<&str>>, usize)> = vec![
        (vec![vec!["http://a", "http://b", "http://c"]], 2),
        (vec![vec!["http://a"], vec!["http://b", "http://c"], vec![]], 1),
        (vec![vec!["http://a", "http://b"], vec!["http://c", "http://d"]], 3),
        (vec![vec!["http://x/ü?q=\"1\"", "http://x/ü?q=\"1\""]], 5),
    ];

    for (seed_calls, n) in cases {
        let broker = MemoryBroker::new();
        broker.set_unreachable(true);
        let mut backend = create_backend(&broker, create_test_config(1, 0.0)).await;
        backend.start().await;

        let mut added = Vec::new();
        for seeds in &seed_calls {
            added.extend(urls(&requests(seeds)));
            backend.add_seeds(requests(seeds));
        }

        let mut returned = Vec::new();
        loop {
            let batch = backend.get_next_requests(n).await;
            assert!(batch.len() <= n);
            if batch.is_empty() {
                break;
            }
            returned.extend(urls(&batch));
        }

        assert_eq!(returned, added);
        assert_eq!(backend.pending_seeds(), 0);
    }
}

#[tokio::test]
async fn test_second_call_serves_remaining_seed_without_broker() {
    let broker = MemoryBroker::new();
    broker.publish("test-todo", r#"{"url": "http://d"}"#);
    let mut backend = create_backend(&broker, create_test_config(3, 0.0)).await;
    backend.start().await;

    backend.add_seeds(requests(&["http://a", "http://b", "http://c"]));

    assert_eq!(
        backend.get_next_requests(2).await,
        requests(&["http://a", "http://b"])
    );
    assert_eq!(backend.get_next_requests(2).await, requests(&["http://c"]));
    assert_eq!(broker.stats().polls, 0);

    assert_eq!(backend.get_next_requests(2).await, requests(&["http://d"]));
    assert_eq!(broker.stats().polls, 1);
}

#[tokio::test]
async fn test_idle_topic_returns_empty_after_three_polls() {
    let broker = MemoryBroker::new();
    let mut backend = create_backend(&broker, create_test_config(3, 0.0)).await;
    backend.start().await;

    assert!(backend.get_next_requests(10).await.is_empty());
    assert_eq!(broker.stats().polls, 3);
}

#[tokio::test(start_paused = true)]
async fn test_idle_topic_wait_is_bounded_by_attempts_times_timeout() {
    let broker = MemoryBroker::new();
    let mut backend = create_backend(&broker, create_test_config(4, 1.5)).await;
    backend.start().await;

    let started = Instant::now();
    let batch = backend.next_batch(10).await;

    assert_eq!(batch.source, BatchSource::BrokerIdle);
    assert!(batch.requests.is_empty());
    assert_eq!(broker.stats().polls, 4);
    assert_eq!(started.elapsed(), Duration::from_secs(6));
}

#[tokio::test]
async fn test_malformed_message_is_dropped_from_batch() {
    let broker = MemoryBroker::new();
    broker.publish("test-todo", r#"{"url": "http://good", "priority": 1}"#);
    broker.publish("test-todo", r#"{"links": ["http://orphan"]}"#);
    let mut backend = create_backend(&broker, create_test_config(3, 0.0)).await;

    let batch = backend.get_next_requests(10).await;
    assert_eq!(batch, requests(&["http://good"]));
}

#[tokio::test(start_paused = true)]
async fn test_page_crawled_gives_up_after_max_attempts() {
    let broker = MemoryBroker::new();
    broker.fail_sends(ALWAYS);
    let mut backend = create_backend(&broker, create_test_config(5, 2.0)).await;

    let started = Instant::now();
    let response = Response::new(Request::new("http://a/"), 200);
    assert!(!backend.page_crawled(&response, &requests(&["http://b/"])).await);

    assert_eq!(broker.stats().send_attempts, 5);
    assert_eq!(started.elapsed(), Duration::from_secs(8));
}

#[tokio::test]
async fn test_page_crawled_survives_transient_send_failures() {
    let broker = MemoryBroker::new();
    broker.fail_sends(2);
    let mut backend = create_backend(&broker, create_test_config(3, 0.0)).await;

    let response = Response::new(Request::new("http://a/"), 200);
    assert!(backend.page_crawled(&response, &[]).await);

    assert_eq!(broker.stats().send_attempts, 3);
    assert_eq!(broker.messages("test-done").len(), 1);
}

#[tokio::test]
async fn test_broker_recovery_between_calls() {
    let broker = MemoryBroker::new();
    broker.set_unreachable(true);
    let mut backend = create_backend(&broker, create_test_config(2, 0.0)).await;
    backend.start().await;

    let first = backend.next_batch(5).await;
    assert_eq!(first.source, BatchSource::ConsumerUnavailable);

    broker.set_unreachable(false);
    broker.publish("test-todo", r#"{"url": "http://late"}"#);

    let second = backend.next_batch(5).await;
    assert_eq!(second.source, BatchSource::Broker);
    assert_eq!(second.requests, requests(&["http://late"]));
}

#[tokio::test]
async fn test_fetchers_in_one_group_share_the_todo_topic() {
    let broker = MemoryBroker::new();
    for i in 0..4 {
        broker.publish("test-todo", format!(r#"{{"url": "http://site/{}"}}"#, i));
    }

    let mut first = create_backend(&broker, create_test_config(1, 0.0)).await;
    let mut second = create_backend(&broker, create_test_config(1, 0.0)).await;

    let a = first.get_next_requests(3).await;
    let b = second.get_next_requests(3).await;

    assert_eq!(urls(&a), vec!["http://site/0", "http://site/1", "http://site/2"]);
    assert_eq!(urls(&b), vec!["http://site/3"]);
}

#[tokio::test]
async fn test_done_events_feed_a_downstream_consumer() {
    let broker = MemoryBroker::new();
    let mut fetcher = create_backend(&broker, create_test_config(3, 0.0)).await;

    let response = Response::new(Request::new("http://a/"), 200).with_url("http://a/home");
    let links = requests(&["http://a/about", "http://b/"]);
    assert!(fetcher.page_crawled(&response, &links).await);
    fetcher.stop().await;

    let published = broker.messages("test-done");
    assert_eq!(
        codec::decode_event(&published[0]).unwrap(),
        CrawlEvent::new(
            "http://a/home",
            vec!["http://a/about".to_string(), "http://b/".to_string()]
        )
    );

    // A frontier reading the done topic sees only the crawled URL
    let downstream_config = BrokerConfig {
        group: "frontier".to_string(),
        topic_todo: "test-done".to_string(),
        topic_done: "test-todo".to_string(),
        ..create_test_config(1, 0.0)
    };
    let mut frontier = create_backend(&broker, downstream_config).await;
    assert_eq!(
        frontier.get_next_requests(10).await,
        requests(&["http://a/home"])
    );
}

#[tokio::test]
async fn test_lifecycle_through_trait_object() {
    let broker = MemoryBroker::new();
    let backend = create_backend(&broker, create_test_config(1, 0.0)).await;
    let mut backend: Box<dyn Backend> = Box::new(backend);

    backend.start().await;
    backend.add_seeds(requests(&["http://a"]));
    backend.request_error(&Request::new("http://a"), "timeout");
    assert_eq!(backend.get_next_requests(1).await, requests(&["http://a"]));
    backend.stop().await;
    backend.stop().await;

    assert!(broker.messages("test-done").is_empty());
    assert_eq!(broker.stats().flushes, 1);
}

#[tokio::test]
async fn test_stop_after_failed_start_is_terminal() {
    let broker = MemoryBroker::new();
    broker.set_unreachable(true);
    let mut backend = create_backend(&broker, create_test_config(1, 0.0)).await;

    backend.start().await;
    assert_eq!(backend.state(), LifecycleState::Started);

    backend.stop().await;
    backend.stop().await;
    assert_eq!(backend.state(), LifecycleState::Stopped);
    assert_eq!(broker.stats().flushes, 0);
}

#[tokio::test]
async fn test_backend_from_toml_config() {
    let config = parse_config(
        r#"
[broker]
group = "toml-group"
topic-todo = "toml-todo"
topic-done = "toml-done"
wait-time = 0.0
comm-tries = 2
"#,
    )
    .unwrap();

    let broker = MemoryBroker::new();
    broker.publish("toml-todo", r#"{"url": "http://from-toml"}"#);
    let mut backend = create_backend(&broker, config.broker).await;

    assert_eq!(
        backend.get_next_requests(10).await,
        requests(&["http://from-toml"])
    );
    assert!(backend.get_next_requests(10).await.is_empty());
    assert_eq!(broker.stats().polls, 3);
}
