//! Frontier backend contract and its broker-backed implementation
//!
//! The frontier manager drives a backend through six operations: start, stop,
//! seed injection, crawl-result reporting, error reporting and batch fetching.
//! `BrokerBackend` implements them on top of a message broker.

mod broker_backend;
mod seeds;

pub use broker_backend::BrokerBackend;
pub use seeds::SeedBuffer;

use crate::models::{Request, Response};
use async_trait::async_trait;
use std::fmt;

/// Operations the frontier manager expects from a backend
///
/// Calls are made sequentially by a single owner; each one completes before
/// the next starts.
#[async_trait]
pub trait Backend: Send {
    /// Called once when the frontier starts
    async fn start(&mut self);

    /// Called once when the frontier stops
    async fn stop(&mut self);

    /// Queues seed requests ahead of anything from the broker
    fn add_seeds(&mut self, seeds: Vec<Request>);

    /// Reports a fetched page and the links found on it
    ///
    /// Returns whether the result was delivered.
    async fn page_crawled(&mut self, response: &Response, links: &[Request]) -> bool;

    /// Reports a failed fetch
    fn request_error(&mut self, request: &Request, error: &str);

    /// Returns up to `max_n` requests to fetch next
    async fn get_next_requests(&mut self, max_n: usize) -> Vec<Request>;
}

/// Lifecycle of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    NotStarted,
    Started,
    /// Terminal
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Where the requests of a batch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSource {
    /// Drained from the seed buffer; the broker was not touched
    Seeds,
    /// Read from the todo topic (possibly empty if every message was malformed)
    Broker,
    /// The todo topic yielded nothing within the retry budget
    BrokerIdle,
    /// The consumer could not be connected
    ConsumerUnavailable,
    /// The backend has been stopped
    Stopped,
}

/// A batch of requests tagged with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextBatch {
    pub requests: Vec<Request>,
    pub source: BatchSource,
}

impl NextBatch {
    pub fn new(requests: Vec<Request>, source: BatchSource) -> Self {
        Self { requests, source }
    }

    pub fn empty(source: BatchSource) -> Self {
        Self::new(Vec::new(), source)
    }
}
