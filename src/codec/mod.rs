//! Wire codec for crawl events
//!
//! Done-topic payloads are JSON objects `{"url": ..., "links": [...]}`.
//! Todo-topic payloads share the shape but only `url` is read.
//!
//! Decoding and field extraction are separate steps so that callers can tell a
//! payload that is not JSON at all (`CodecError::Decode`) from a well-formed
//! payload that lacks a usable `url` (`CodecError::MissingField`).

use crate::models::Request;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while encoding or decoding payloads
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode payload: {0}")]
    Encode(serde_json::Error),

    #[error("Failed to decode payload: {0}")]
    Decode(serde_json::Error),

    #[error("Payload has no usable field '{0}'")]
    MissingField(&'static str),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// A fetched page together with the links discovered on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlEvent {
    pub url: String,
    pub links: Vec<String>,
}

impl CrawlEvent {
    pub fn new(url: impl Into<String>, links: Vec<String>) -> Self {
        Self {
            url: url.into(),
            links,
        }
    }
}

/// Todo-topic message body
#[derive(Serialize)]
struct RequestMessage<'a> {
    url: &'a str,
}

/// Serializes a crawl event to its wire payload
pub fn encode(event: &CrawlEvent) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(event).map_err(CodecError::Encode)
}

/// Serializes a fetch request as a todo-topic payload
pub fn encode_request(request: &Request) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(&RequestMessage { url: &request.url }).map_err(CodecError::Encode)
}

/// Parses a payload into a structured value without interpreting any field
pub fn decode(payload: &[u8]) -> CodecResult<Value> {
    serde_json::from_slice(payload).map_err(CodecError::Decode)
}

/// Extracts the `url` field from a decoded payload
pub fn extract_url(value: &Value) -> CodecResult<String> {
    value
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(CodecError::MissingField("url"))
}

/// Parses a done-topic payload back into a crawl event
///
/// A payload without a string `url` or an array `links` is `MissingField`;
/// `Decode` is left for bytes that are not JSON or links that are not strings.
pub fn decode_event(payload: &[u8]) -> CodecResult<CrawlEvent> {
    let value = decode(payload)?;
    extract_url(&value)?;
    if !value.get("links").is_some_and(Value::is_array) {
        return Err(CodecError::MissingField("links"));
    }
    serde_json::from_value(value).map_err(CodecError::Decode)
}
