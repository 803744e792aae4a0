//! Domain types exchanged with the frontier manager
//!
//! The frontier manager owns the real request/response model; the backend only
//! needs the URL of each request and of each fetched page.

use std::fmt;

/// A request to fetch a URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    /// The URL to fetch, kept verbatim
    pub url: String,
}

impl Request {
    /// Creates a request for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl From<&str> for Request {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for Request {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// A fetched page, as reported to `page_crawled`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL of the fetched page
    pub url: String,

    /// HTTP status code of the fetch
    pub status_code: u16,

    /// The request that produced this response
    pub request: Request,
}

impl Response {
    /// Creates a response whose URL is the request's URL
    pub fn new(request: Request, status_code: u16) -> Self {
        Self {
            url: request.url.clone(),
            status_code,
            request,
        }
    }

    /// Overrides the final URL (e.g. after redirects)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}
