//! Transport seam: requests, responses, and the async [`Transport`] trait.
//!
//! The crate never performs network I/O itself; callers supply a
//! [`Transport`] implementation. Execution is single-threaded cooperative,
//! so the trait is `?Send`. [`MockTransport`] is the in-process double used
//! throughout the test suites: queued replies, recorded requests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::headers::HeaderMap;

/// An HTTP verb the protocol negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Fetch a representation.
    Get,
    /// Append content under an element.
    Post,
    /// Replace an element's representation.
    Put,
    /// Remove an element.
    Delete,
    /// Capability discovery.
    Options,
}

impl Verb {
    /// All verbs, in the order capability bits are assigned.
    pub const ALL: [Verb; 5] = [Verb::Get, Verb::Post, Verb::Put, Verb::Delete, Verb::Options];

    /// The wire name of the verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Options => "OPTIONS",
        }
    }

    /// Parses a verb name, case-insensitively, ignoring surrounding
    /// whitespace. Unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "DELETE" => Some(Verb::Delete),
            "OPTIONS" => Some(Verb::Options),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a comma-separated `Allow` header value into verbs.
///
/// Unknown tokens are skipped; the server's vocabulary may be wider than
/// the client's.
#[must_use]
pub fn parse_allow(value: &str) -> Vec<Verb> {
    value.split(',').filter_map(Verb::parse).collect()
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    /// The verb.
    pub method: Verb,
    /// Target URL (the configured location or a node's base URL).
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional body (serialized markup).
    pub body: Option<String>,
}

impl Request {
    /// Creates a body-less request.
    #[must_use]
    pub fn new(method: Verb, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// A response from the transport.
///
/// The body is a one-shot stream: [`Response::take_body`] exhausts it.
/// Reconstructed responses ([`Response::reconstruct`]) preserve the
/// original status and headers with a replayed body, so observers cannot
/// tell them apart except by the exhausted original.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: HeaderMap,
    body: Option<String>,
}

impl Response {
    /// Creates a response with the given status and no body.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets the status text.
    #[must_use]
    pub fn with_status_text(mut self, text: &str) -> Self {
        self.status_text = text.to_string();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// The status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The status text.
    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// `true` for 2xx statuses.
    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `true` when the `Content-Type` marks an HTML body.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.headers
            .get("content-type")
            .is_some_and(|ct| ct.contains("text/html"))
    }

    /// Consumes the body stream.
    pub fn take_body(&mut self) -> Option<String> {
        self.body.take()
    }

    /// A non-consuming view of the body, `None` once exhausted.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Rebuilds a response around a replayed body, keeping this response's
    /// status, status text, and headers.
    #[must_use]
    pub fn reconstruct(&self, body: &str) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: Some(body.to_string()),
        }
    }
}

/// Network-level request failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("request failed: {detail}")]
pub struct TransportError {
    /// Human-readable failure description.
    pub detail: String,
}

impl TransportError {
    /// Creates a transport error.
    #[must_use]
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// The request-issuing seam.
///
/// Implementations run on the host event loop; the trait is `?Send` by
/// design (see the concurrency model: one logical thread of control, no
/// spawning inside the crate).
#[async_trait(?Send)]
pub trait Transport {
    /// Issues a request, running it to completion or failure. No
    /// cancellation or timeout layer exists here; those belong to the
    /// implementation.
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

enum MockReply {
    Respond(Response),
    Fail(TransportError),
}

/// Queue-backed test transport.
///
/// Replies are served in FIFO order; every request is recorded and can be
/// inspected with [`MockTransport::take_requests`]. An empty queue fails
/// the request, which surfaces missing expectations as transport errors in
/// tests.
#[derive(Default)]
pub struct MockTransport {
    replies: RefCell<VecDeque<MockReply>>,
    requests: RefCell<Vec<Request>>,
}

impl MockTransport {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn enqueue(&self, response: Response) {
        self.replies
            .borrow_mut()
            .push_back(MockReply::Respond(response));
    }

    /// Queues a transport failure.
    pub fn enqueue_error(&self, error: TransportError) {
        self.replies.borrow_mut().push_back(MockReply::Fail(error));
    }

    /// All requests issued so far, clearing the record.
    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut self.requests.borrow_mut())
    }

    /// Number of requests issued so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.requests.borrow_mut().push(request);
        match self.replies.borrow_mut().pop_front() {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(error)) => Err(error),
            None => Err(TransportError::new("no queued response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_parsing_is_case_insensitive_and_trimmed() {
        assert_eq!(Verb::parse(" get "), Some(Verb::Get));
        assert_eq!(Verb::parse("DELETE"), Some(Verb::Delete));
        assert_eq!(Verb::parse("PATCH"), None);
    }

    #[test]
    fn allow_header_parses_to_verb_list() {
        assert_eq!(
            parse_allow("GET, PUT,DELETE"),
            vec![Verb::Get, Verb::Put, Verb::Delete]
        );
        assert_eq!(parse_allow("BREW, GET"), vec![Verb::Get]);
    }

    #[test]
    fn body_stream_is_one_shot() {
        let mut response = Response::new(200).with_body("<li>x</li>");
        assert_eq!(response.take_body().as_deref(), Some("<li>x</li>"));
        assert_eq!(response.take_body(), None);
    }

    #[test]
    fn reconstruction_preserves_status_and_headers() {
        let mut original = Response::new(201)
            .with_status_text("Created")
            .with_header("Content-Type", "text/html")
            .with_body("<li>x</li>");
        let body = original.take_body().unwrap();

        let rebuilt = original.reconstruct(&body);
        assert_eq!(rebuilt.status(), 201);
        assert_eq!(rebuilt.status_text(), "Created");
        assert_eq!(rebuilt.headers().get("content-type"), Some("text/html"));
        assert_eq!(rebuilt.body(), Some("<li>x</li>"));
        // The original stream stays exhausted.
        assert_eq!(original.body(), None);
    }

    #[tokio::test]
    async fn mock_serves_replies_in_order_and_records_requests() {
        let transport = MockTransport::new();
        transport.enqueue(Response::new(204));
        transport.enqueue_error(TransportError::new("connection reset"));

        let first = transport
            .send(Request::new(Verb::Get, "/a"))
            .await
            .unwrap();
        assert_eq!(first.status(), 204);

        let second = transport.send(Request::new(Verb::Put, "/b")).await;
        assert!(second.is_err());

        let third = transport.send(Request::new(Verb::Get, "/c")).await;
        assert!(third.is_err(), "empty queue must fail the request");

        let log = transport.take_requests();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].url, "/a");
        assert_eq!(log[1].method, Verb::Put);
    }
}
