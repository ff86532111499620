//! Request and response values exchanged over a stream.
//!
//! A stream carries exactly one [`Request`] followed by one [`Response`].
//! Both are plain data; framing lives in [`crate::codec`].

use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Header mapping. Keys are case-sensitive; a repeated key overwrites the
/// earlier value.
pub type Headers = HashMap<String, String>;

/// Protocol tag written when the caller does not set one.
pub const DEFAULT_PROTOCOL: &str = "QUIC/1";

/// An RPC request.
///
/// `C` is the connection handle type of the transport that delivered the
/// request. It is only populated on the inbound path so a handler can
/// reach back to the caller over the same connection.
#[derive(Debug, Clone)]
pub struct Request<C = ()> {
    pub route: String,
    pub protocol: String,
    pub headers: Headers,
    pub body: Bytes,
    /// Remote endpoint of the connection the request arrived on.
    pub source: Option<SocketAddr>,
    /// Endpoint the request was addressed to.
    pub destination: Option<SocketAddr>,
    /// Originating connection, set by the stream handler.
    pub connection: Option<C>,
}

impl<C> Request<C> {
    /// Build a request for `route` with the default protocol tag and no body.
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
            source: None,
            destination: None,
            connection: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_destination(mut self, destination: SocketAddr) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Drop the connection handle, keeping every other field.
    pub fn detach<D>(self) -> Request<D> {
        Request {
            route: self.route,
            protocol: self.protocol,
            headers: self.headers,
            body: self.body,
            source: self.source,
            destination: self.destination,
            connection: None,
        }
    }
}

/// An RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub message: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// `200 OK` carrying `body`.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, "OK").with_body(body)
    }

    /// `400 Bad Request` carrying the parse failure text.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(400, "Bad Request").with_body(reason.into())
    }

    /// `404 Not Found` for a route without a handler.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found").with_body("route not found")
    }

    /// Synthesized response returned to callers when an outbound exchange fails.
    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error").with_body("Internal Server Error")
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
