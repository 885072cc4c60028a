//! Plain-data model for one HTTP exchange.
//!
//! # Design
//! Requests and responses are described as owned plain data (`String`,
//! `Vec`), so values can cross the FFI boundary without lifetime concerns
//! and tests can construct them without a host. The host-resource side of
//! the picture lives in `host.rs`; nothing here touches a handle.

use serde::{Deserialize, Serialize};

/// Default capacity for bounded body buffers: 64 KiB.
pub const DEFAULT_BODY_CAPACITY: usize = 64 * 1024;

/// HTTP method tag. Discriminants are stable and shared with the C surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

/// URL scheme tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// The simplified view of an incoming request handed to a [`Handler`].
///
/// Carries the two fields the adapter extracts from the underlying transport
/// resource. Immutable once constructed; owned by the adapter for the
/// duration of one handler invocation.
///
/// [`Handler`]: crate::inbound::Handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub path_query: String,
    pub authority: String,
}

/// The simplified response a [`Handler`] populates.
///
/// The body is bounded by a capacity fixed at construction; writes past it
/// are dropped and recorded via [`Reply::truncated`]. Status defaults to 200.
///
/// [`Handler`]: crate::inbound::Handler
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: Vec<u8>,
    capacity: usize,
    truncated: bool,
}

impl Reply {
    pub fn with_capacity(capacity: usize) -> Self {
        Reply {
            status: 200,
            body: Vec::new(),
            capacity,
            truncated: false,
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Replace the body, truncating at the configured capacity.
    pub fn set_body(&mut self, body: impl AsRef<[u8]>) {
        self.body.clear();
        self.truncated = false;
        self.write_body(body);
    }

    /// Append to the body, truncating at the configured capacity.
    pub fn write_body(&mut self, chunk: impl AsRef<[u8]>) {
        let chunk = chunk.as_ref();
        let remaining = self.capacity.saturating_sub(self.body.len());
        if chunk.len() > remaining {
            self.truncated = true;
        }
        self.body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True if any write was cut short by the capacity bound.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl Default for Reply {
    fn default() -> Self {
        Reply::with_capacity(DEFAULT_BODY_CAPACITY)
    }
}

/// An outbound request described as plain data.
///
/// Transient input to a single [`Client::send`] call; nothing is retained
/// between calls. `headers` are appended after the client's fixed
/// informational pair.
///
/// [`Client::send`]: crate::outbound::Client::send
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub scheme: Scheme,
    pub authority: String,
    pub path_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl OutboundRequest {
    pub fn new(method: Method, scheme: Scheme, authority: &str, path_query: &str) -> Self {
        OutboundRequest {
            method,
            scheme,
            authority: authority.to_string(),
            path_query: path_query.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// The outcome of a completed outbound exchange.
///
/// `headers` preserve the order the host reported; both names and values are
/// owned. `truncated` is set when the drain loop hit the configured capacity
/// before observing end-of-body — a body of exactly capacity bytes also
/// reports `truncated`, since the loop stops without reading further.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub truncated: bool,
}

impl Response {
    /// The body as UTF-8 text, lossy on invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
