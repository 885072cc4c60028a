//! Error types for HTTP exchanges.
//!
//! # Design
//! Every distinct failure point in an exchange gets its own variant, so a
//! caller (or the C surface) can tell exactly which step failed. `code()`
//! maps each variant to a stable integer for the C surface; the mapping is
//! part of the ABI and must not be reordered.

use std::fmt;

/// An opaque failure reported by the host for a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HostError {}

/// Errors produced by one inbound or outbound exchange.
///
/// Failures are local to the exchange that produced them and are returned
/// synchronously; there is no cross-call error state and no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The response future reported no value after its pollable fired.
    FutureGet,

    /// The host resolved the exchange to a transport or protocol error.
    Response(HostError),

    /// Consuming the incoming response body failed.
    BodyConsume(HostError),

    /// A request setter or the outgoing-body accessor failed.
    RequestBuild(HostError),

    /// The outgoing handler refused the request.
    Send(HostError),

    /// The body input stream failed with something other than end-of-body.
    BodyRead(HostError),

    /// Acquiring the outgoing body's output stream failed.
    OutputStream(HostError),

    /// Header list construction failed.
    HeaderCreate(HostError),

    /// Acquiring the incoming body's input stream failed.
    InputStream(HostError),

    /// Finishing the outgoing body failed.
    BodyFinish(HostError),

    /// Writing or flushing body bytes to an output stream failed.
    BodyWrite(HostError),

    /// Constructing the outgoing response (status, body handle) failed.
    ResponseBuild(HostError),
}

impl ExchangeError {
    /// Stable integer code for the C surface. 0 is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            ExchangeError::FutureGet => 1,
            ExchangeError::Response(_) => 2,
            ExchangeError::BodyConsume(_) => 3,
            ExchangeError::RequestBuild(_) => 4,
            ExchangeError::Send(_) => 5,
            ExchangeError::BodyRead(_) => 6,
            ExchangeError::OutputStream(_) => 7,
            ExchangeError::HeaderCreate(_) => 8,
            ExchangeError::InputStream(_) => 9,
            ExchangeError::BodyFinish(_) => 10,
            ExchangeError::BodyWrite(_) => 11,
            ExchangeError::ResponseBuild(_) => 12,
        }
    }

    fn host_error(&self) -> Option<&HostError> {
        match self {
            ExchangeError::FutureGet => None,
            ExchangeError::Response(e)
            | ExchangeError::BodyConsume(e)
            | ExchangeError::RequestBuild(e)
            | ExchangeError::Send(e)
            | ExchangeError::BodyRead(e)
            | ExchangeError::OutputStream(e)
            | ExchangeError::HeaderCreate(e)
            | ExchangeError::InputStream(e)
            | ExchangeError::BodyFinish(e)
            | ExchangeError::BodyWrite(e)
            | ExchangeError::ResponseBuild(e) => Some(e),
        }
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            ExchangeError::FutureGet => "failed to get value for incoming response",
            ExchangeError::Response(_) => "response is an error",
            ExchangeError::BodyConsume(_) => "failed to consume response body",
            ExchangeError::RequestBuild(_) => "failed to build request",
            ExchangeError::Send(_) => "failed to send request",
            ExchangeError::BodyRead(_) => "body read failed",
            ExchangeError::OutputStream(_) => "failed to get output stream",
            ExchangeError::HeaderCreate(_) => "failed to create headers",
            ExchangeError::InputStream(_) => "failed to get input stream",
            ExchangeError::BodyFinish(_) => "failed to finish body",
            ExchangeError::BodyWrite(_) => "failed to write body",
            ExchangeError::ResponseBuild(_) => "failed to build response",
        };
        match self.host_error() {
            Some(cause) => write!(f, "{what}: {cause}"),
            None => f.write_str(what),
        }
    }
}

impl std::error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.host_error().map(|e| e as &(dyn std::error::Error + 'static))
    }
}
