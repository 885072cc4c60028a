//! The host ABI surface, restated as traits.
//!
//! # Design
//! The runtime that actually parses HTTP and owns the transport is an
//! external collaborator. These traits describe exactly the operations the
//! exchange logic needs from it, with every resource handle modeled as an
//! owned associated type. Ownership gives the release discipline for free:
//! a handle dropped on an early error return is released, and operations
//! that consume a resource on the host side (`finish_body`, `send`,
//! `set_outparam`) take the handle by value.
//!
//! Implementations are single-threaded and synchronous. The only blocking
//! points an implementation may have are [`OutboundHost::block`] calls,
//! which are cooperative waits on the host's readiness primitive.

use crate::error::HostError;
use crate::types::{Method, Scheme};

/// Result of one input-stream read attempt.
///
/// `Closed` is the normal end-of-body signal, not an error. A `Data` chunk
/// never exceeds the `max` passed to [`OutboundHost::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    Closed,
    Err(HostError),
}

/// Host operations behind the outbound client.
pub trait OutboundHost {
    type Headers;
    type OutgoingRequest;
    type OutgoingBody;
    type OutputStream;
    type FutureResponse;
    type Pollable;
    type IncomingResponse;
    type IncomingBody;
    type InputStream;

    /// Construct a header list from ordered (name, value) pairs.
    fn headers_from_list(
        &self,
        entries: &[(String, String)],
    ) -> Result<Self::Headers, HostError>;

    /// Construct an outgoing request owning the given headers.
    fn new_request(&self, headers: Self::Headers) -> Self::OutgoingRequest;

    fn set_method(
        &self,
        request: &mut Self::OutgoingRequest,
        method: Method,
    ) -> Result<(), HostError>;

    fn set_scheme(
        &self,
        request: &mut Self::OutgoingRequest,
        scheme: Scheme,
    ) -> Result<(), HostError>;

    fn set_authority(
        &self,
        request: &mut Self::OutgoingRequest,
        authority: &str,
    ) -> Result<(), HostError>;

    fn set_path_with_query(
        &self,
        request: &mut Self::OutgoingRequest,
        path_query: &str,
    ) -> Result<(), HostError>;

    /// Obtain the writable body resource of an outgoing request.
    fn request_body(
        &self,
        request: &mut Self::OutgoingRequest,
    ) -> Result<Self::OutgoingBody, HostError>;

    /// Obtain the output stream of an outgoing body.
    fn body_write_stream(
        &self,
        body: &mut Self::OutgoingBody,
    ) -> Result<Self::OutputStream, HostError>;

    /// Write the full chunk and flush before returning.
    fn write_and_flush(
        &self,
        stream: &mut Self::OutputStream,
        bytes: &[u8],
    ) -> Result<(), HostError>;

    /// Signal that no more body bytes (and no trailers) will be written.
    /// Consumes the body resource.
    fn finish_body(&self, body: Self::OutgoingBody) -> Result<(), HostError>;

    /// Hand the request to the host's outgoing handler. Consumes the request.
    fn send(&self, request: Self::OutgoingRequest) -> Result<Self::FutureResponse, HostError>;

    fn subscribe_future(&self, future: &Self::FutureResponse) -> Self::Pollable;

    /// Block until the pollable is ready. The one suspension point.
    fn block(&self, pollable: &Self::Pollable);

    /// Fetch the completed value. `None` means the future holds no value
    /// (still pending, or already taken); `Some(Err(_))` means the host
    /// resolved the exchange to an error.
    fn future_result(
        &self,
        future: &Self::FutureResponse,
    ) -> Option<Result<Self::IncomingResponse, HostError>>;

    fn response_status(&self, response: &Self::IncomingResponse) -> u16;

    /// All header entries, in the order the host reports them.
    fn response_headers(&self, response: &Self::IncomingResponse) -> Vec<(String, String)>;

    /// Obtain the incoming body resource. May be called at most once.
    fn consume_body(
        &self,
        response: &mut Self::IncomingResponse,
    ) -> Result<Self::IncomingBody, HostError>;

    /// Obtain the input stream of an incoming body.
    fn body_read_stream(
        &self,
        body: &mut Self::IncomingBody,
    ) -> Result<Self::InputStream, HostError>;

    fn subscribe_input(&self, stream: &Self::InputStream) -> Self::Pollable;

    /// Attempt to read up to `max` bytes.
    fn read(&self, stream: &mut Self::InputStream, max: usize) -> ReadOutcome;
}

/// Host operations behind the inbound handler adapter.
pub trait InboundHost {
    type IncomingRequest;
    type ResponseOutparam;
    type Headers;
    type OutgoingResponse;
    type OutgoingBody;
    type OutputStream;

    fn path_with_query(&self, request: &Self::IncomingRequest) -> String;

    fn authority(&self, request: &Self::IncomingRequest) -> String;

    /// Construct a header list from ordered (name, value) pairs.
    fn headers_from_list(
        &self,
        entries: &[(String, String)],
    ) -> Result<Self::Headers, HostError>;

    /// Construct an outgoing response owning the given headers.
    fn new_response(&self, headers: Self::Headers) -> Self::OutgoingResponse;

    fn set_status(
        &self,
        response: &mut Self::OutgoingResponse,
        status: u16,
    ) -> Result<(), HostError>;

    /// Obtain the writable body resource of an outgoing response.
    fn response_body(
        &self,
        response: &mut Self::OutgoingResponse,
    ) -> Result<Self::OutgoingBody, HostError>;

    /// Obtain the output stream of an outgoing body.
    fn body_write_stream(
        &self,
        body: &mut Self::OutgoingBody,
    ) -> Result<Self::OutputStream, HostError>;

    /// Write the full chunk and flush before returning.
    fn write_and_flush(
        &self,
        stream: &mut Self::OutputStream,
        bytes: &[u8],
    ) -> Result<(), HostError>;

    /// Signal that no more body bytes (and no trailers) will be written.
    /// Consumes the body resource.
    fn finish_body(&self, body: Self::OutgoingBody) -> Result<(), HostError>;

    /// Hand the response (or a terminal error) to the caller. Must be
    /// invoked exactly once per exchange; consumes the outparam.
    fn set_outparam(
        &self,
        outparam: Self::ResponseOutparam,
        response: Result<Self::OutgoingResponse, HostError>,
    );
}
