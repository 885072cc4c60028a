//! Inbound handler adapter: bridge an incoming request to a user handler.
//!
//! # Design
//! The handler is an explicit object given to the adapter at construction;
//! there is no process-global registration slot. The adapter extracts the
//! simplified request fields, runs the handler into a bounded [`Reply`],
//! and serializes the result back through the host's response resources.
//! Every host call is checked: a failure before the response has been
//! handed over falls back to a bare 500, and the original error is always
//! returned so the caller can observe it.

use crate::error::{ExchangeError, HostError};
use crate::host::InboundHost;
use crate::types::{InboundRequest, Reply, DEFAULT_BODY_CAPACITY};

/// Content-type attached to every adapter-built response.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// A user-supplied request handler.
///
/// Implemented for any `Fn(&InboundRequest, &mut Reply)` closure.
pub trait Handler {
    fn handle(&self, request: &InboundRequest, reply: &mut Reply);
}

impl<F: Fn(&InboundRequest, &mut Reply)> Handler for F {
    fn handle(&self, request: &InboundRequest, reply: &mut Reply) {
        self(request, reply)
    }
}

/// Adapter from the host's incoming-handler shape to a [`Handler`].
pub struct Adapter<H: InboundHost, F: Handler> {
    host: H,
    handler: F,
    content_type: String,
    body_capacity: usize,
}

impl<H: InboundHost, F: Handler> Adapter<H, F> {
    pub fn new(host: H, handler: F) -> Self {
        Adapter {
            host,
            handler,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            body_capacity: DEFAULT_BODY_CAPACITY,
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// Cap the number of body bytes a handler may produce per reply.
    pub fn with_body_capacity(mut self, capacity: usize) -> Self {
        self.body_capacity = capacity;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Handle one dispatch: run the handler and hand its reply to the
    /// outparam, exactly once, on every path.
    ///
    /// The returned error reports what failed even when a fallback 500 was
    /// delivered in its place.
    pub fn handle(
        &self,
        incoming: H::IncomingRequest,
        outparam: H::ResponseOutparam,
    ) -> Result<(), ExchangeError> {
        let request = InboundRequest {
            path_query: self.host.path_with_query(&incoming),
            authority: self.host.authority(&incoming),
        };

        let mut reply = Reply::with_capacity(self.body_capacity);
        self.handler.handle(&request, &mut reply);

        match self.build_response(&reply) {
            Ok((response, body)) => {
                // The response must be handed over before its body stream
                // is written.
                self.host.set_outparam(outparam, Ok(response));
                self.write_body(body, reply.body())
            }
            Err(err) => {
                // Best effort: the peer should still see a response.
                match self.build_error_response() {
                    Ok((response, body)) => {
                        self.host.set_outparam(outparam, Ok(response));
                        let _ = self.write_body(body, b"");
                    }
                    Err(_) => self
                        .host
                        .set_outparam(outparam, Err(HostError::new("response construction failed"))),
                }
                Err(err)
            }
        }
    }

    /// Construct the outgoing response and its body handle from a reply.
    fn build_response(
        &self,
        reply: &Reply,
    ) -> Result<(H::OutgoingResponse, H::OutgoingBody), ExchangeError> {
        let entries = vec![("Content-type".to_string(), self.content_type.clone())];
        let headers = self
            .host
            .headers_from_list(&entries)
            .map_err(ExchangeError::HeaderCreate)?;
        let mut response = self.host.new_response(headers);
        self.host
            .set_status(&mut response, reply.status())
            .map_err(ExchangeError::ResponseBuild)?;
        let body = self
            .host
            .response_body(&mut response)
            .map_err(ExchangeError::ResponseBuild)?;
        Ok((response, body))
    }

    /// A headerless 500 used when the real response could not be built.
    fn build_error_response(&self) -> Result<(H::OutgoingResponse, H::OutgoingBody), ExchangeError> {
        let headers = self
            .host
            .headers_from_list(&[])
            .map_err(ExchangeError::HeaderCreate)?;
        let mut response = self.host.new_response(headers);
        self.host
            .set_status(&mut response, 500)
            .map_err(ExchangeError::ResponseBuild)?;
        let body = self
            .host
            .response_body(&mut response)
            .map_err(ExchangeError::ResponseBuild)?;
        Ok((response, body))
    }

    /// Write the reply bytes and close out the body.
    fn write_body(&self, mut body: H::OutgoingBody, bytes: &[u8]) -> Result<(), ExchangeError> {
        if !bytes.is_empty() {
            let mut stream = self
                .host
                .body_write_stream(&mut body)
                .map_err(ExchangeError::OutputStream)?;
            self.host
                .write_and_flush(&mut stream, bytes)
                .map_err(ExchangeError::BodyWrite)?;
        }
        self.host.finish_body(body).map_err(ExchangeError::BodyFinish)
    }
}
