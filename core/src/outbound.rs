//! Outbound HTTP client: one synchronous request/response exchange.
//!
//! # Design
//! `Client` is stateless between calls — it holds the host and a body
//! capacity. `send` runs a strictly linear sequence: build headers, build
//! the request, write the body, finish it, hand it to the host, block for
//! the response, then drain the body into a bounded buffer. Each step maps
//! its failure to a distinct [`ExchangeError`] variant, so the first failing
//! step determines the reported code and nothing after it runs.

use crate::error::ExchangeError;
use crate::host::{OutboundHost, ReadOutcome};
use crate::types::{OutboundRequest, Response, DEFAULT_BODY_CAPACITY};

/// Informational headers attached to every outbound request, ahead of any
/// caller-supplied extras.
pub const DEFAULT_HEADERS: [(&str, &str); 2] = [
    ("User-agent", "WASI-HTTP/0.0.1"),
    ("Content-type", "application/json"),
];

/// Synchronous outbound client over an [`OutboundHost`].
///
/// No retries, no timeout: a stalled host future blocks the caller until
/// the host reports readiness.
#[derive(Debug, Clone)]
pub struct Client<H: OutboundHost> {
    host: H,
    body_capacity: usize,
}

impl<H: OutboundHost> Client<H> {
    pub fn new(host: H) -> Self {
        Client {
            host,
            body_capacity: DEFAULT_BODY_CAPACITY,
        }
    }

    /// Cap the number of response body bytes retained. Bodies larger than
    /// this are truncated, reported via [`Response::truncated`].
    pub fn with_body_capacity(mut self, capacity: usize) -> Self {
        self.body_capacity = capacity;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Perform one exchange: build, send, await, drain.
    pub fn send(&self, request: &OutboundRequest) -> Result<Response, ExchangeError> {
        let host = &self.host;

        // Step 1: headers.
        let mut entries: Vec<(String, String)> = DEFAULT_HEADERS
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        entries.extend(request.headers.iter().cloned());
        let headers = host
            .headers_from_list(&entries)
            .map_err(ExchangeError::HeaderCreate)?;

        // Step 2: request fields and body accessor, short-circuit on the
        // first failure.
        let mut outgoing = host.new_request(headers);
        let mut body_handle = host
            .set_method(&mut outgoing, request.method)
            .and_then(|()| host.set_path_with_query(&mut outgoing, &request.path_query))
            .and_then(|()| host.set_scheme(&mut outgoing, request.scheme))
            .and_then(|()| host.set_authority(&mut outgoing, &request.authority))
            .and_then(|()| host.request_body(&mut outgoing))
            .map_err(ExchangeError::RequestBuild)?;

        // Step 3: body bytes, only when supplied.
        if let Some(bytes) = &request.body {
            let mut stream = host
                .body_write_stream(&mut body_handle)
                .map_err(ExchangeError::OutputStream)?;
            host.write_and_flush(&mut stream, bytes)
                .map_err(ExchangeError::BodyWrite)?;
        }

        // Steps 4–5: no trailers, then hand off.
        host.finish_body(body_handle)
            .map_err(ExchangeError::BodyFinish)?;
        let future = host.send(outgoing).map_err(ExchangeError::Send)?;

        // Step 6: the one suspension point of the whole exchange.
        let pollable = host.subscribe_future(&future);
        host.block(&pollable);

        // Step 7: two-level resolution.
        let mut response = host
            .future_result(&future)
            .ok_or(ExchangeError::FutureGet)?
            .map_err(ExchangeError::Response)?;

        // Step 8: status and ordered headers.
        let status = host.response_status(&response);
        let headers = host.response_headers(&response);

        // Step 9: bounded drain.
        let mut incoming_body = host
            .consume_body(&mut response)
            .map_err(ExchangeError::BodyConsume)?;
        let mut stream = host
            .body_read_stream(&mut incoming_body)
            .map_err(ExchangeError::InputStream)?;
        let (body, truncated) = self.drain(&mut stream)?;

        Ok(Response {
            status,
            headers,
            body,
            truncated,
        })
    }

    /// Read until end-of-body or capacity, whichever comes first.
    fn drain(&self, stream: &mut H::InputStream) -> Result<(Vec<u8>, bool), ExchangeError> {
        let host = &self.host;
        let pollable = host.subscribe_input(stream);
        let mut body = Vec::new();
        let mut closed = false;

        while body.len() < self.body_capacity {
            host.block(&pollable);
            match host.read(stream, self.body_capacity - body.len()) {
                ReadOutcome::Data(chunk) => {
                    // Hosts must not return more than asked for; clamp so a
                    // misbehaving one cannot overrun the capacity.
                    let remaining = self.body_capacity - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                }
                ReadOutcome::Closed => {
                    closed = true;
                    break;
                }
                ReadOutcome::Err(e) => return Err(ExchangeError::BodyRead(e)),
            }
        }

        let truncated = !closed && body.len() >= self.body_capacity;
        Ok((body, truncated))
    }
}
