//! In-memory host with scripted responses and failure injection.
//!
//! # Design
//! `ScriptedHost` implements both core host traits without any I/O. Tests
//! script the response (status, headers, body chunks), optionally inject a
//! failure at one step, and afterwards inspect the operation log, the
//! captured sent request, or the response delivered to the outparam. All
//! state sits behind a shared `Rc<RefCell<..>>` so the host can be cloned
//! into a client or adapter while the test keeps a handle for assertions.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use wasi_http_core::host::{InboundHost, OutboundHost, ReadOutcome};
use wasi_http_core::{HostError, Method, Scheme};

/// Where to inject a scripted failure.
///
/// `HeaderCreate` only fails non-empty header lists, so the inbound
/// adapter's headerless 500 fallback still succeeds; `SetStatus` fails the
/// fallback too, exercising the last-resort error outparam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    HeaderCreate,
    RequestBuild,
    RequestBody,
    OutputStream,
    BodyWrite,
    BodyFinish,
    Send,
    FutureGet,
    ResponseError,
    BodyConsume,
    InputStream,
    BodyRead,
    SetStatus,
    ResponseBody,
}

/// What an outbound exchange handed to `send`.
#[derive(Debug, Clone, Default)]
pub struct SentRequest {
    pub method: Option<Method>,
    pub scheme: Option<Scheme>,
    pub authority: Option<String>,
    pub path_query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub body_finished: bool,
}

/// What an inbound exchange delivered to the response outparam.
#[derive(Debug, Clone)]
pub struct DeliveredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub body_finished: bool,
}

#[derive(Debug, Default)]
struct State {
    fail_at: Option<Step>,
    status: u16,
    headers: Vec<(String, String)>,
    chunks: Option<VecDeque<Vec<u8>>>,
    log: Vec<&'static str>,
    sent: Option<SentRequest>,
    delivered: Option<Result<Delivered, String>>,
}

#[derive(Debug)]
struct Delivered {
    status: u16,
    headers: Vec<(String, String)>,
    body: Rc<RefCell<Vec<u8>>>,
    finished: Rc<Cell<bool>>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedHost {
    state: Rc<RefCell<State>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        let host = ScriptedHost::default();
        host.state.borrow_mut().status = 200;
        host
    }

    /// Script the response as a single body chunk.
    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        let chunks = if body.is_empty() {
            Vec::new()
        } else {
            vec![body.to_vec()]
        };
        self.respond_chunks(status, headers, chunks);
    }

    /// Script the response with the exact chunk sequence the stream yields.
    pub fn respond_chunks(&self, status: u16, headers: &[(&str, &str)], chunks: Vec<Vec<u8>>) {
        let mut state = self.state.borrow_mut();
        state.status = status;
        state.headers = headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        state.chunks = Some(chunks.into());
    }

    /// Make the given step report a failure.
    pub fn fail_at(&self, step: Step) {
        self.state.borrow_mut().fail_at = Some(step);
    }

    /// Names of every host operation invoked so far, in order.
    pub fn ops(&self) -> Vec<&'static str> {
        self.state.borrow().log.clone()
    }

    /// The request captured by `send`, if the exchange got that far.
    pub fn sent(&self) -> Option<SentRequest> {
        self.state.borrow().sent.clone()
    }

    /// What the inbound adapter set on the outparam, if anything.
    pub fn delivered(&self) -> Option<Result<DeliveredResponse, String>> {
        self.state.borrow().delivered.as_ref().map(|r| match r {
            Ok(d) => Ok(DeliveredResponse {
                status: d.status,
                headers: d.headers.clone(),
                body: d.body.borrow().clone(),
                body_finished: d.finished.get(),
            }),
            Err(msg) => Err(msg.clone()),
        })
    }

    /// An incoming-request handle for driving the inbound adapter.
    pub fn incoming(&self, path_query: &str, authority: &str) -> ScriptedIncoming {
        ScriptedIncoming {
            path_query: path_query.to_string(),
            authority: authority.to_string(),
        }
    }

    /// A fresh response outparam slot, inspected later via `delivered`.
    pub fn outparam(&self) -> ScriptedOutparam {
        ScriptedOutparam
    }

    fn log(&self, op: &'static str) {
        self.state.borrow_mut().log.push(op);
    }

    fn check(&self, step: Step, msg: &str) -> Result<(), HostError> {
        if self.state.borrow().fail_at == Some(step) {
            Err(HostError::new(msg))
        } else {
            Ok(())
        }
    }
}

// --- outbound handle types ---

#[derive(Debug)]
pub struct ScriptedHeaders(Vec<(String, String)>);

#[derive(Debug)]
pub struct ScriptedOutgoing {
    method: Option<Method>,
    scheme: Option<Scheme>,
    authority: Option<String>,
    path_query: Option<String>,
    headers: Vec<(String, String)>,
    body: Rc<RefCell<Vec<u8>>>,
    finished: Rc<Cell<bool>>,
}

#[derive(Debug)]
pub struct ScriptedBody {
    buf: Rc<RefCell<Vec<u8>>>,
    finished: Rc<Cell<bool>>,
}

#[derive(Debug)]
pub struct ScriptedStream {
    buf: Rc<RefCell<Vec<u8>>>,
}

#[derive(Debug)]
pub struct ScriptedFuture;

#[derive(Debug)]
pub struct ScriptedPollable;

#[derive(Debug)]
pub struct ScriptedIncomingResponse {
    status: u16,
    headers: Vec<(String, String)>,
    chunks: Option<VecDeque<Vec<u8>>>,
}

#[derive(Debug)]
pub struct ScriptedIncomingBody {
    chunks: VecDeque<Vec<u8>>,
}

#[derive(Debug)]
pub struct ScriptedInputStream {
    chunks: VecDeque<Vec<u8>>,
    fail_read: bool,
}

impl OutboundHost for ScriptedHost {
    type Headers = ScriptedHeaders;
    type OutgoingRequest = ScriptedOutgoing;
    type OutgoingBody = ScriptedBody;
    type OutputStream = ScriptedStream;
    type FutureResponse = ScriptedFuture;
    type Pollable = ScriptedPollable;
    type IncomingResponse = ScriptedIncomingResponse;
    type IncomingBody = ScriptedIncomingBody;
    type InputStream = ScriptedInputStream;

    fn headers_from_list(
        &self,
        entries: &[(String, String)],
    ) -> Result<ScriptedHeaders, HostError> {
        self.log("headers_from_list");
        if !entries.is_empty() {
            self.check(Step::HeaderCreate, "header create failed")?;
        }
        Ok(ScriptedHeaders(entries.to_vec()))
    }

    fn new_request(&self, headers: ScriptedHeaders) -> ScriptedOutgoing {
        self.log("new_request");
        ScriptedOutgoing {
            method: None,
            scheme: None,
            authority: None,
            path_query: None,
            headers: headers.0,
            body: Rc::new(RefCell::new(Vec::new())),
            finished: Rc::new(Cell::new(false)),
        }
    }

    fn set_method(&self, request: &mut ScriptedOutgoing, method: Method) -> Result<(), HostError> {
        self.log("set_method");
        self.check(Step::RequestBuild, "set_method rejected")?;
        request.method = Some(method);
        Ok(())
    }

    fn set_scheme(&self, request: &mut ScriptedOutgoing, scheme: Scheme) -> Result<(), HostError> {
        self.log("set_scheme");
        request.scheme = Some(scheme);
        Ok(())
    }

    fn set_authority(
        &self,
        request: &mut ScriptedOutgoing,
        authority: &str,
    ) -> Result<(), HostError> {
        self.log("set_authority");
        request.authority = Some(authority.to_string());
        Ok(())
    }

    fn set_path_with_query(
        &self,
        request: &mut ScriptedOutgoing,
        path_query: &str,
    ) -> Result<(), HostError> {
        self.log("set_path_with_query");
        request.path_query = Some(path_query.to_string());
        Ok(())
    }

    fn request_body(&self, request: &mut ScriptedOutgoing) -> Result<ScriptedBody, HostError> {
        self.log("request_body");
        self.check(Step::RequestBody, "request body unavailable")?;
        Ok(ScriptedBody {
            buf: Rc::clone(&request.body),
            finished: Rc::clone(&request.finished),
        })
    }

    fn body_write_stream(&self, body: &mut ScriptedBody) -> Result<ScriptedStream, HostError> {
        self.log("body_write_stream");
        self.check(Step::OutputStream, "output stream unavailable")?;
        Ok(ScriptedStream {
            buf: Rc::clone(&body.buf),
        })
    }

    fn write_and_flush(&self, stream: &mut ScriptedStream, bytes: &[u8]) -> Result<(), HostError> {
        self.log("write_and_flush");
        self.check(Step::BodyWrite, "write refused")?;
        stream.buf.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }

    fn finish_body(&self, body: ScriptedBody) -> Result<(), HostError> {
        self.log("finish_body");
        self.check(Step::BodyFinish, "finish refused")?;
        body.finished.set(true);
        Ok(())
    }

    fn send(&self, request: ScriptedOutgoing) -> Result<ScriptedFuture, HostError> {
        self.log("send");
        self.check(Step::Send, "outgoing handler refused request")?;
        self.state.borrow_mut().sent = Some(SentRequest {
            method: request.method,
            scheme: request.scheme,
            authority: request.authority,
            path_query: request.path_query,
            headers: request.headers,
            body: request.body.borrow().clone(),
            body_finished: request.finished.get(),
        });
        Ok(ScriptedFuture)
    }

    fn subscribe_future(&self, _future: &ScriptedFuture) -> ScriptedPollable {
        self.log("subscribe_future");
        ScriptedPollable
    }

    fn block(&self, _pollable: &ScriptedPollable) {
        self.log("block");
    }

    fn future_result(
        &self,
        _future: &ScriptedFuture,
    ) -> Option<Result<ScriptedIncomingResponse, HostError>> {
        self.log("future_result");
        let mut state = self.state.borrow_mut();
        if state.fail_at == Some(Step::FutureGet) {
            return None;
        }
        if state.fail_at == Some(Step::ResponseError) {
            return Some(Err(HostError::new("connection reset")));
        }
        Some(Ok(ScriptedIncomingResponse {
            status: state.status,
            headers: state.headers.clone(),
            chunks: Some(state.chunks.take().unwrap_or_default()),
        }))
    }

    fn response_status(&self, response: &ScriptedIncomingResponse) -> u16 {
        self.log("response_status");
        response.status
    }

    fn response_headers(&self, response: &ScriptedIncomingResponse) -> Vec<(String, String)> {
        self.log("response_headers");
        response.headers.clone()
    }

    fn consume_body(
        &self,
        response: &mut ScriptedIncomingResponse,
    ) -> Result<ScriptedIncomingBody, HostError> {
        self.log("consume_body");
        self.check(Step::BodyConsume, "body already consumed")?;
        let chunks = response
            .chunks
            .take()
            .ok_or_else(|| HostError::new("body already consumed"))?;
        Ok(ScriptedIncomingBody { chunks })
    }

    fn body_read_stream(
        &self,
        body: &mut ScriptedIncomingBody,
    ) -> Result<ScriptedInputStream, HostError> {
        self.log("body_read_stream");
        self.check(Step::InputStream, "input stream unavailable")?;
        Ok(ScriptedInputStream {
            chunks: std::mem::take(&mut body.chunks),
            fail_read: self.state.borrow().fail_at == Some(Step::BodyRead),
        })
    }

    fn subscribe_input(&self, _stream: &ScriptedInputStream) -> ScriptedPollable {
        self.log("subscribe_input");
        ScriptedPollable
    }

    fn read(&self, stream: &mut ScriptedInputStream, max: usize) -> ReadOutcome {
        self.log("read");
        match stream.chunks.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > max {
                    stream.chunks.push_front(chunk.split_off(max));
                }
                ReadOutcome::Data(chunk)
            }
            // An injected read failure surfaces where end-of-body would,
            // i.e. after any scripted chunks: mid-body from the caller's
            // point of view.
            None if stream.fail_read => ReadOutcome::Err(HostError::new("stream reset")),
            None => ReadOutcome::Closed,
        }
    }
}

// --- inbound handle types ---

#[derive(Debug)]
pub struct ScriptedIncoming {
    path_query: String,
    authority: String,
}

#[derive(Debug)]
pub struct ScriptedOutparam;

#[derive(Debug)]
pub struct ScriptedOutgoingResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Rc<RefCell<Vec<u8>>>,
    finished: Rc<Cell<bool>>,
}

impl InboundHost for ScriptedHost {
    type IncomingRequest = ScriptedIncoming;
    type ResponseOutparam = ScriptedOutparam;
    type Headers = ScriptedHeaders;
    type OutgoingResponse = ScriptedOutgoingResponse;
    type OutgoingBody = ScriptedBody;
    type OutputStream = ScriptedStream;

    fn path_with_query(&self, request: &ScriptedIncoming) -> String {
        self.log("path_with_query");
        request.path_query.clone()
    }

    fn authority(&self, request: &ScriptedIncoming) -> String {
        self.log("authority");
        request.authority.clone()
    }

    fn headers_from_list(
        &self,
        entries: &[(String, String)],
    ) -> Result<ScriptedHeaders, HostError> {
        OutboundHost::headers_from_list(self, entries)
    }

    fn new_response(&self, headers: ScriptedHeaders) -> ScriptedOutgoingResponse {
        self.log("new_response");
        ScriptedOutgoingResponse {
            status: 200,
            headers: headers.0,
            body: Rc::new(RefCell::new(Vec::new())),
            finished: Rc::new(Cell::new(false)),
        }
    }

    fn set_status(
        &self,
        response: &mut ScriptedOutgoingResponse,
        status: u16,
    ) -> Result<(), HostError> {
        self.log("set_status");
        self.check(Step::SetStatus, "set_status rejected")?;
        response.status = status;
        Ok(())
    }

    fn response_body(
        &self,
        response: &mut ScriptedOutgoingResponse,
    ) -> Result<ScriptedBody, HostError> {
        self.log("response_body");
        self.check(Step::ResponseBody, "response body unavailable")?;
        Ok(ScriptedBody {
            buf: Rc::clone(&response.body),
            finished: Rc::clone(&response.finished),
        })
    }

    fn body_write_stream(&self, body: &mut ScriptedBody) -> Result<ScriptedStream, HostError> {
        OutboundHost::body_write_stream(self, body)
    }

    fn write_and_flush(&self, stream: &mut ScriptedStream, bytes: &[u8]) -> Result<(), HostError> {
        OutboundHost::write_and_flush(self, stream, bytes)
    }

    fn finish_body(&self, body: ScriptedBody) -> Result<(), HostError> {
        OutboundHost::finish_body(self, body)
    }

    fn set_outparam(
        &self,
        _outparam: ScriptedOutparam,
        response: Result<ScriptedOutgoingResponse, HostError>,
    ) {
        self.log("set_outparam");
        self.state.borrow_mut().delivered = Some(match response {
            Ok(r) => Ok(Delivered {
                status: r.status,
                headers: r.headers,
                body: r.body,
                finished: r.finished,
            }),
            Err(e) => Err(e.to_string()),
        });
    }
}
