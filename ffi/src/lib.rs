//! C-ABI wrapper around `wasi-http-core`.
//!
//! # Overview
//! Exposes the two exchange entry points through `extern "C"` functions so a
//! C embedding can run the inbound adapter and the outbound client against
//! its own runtime. The runtime's resources are reached through an
//! [`FfiHostOps`] table of callbacks; the library never owns a transport.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Response bodies land in a caller-provided buffer with one byte reserved
//!   for the NUL terminator; overflow is reported via the `truncated` flag.
//! - Response headers are the one allocation the library makes; the caller
//!   releases them with `wasi_http_response_headers_free`, which frees both
//!   names and values.

pub mod host;
pub mod types;

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::panic::catch_unwind;

use wasi_http_core::{
    Adapter, Client, Handler, InboundRequest, OutboundRequest, Reply, DEFAULT_BODY_CAPACITY,
};

use host::{FfiHandleKind, FfiHostOps, OwnedHandle, VtableHost};
use types::{FfiExchangeCode, FfiHeaderList, FfiHttpRequest, FfiHttpResponse, FfiMethod, FfiReply, FfiScheme};

/// An inbound request handler written in C.
///
/// Receives a borrowed request view and a reply to fill in; both pointers
/// are valid only for the duration of the call.
pub type WasiHttpHandler =
    unsafe extern "C" fn(ctx: *mut c_void, request: *const FfiHttpRequest, reply: *mut FfiReply);

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Perform one outbound exchange through the runtime's host operations.
///
/// `body` may be null for a bodyless request. `response_out` must point to a
/// response whose `body` buffer (`body_max_len` bytes, at least 1) the
/// caller owns; on success the buffer holds a NUL-terminated body prefix and
/// `response_out->headers` holds an allocated header list the caller frees
/// with `wasi_http_response_headers_free`.
#[unsafe(no_mangle)]
pub extern "C" fn wasi_http_request(
    ops: *const FfiHostOps,
    method: FfiMethod,
    scheme: FfiScheme,
    authority: *const c_char,
    path_query: *const c_char,
    body: *const c_char,
    response_out: *mut FfiHttpResponse,
) -> FfiExchangeCode {
    catch_unwind(|| {
        if ops.is_null() || authority.is_null() || path_query.is_null() || response_out.is_null() {
            return FfiExchangeCode::NullArg;
        }
        let out = unsafe { &mut *response_out };
        if out.body.is_null() || out.body_max_len == 0 {
            return FfiExchangeCode::NullArg;
        }
        let ops = unsafe { &*ops };

        let authority = unsafe { CStr::from_ptr(authority) }
            .to_string_lossy()
            .into_owned();
        let path_query = unsafe { CStr::from_ptr(path_query) }
            .to_string_lossy()
            .into_owned();
        let mut request =
            OutboundRequest::new(method.into(), scheme.into(), &authority, &path_query);
        if !body.is_null() {
            request = request.with_body(unsafe { CStr::from_ptr(body) }.to_bytes().to_vec());
        }

        // One byte of the caller's buffer is reserved for the terminator.
        let capacity = (out.body_max_len - 1) as usize;
        let client = Client::new(VtableHost::new(ops)).with_body_capacity(capacity);
        match client.send(&request) {
            Ok(response) => {
                let copied = response.body.len().min(capacity);
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        response.body.as_ptr(),
                        out.body as *mut u8,
                        copied,
                    );
                    *out.body.add(copied) = 0;
                }
                out.status_code = response.status;
                out.truncated = response.truncated;
                out.body_len = copied as u32;
                out.headers = FfiHeaderList::from_pairs(response.headers);
                FfiExchangeCode::Ok
            }
            Err(err) => FfiExchangeCode::from(&err),
        }
    })
    .unwrap_or(FfiExchangeCode::Panic)
}

/// Free the header list of a response filled by `wasi_http_request`.
///
/// Releases the entry array and every name and value string, then leaves an
/// empty list behind. Safe to call with null and safe to call again on the
/// same response.
#[unsafe(no_mangle)]
pub extern "C" fn wasi_http_response_headers_free(response: *mut FfiHttpResponse) {
    if response.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let response = unsafe { &mut *response };
        let list = std::mem::replace(&mut response.headers, FfiHeaderList::empty());
        unsafe { list.free() };
    });
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Bridge from the C callback to the core handler trait.
struct CHandler {
    handler: WasiHttpHandler,
    ctx: *mut c_void,
    capacity: usize,
}

impl Handler for CHandler {
    fn handle(&self, request: &InboundRequest, reply: &mut Reply) {
        let path_query = match std::ffi::CString::new(request.path_query.clone()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let authority = match std::ffi::CString::new(request.authority.clone()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let view = FfiHttpRequest {
            path_query: path_query.as_ptr(),
            authority: authority.as_ptr(),
        };

        let mut buf = vec![0u8; self.capacity + 1];
        let mut ffi_reply = FfiReply {
            status_code: reply.status(),
            body: buf.as_mut_ptr() as *mut c_char,
            body_max_len: buf.len() as u32,
        };
        unsafe { (self.handler)(self.ctx, &view, &mut ffi_reply) };

        reply.set_status(ffi_reply.status_code);
        let len = buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.capacity)
            .min(self.capacity);
        reply.set_body(&buf[..len]);
    }
}

/// Handle one inbound dispatch through the runtime's host operations.
///
/// `request` and `outparam` are runtime handles; both are consumed. The
/// handler is invoked with a borrowed request view and a zeroed body buffer
/// of `body_capacity` bytes (plus a terminator byte); pass 0 for the 64 KiB
/// default. The outparam always receives a response: the handler's reply, a
/// bare 500 when that reply could not be serialized, or a failure as the
/// last resort.
#[unsafe(no_mangle)]
pub extern "C" fn wasi_http_handle(
    ops: *const FfiHostOps,
    request: *mut c_void,
    outparam: *mut c_void,
    handler: WasiHttpHandler,
    handler_ctx: *mut c_void,
    body_capacity: u32,
) -> FfiExchangeCode {
    catch_unwind(|| {
        if ops.is_null() || request.is_null() || outparam.is_null() {
            return FfiExchangeCode::NullArg;
        }
        let ops = unsafe { &*ops };
        let capacity = if body_capacity == 0 {
            DEFAULT_BODY_CAPACITY
        } else {
            body_capacity as usize
        };

        let bridge = CHandler {
            handler,
            ctx: handler_ctx,
            capacity,
        };
        let adapter = Adapter::new(VtableHost::new(ops), bridge).with_body_capacity(capacity);
        let incoming = OwnedHandle::new(ops, request, FfiHandleKind::IncomingRequest);
        let outparam = OwnedHandle::new(ops, outparam, FfiHandleKind::Outparam);
        match adapter.handle(incoming, outparam) {
            Ok(()) => FfiExchangeCode::Ok,
            Err(err) => FfiExchangeCode::from(&err),
        }
    })
    .unwrap_or(FfiExchangeCode::Panic)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::ffi::CString;
    use std::rc::Rc;

    use crate::host::{FfiFutureStatus, FfiReadStatus};
    use crate::types::{FfiHeaderView, FfiStringView};

    // A C-style runtime: every handle is a boxed enum, every callback logs
    // its name, and one op can be scripted to fail.

    #[derive(Default)]
    struct TestHost {
        fail: Option<&'static str>,
        pending: bool,
        response_err: bool,
        status: u16,
        headers: Vec<(String, String)>,
        chunks: Option<VecDeque<Vec<u8>>>,
        log: Vec<&'static str>,
        sent: Option<Sent>,
        delivered: Option<Result<Delivered, ()>>,
        allocs: usize,
        released: usize,
    }

    #[derive(Debug)]
    struct Sent {
        method: Option<FfiMethod>,
        scheme: Option<FfiScheme>,
        authority: Option<String>,
        path_query: Option<String>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        finished: bool,
    }

    struct Delivered {
        status: u16,
        headers: Vec<(String, String)>,
        body: Rc<RefCell<Vec<u8>>>,
        finished: Rc<Cell<bool>>,
    }

    struct TestRequest {
        method: Option<FfiMethod>,
        scheme: Option<FfiScheme>,
        authority: Option<String>,
        path_query: Option<String>,
        headers: Vec<(String, String)>,
        body: Rc<RefCell<Vec<u8>>>,
        finished: Rc<Cell<bool>>,
    }

    struct TestOutgoingResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: Rc<RefCell<Vec<u8>>>,
        finished: Rc<Cell<bool>>,
    }

    enum TestHandle {
        Headers(Vec<(String, String)>),
        Request(TestRequest),
        Body {
            buf: Rc<RefCell<Vec<u8>>>,
            finished: Rc<Cell<bool>>,
        },
        Stream(Rc<RefCell<Vec<u8>>>),
        Future,
        Pollable,
        Response {
            status: u16,
            headers: Vec<(String, String)>,
            chunks: Option<VecDeque<Vec<u8>>>,
        },
        IncomingBody(VecDeque<Vec<u8>>),
        InputStream {
            chunks: VecDeque<Vec<u8>>,
            fail: bool,
        },
        Incoming {
            path_query: CString,
            authority: CString,
        },
        Outparam,
        OutgoingResponse(TestOutgoingResponse),
    }

    unsafe fn state<'x>(ctx: *mut c_void) -> &'x RefCell<TestHost> {
        unsafe { &*(ctx as *const RefCell<TestHost>) }
    }

    unsafe fn alloc(ctx: *mut c_void, handle: TestHandle) -> *mut c_void {
        unsafe { state(ctx) }.borrow_mut().allocs += 1;
        Box::into_raw(Box::new(handle)) as *mut c_void
    }

    unsafe fn take(ctx: *mut c_void, handle: *mut c_void) -> Box<TestHandle> {
        unsafe { state(ctx) }.borrow_mut().released += 1;
        unsafe { Box::from_raw(handle as *mut TestHandle) }
    }

    unsafe fn borrow<'x>(handle: *mut c_void) -> &'x mut TestHandle {
        unsafe { &mut *(handle as *mut TestHandle) }
    }

    fn failing(ctx: *mut c_void, op: &'static str) -> bool {
        unsafe { state(ctx) }.borrow().fail == Some(op)
    }

    fn log(ctx: *mut c_void, op: &'static str) {
        unsafe { state(ctx) }.borrow_mut().log.push(op);
    }

    unsafe extern "C" fn headers_new(
        ctx: *mut c_void,
        entries: *const FfiHeaderView,
        len: u32,
    ) -> *mut c_void {
        log(ctx, "headers_new");
        if failing(ctx, "headers_new") && len > 0 {
            return std::ptr::null_mut();
        }
        let mut pairs = Vec::with_capacity(len as usize);
        if len > 0 {
            let views = unsafe { std::slice::from_raw_parts(entries, len as usize) };
            for view in views {
                pairs.push(unsafe { (view.name.to_string_lossy(), view.value.to_string_lossy()) });
            }
        }
        unsafe { alloc(ctx, TestHandle::Headers(pairs)) }
    }

    unsafe extern "C" fn handle_drop(ctx: *mut c_void, handle: *mut c_void, _kind: FfiHandleKind) {
        log(ctx, "handle_drop");
        drop(unsafe { take(ctx, handle) });
    }

    unsafe extern "C" fn request_new(ctx: *mut c_void, headers: *mut c_void) -> *mut c_void {
        log(ctx, "request_new");
        let headers = match *unsafe { take(ctx, headers) } {
            TestHandle::Headers(pairs) => pairs,
            _ => Vec::new(),
        };
        unsafe {
            alloc(
                ctx,
                TestHandle::Request(TestRequest {
                    method: None,
                    scheme: None,
                    authority: None,
                    path_query: None,
                    headers,
                    body: Rc::new(RefCell::new(Vec::new())),
                    finished: Rc::new(Cell::new(false)),
                }),
            )
        }
    }

    unsafe extern "C" fn request_set_method(
        ctx: *mut c_void,
        request: *mut c_void,
        method: FfiMethod,
    ) -> bool {
        log(ctx, "set_method");
        if failing(ctx, "set_method") {
            return false;
        }
        if let TestHandle::Request(r) = unsafe { borrow(request) } {
            r.method = Some(method);
        }
        true
    }

    unsafe extern "C" fn request_set_scheme(
        ctx: *mut c_void,
        request: *mut c_void,
        scheme: FfiScheme,
    ) -> bool {
        log(ctx, "set_scheme");
        if let TestHandle::Request(r) = unsafe { borrow(request) } {
            r.scheme = Some(scheme);
        }
        true
    }

    unsafe extern "C" fn request_set_authority(
        ctx: *mut c_void,
        request: *mut c_void,
        authority: *const c_char,
    ) -> bool {
        log(ctx, "set_authority");
        if let TestHandle::Request(r) = unsafe { borrow(request) } {
            r.authority = Some(unsafe { CStr::from_ptr(authority) }.to_string_lossy().into_owned());
        }
        true
    }

    unsafe extern "C" fn request_set_path_with_query(
        ctx: *mut c_void,
        request: *mut c_void,
        path_query: *const c_char,
    ) -> bool {
        log(ctx, "set_path_with_query");
        if let TestHandle::Request(r) = unsafe { borrow(request) } {
            r.path_query =
                Some(unsafe { CStr::from_ptr(path_query) }.to_string_lossy().into_owned());
        }
        true
    }

    unsafe extern "C" fn request_body(ctx: *mut c_void, request: *mut c_void) -> *mut c_void {
        log(ctx, "request_body");
        if failing(ctx, "request_body") {
            return std::ptr::null_mut();
        }
        match unsafe { borrow(request) } {
            TestHandle::Request(r) => unsafe {
                alloc(
                    ctx,
                    TestHandle::Body {
                        buf: Rc::clone(&r.body),
                        finished: Rc::clone(&r.finished),
                    },
                )
            },
            _ => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn body_write(ctx: *mut c_void, body: *mut c_void) -> *mut c_void {
        log(ctx, "body_write");
        if failing(ctx, "body_write") {
            return std::ptr::null_mut();
        }
        match unsafe { borrow(body) } {
            TestHandle::Body { buf, .. } => unsafe {
                alloc(ctx, TestHandle::Stream(Rc::clone(buf)))
            },
            _ => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn stream_write_and_flush(
        ctx: *mut c_void,
        stream: *mut c_void,
        bytes: *const u8,
        len: u32,
    ) -> bool {
        log(ctx, "write_and_flush");
        if failing(ctx, "write_and_flush") {
            return false;
        }
        if let TestHandle::Stream(buf) = unsafe { borrow(stream) } {
            let chunk = unsafe { std::slice::from_raw_parts(bytes, len as usize) };
            buf.borrow_mut().extend_from_slice(chunk);
        }
        true
    }

    unsafe extern "C" fn body_finish(ctx: *mut c_void, body: *mut c_void) -> bool {
        log(ctx, "body_finish");
        let body = unsafe { take(ctx, body) };
        if failing(ctx, "body_finish") {
            return false;
        }
        if let TestHandle::Body { finished, .. } = &*body {
            finished.set(true);
        }
        true
    }

    unsafe extern "C" fn request_send(ctx: *mut c_void, request: *mut c_void) -> *mut c_void {
        log(ctx, "send");
        let request = unsafe { take(ctx, request) };
        if failing(ctx, "send") {
            return std::ptr::null_mut();
        }
        if let TestHandle::Request(r) = *request {
            unsafe { state(ctx) }.borrow_mut().sent = Some(Sent {
                method: r.method,
                scheme: r.scheme,
                authority: r.authority,
                path_query: r.path_query,
                headers: r.headers,
                body: r.body.borrow().clone(),
                finished: r.finished.get(),
            });
        }
        unsafe { alloc(ctx, TestHandle::Future) }
    }

    unsafe extern "C" fn future_subscribe(ctx: *mut c_void, _future: *mut c_void) -> *mut c_void {
        log(ctx, "subscribe");
        unsafe { alloc(ctx, TestHandle::Pollable) }
    }

    unsafe extern "C" fn pollable_block(ctx: *mut c_void, _pollable: *mut c_void) {
        log(ctx, "block");
    }

    unsafe extern "C" fn future_get(
        ctx: *mut c_void,
        _future: *mut c_void,
        response_out: *mut *mut c_void,
    ) -> FfiFutureStatus {
        log(ctx, "future_get");
        let (pending, response_err, status, headers, chunks) = {
            let mut host = unsafe { state(ctx) }.borrow_mut();
            (
                host.pending,
                host.response_err,
                host.status,
                host.headers.clone(),
                host.chunks.take().unwrap_or_default(),
            )
        };
        if pending {
            return FfiFutureStatus::Pending;
        }
        if response_err {
            return FfiFutureStatus::Error;
        }
        let response = unsafe {
            alloc(
                ctx,
                TestHandle::Response {
                    status,
                    headers,
                    chunks: Some(chunks),
                },
            )
        };
        unsafe { *response_out = response };
        FfiFutureStatus::Ready
    }

    unsafe extern "C" fn response_status(ctx: *mut c_void, response: *mut c_void) -> u16 {
        log(ctx, "response_status");
        match unsafe { borrow(response) } {
            TestHandle::Response { status, .. } => *status,
            _ => 0,
        }
    }

    unsafe extern "C" fn response_header_count(ctx: *mut c_void, response: *mut c_void) -> u32 {
        log(ctx, "header_count");
        match unsafe { borrow(response) } {
            TestHandle::Response { headers, .. } => headers.len() as u32,
            _ => 0,
        }
    }

    unsafe extern "C" fn response_header_get(
        ctx: *mut c_void,
        response: *mut c_void,
        index: u32,
        name_out: *mut FfiStringView,
        value_out: *mut FfiStringView,
    ) -> bool {
        log(ctx, "header_get");
        if let TestHandle::Response { headers, .. } = unsafe { borrow(response) } {
            if let Some((name, value)) = headers.get(index as usize) {
                unsafe {
                    *name_out = FfiStringView::from_str(name);
                    *value_out = FfiStringView::from_str(value);
                }
                return true;
            }
        }
        false
    }

    unsafe extern "C" fn response_consume(ctx: *mut c_void, response: *mut c_void) -> *mut c_void {
        log(ctx, "consume");
        if failing(ctx, "consume") {
            return std::ptr::null_mut();
        }
        match unsafe { borrow(response) } {
            TestHandle::Response { chunks, .. } => match chunks.take() {
                Some(chunks) => unsafe { alloc(ctx, TestHandle::IncomingBody(chunks)) },
                None => std::ptr::null_mut(),
            },
            _ => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn body_stream(ctx: *mut c_void, body: *mut c_void) -> *mut c_void {
        log(ctx, "body_stream");
        if failing(ctx, "body_stream") {
            return std::ptr::null_mut();
        }
        let fail_read = failing(ctx, "read");
        match unsafe { borrow(body) } {
            TestHandle::IncomingBody(chunks) => unsafe {
                alloc(
                    ctx,
                    TestHandle::InputStream {
                        chunks: std::mem::take(chunks),
                        fail: fail_read,
                    },
                )
            },
            _ => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn stream_subscribe(ctx: *mut c_void, _stream: *mut c_void) -> *mut c_void {
        log(ctx, "subscribe");
        unsafe { alloc(ctx, TestHandle::Pollable) }
    }

    unsafe extern "C" fn stream_read(
        ctx: *mut c_void,
        stream: *mut c_void,
        buf: *mut u8,
        max: u32,
        read_out: *mut u32,
    ) -> FfiReadStatus {
        log(ctx, "read");
        if let TestHandle::InputStream { chunks, fail } = unsafe { borrow(stream) } {
            match chunks.pop_front() {
                Some(mut chunk) => {
                    if chunk.len() > max as usize {
                        chunks.push_front(chunk.split_off(max as usize));
                    }
                    unsafe {
                        std::ptr::copy_nonoverlapping(chunk.as_ptr(), buf, chunk.len());
                        *read_out = chunk.len() as u32;
                    }
                    FfiReadStatus::Data
                }
                None if *fail => FfiReadStatus::Error,
                None => FfiReadStatus::Closed,
            }
        } else {
            FfiReadStatus::Error
        }
    }

    unsafe extern "C" fn incoming_path_with_query(
        ctx: *mut c_void,
        request: *mut c_void,
    ) -> *const c_char {
        log(ctx, "incoming_path_with_query");
        match unsafe { borrow(request) } {
            TestHandle::Incoming { path_query, .. } => path_query.as_ptr(),
            _ => std::ptr::null(),
        }
    }

    unsafe extern "C" fn incoming_authority(
        ctx: *mut c_void,
        request: *mut c_void,
    ) -> *const c_char {
        log(ctx, "incoming_authority");
        match unsafe { borrow(request) } {
            TestHandle::Incoming { authority, .. } => authority.as_ptr(),
            _ => std::ptr::null(),
        }
    }

    unsafe extern "C" fn response_new(ctx: *mut c_void, headers: *mut c_void) -> *mut c_void {
        log(ctx, "response_new");
        let headers = match *unsafe { take(ctx, headers) } {
            TestHandle::Headers(pairs) => pairs,
            _ => Vec::new(),
        };
        unsafe {
            alloc(
                ctx,
                TestHandle::OutgoingResponse(TestOutgoingResponse {
                    status: 200,
                    headers,
                    body: Rc::new(RefCell::new(Vec::new())),
                    finished: Rc::new(Cell::new(false)),
                }),
            )
        }
    }

    unsafe extern "C" fn response_set_status(
        ctx: *mut c_void,
        response: *mut c_void,
        status: u16,
    ) -> bool {
        log(ctx, "set_status");
        if failing(ctx, "set_status") {
            return false;
        }
        if let TestHandle::OutgoingResponse(r) = unsafe { borrow(response) } {
            r.status = status;
        }
        true
    }

    unsafe extern "C" fn response_body(ctx: *mut c_void, response: *mut c_void) -> *mut c_void {
        log(ctx, "response_body");
        if failing(ctx, "response_body") {
            return std::ptr::null_mut();
        }
        match unsafe { borrow(response) } {
            TestHandle::OutgoingResponse(r) => unsafe {
                alloc(
                    ctx,
                    TestHandle::Body {
                        buf: Rc::clone(&r.body),
                        finished: Rc::clone(&r.finished),
                    },
                )
            },
            _ => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn outparam_set(
        ctx: *mut c_void,
        outparam: *mut c_void,
        response: *mut c_void,
        is_err: bool,
    ) {
        log(ctx, "outparam_set");
        drop(unsafe { take(ctx, outparam) });
        let delivered = if is_err || response.is_null() {
            Err(())
        } else {
            match *unsafe { take(ctx, response) } {
                TestHandle::OutgoingResponse(r) => Ok(Delivered {
                    status: r.status,
                    headers: r.headers,
                    body: r.body,
                    finished: r.finished,
                }),
                _ => Err(()),
            }
        };
        unsafe { state(ctx) }.borrow_mut().delivered = Some(delivered);
    }

    fn ops_table(ctx: *mut c_void) -> FfiHostOps {
        FfiHostOps {
            ctx,
            headers_new,
            handle_drop,
            request_new,
            request_set_method,
            request_set_scheme,
            request_set_authority,
            request_set_path_with_query,
            request_body,
            body_write,
            stream_write_and_flush,
            body_finish,
            request_send,
            future_subscribe,
            pollable_block,
            future_get,
            response_status,
            response_header_count,
            response_header_get,
            response_consume,
            body_stream,
            stream_subscribe,
            stream_read,
            incoming_path_with_query,
            incoming_authority,
            response_new,
            response_set_status,
            response_body,
            outparam_set,
        }
    }

    struct Fixture {
        ctx: *mut RefCell<TestHost>,
        ops: FfiHostOps,
    }

    impl Fixture {
        fn new() -> Self {
            let mut host = TestHost::default();
            host.status = 200;
            let ctx = Box::into_raw(Box::new(RefCell::new(host)));
            Fixture {
                ctx,
                ops: ops_table(ctx as *mut c_void),
            }
        }

        fn host(&self) -> &RefCell<TestHost> {
            unsafe { &*self.ctx }
        }

        fn respond(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
            let mut host = self.host().borrow_mut();
            host.status = status;
            host.headers = headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect();
            host.chunks = Some(if body.is_empty() {
                VecDeque::new()
            } else {
                VecDeque::from(vec![body.to_vec()])
            });
        }

        fn fail(&self, op: &'static str) {
            self.host().borrow_mut().fail = Some(op);
        }

        fn incoming(&self, path_query: &str, authority: &str) -> *mut c_void {
            unsafe {
                alloc(
                    self.ctx as *mut c_void,
                    TestHandle::Incoming {
                        path_query: CString::new(path_query).unwrap(),
                        authority: CString::new(authority).unwrap(),
                    },
                )
            }
        }

        fn outparam(&self) -> *mut c_void {
            unsafe { alloc(self.ctx as *mut c_void, TestHandle::Outparam) }
        }

        fn request(&self, buf: &mut [u8]) -> (FfiExchangeCode, FfiHttpResponse) {
            let authority = CString::new("example.com").unwrap();
            let path = CString::new("/hello").unwrap();
            let mut out = FfiHttpResponse {
                status_code: 0,
                truncated: false,
                body: buf.as_mut_ptr() as *mut c_char,
                body_max_len: buf.len() as u32,
                body_len: 0,
                headers: FfiHeaderList::empty(),
            };
            let code = wasi_http_request(
                &self.ops,
                FfiMethod::Get,
                FfiScheme::Http,
                authority.as_ptr(),
                path.as_ptr(),
                std::ptr::null(),
                &mut out,
            );
            (code, out)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            drop(unsafe { Box::from_raw(self.ctx) });
        }
    }

    unsafe extern "C" fn echo_handler(
        ctx: *mut c_void,
        request: *const FfiHttpRequest,
        reply: *mut FfiReply,
    ) {
        let request = unsafe { &*request };
        let reply = unsafe { &mut *reply };
        let path = unsafe { CStr::from_ptr(request.path_query) }.to_string_lossy();
        let body = format!("path={path}");
        let max = (reply.body_max_len as usize).saturating_sub(1);
        let copied = body.len().min(max);
        unsafe {
            std::ptr::copy_nonoverlapping(body.as_ptr(), reply.body as *mut u8, copied);
            *reply.body.add(copied) = 0;
        }
        reply.status_code = 200;
        let _ = ctx;
    }

    unsafe extern "C" fn teapot_handler(
        _ctx: *mut c_void,
        _request: *const FfiHttpRequest,
        reply: *mut FfiReply,
    ) {
        unsafe { (*reply).status_code = 418 };
    }

    #[test]
    fn request_fills_response_and_nul_terminates() {
        let fx = Fixture::new();
        fx.respond(201, &[("content-type", "text/plain")], b"hello");

        let mut buf = vec![0u8; 64];
        let (code, mut out) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::Ok);
        assert_eq!(out.status_code, 201);
        assert_eq!(out.body_len, 5);
        assert!(!out.truncated);
        assert_eq!(&buf[..6], b"hello\0");

        assert_eq!(out.headers.len, 1);
        let entries = unsafe { std::slice::from_raw_parts(out.headers.entries, 1) };
        let name = unsafe { CStr::from_ptr(entries[0].name) }.to_str().unwrap();
        let value = unsafe { CStr::from_ptr(entries[0].value) }.to_str().unwrap();
        assert_eq!(name, "content-type");
        assert_eq!(value, "text/plain");

        wasi_http_response_headers_free(&mut out);
        assert!(out.headers.entries.is_null());
        assert_eq!(out.headers.len, 0);
    }

    #[test]
    fn request_truncates_and_reserves_the_terminator_byte() {
        let fx = Fixture::new();
        fx.respond(200, &[], &[b'x'; 100]);

        let mut buf = vec![0u8; 11];
        let (code, out) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::Ok);
        assert!(out.truncated);
        assert_eq!(out.body_len, 10);
        assert_eq!(&buf[..10], &[b'x'; 10]);
        assert_eq!(buf[10], 0);
    }

    #[test]
    fn body_filling_the_buffer_exactly_reports_truncated() {
        let fx = Fixture::new();
        fx.respond(200, &[], &[b'y'; 10]);

        let mut buf = vec![0u8; 11];
        let (code, out) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::Ok);
        assert_eq!(out.body_len, 10);
        // Capacity was reached without observing end-of-body.
        assert!(out.truncated);
    }

    #[test]
    fn request_null_arguments_are_rejected() {
        let fx = Fixture::new();
        let authority = CString::new("example.com").unwrap();
        let path = CString::new("/").unwrap();
        let mut buf = vec![0u8; 8];
        let mut out = FfiHttpResponse {
            status_code: 0,
            truncated: false,
            body: buf.as_mut_ptr() as *mut c_char,
            body_max_len: buf.len() as u32,
            body_len: 0,
            headers: FfiHeaderList::empty(),
        };

        let code = wasi_http_request(
            std::ptr::null(),
            FfiMethod::Get,
            FfiScheme::Http,
            authority.as_ptr(),
            path.as_ptr(),
            std::ptr::null(),
            &mut out,
        );
        assert_eq!(code, FfiExchangeCode::NullArg);

        let code = wasi_http_request(
            &fx.ops,
            FfiMethod::Get,
            FfiScheme::Http,
            std::ptr::null(),
            path.as_ptr(),
            std::ptr::null(),
            &mut out,
        );
        assert_eq!(code, FfiExchangeCode::NullArg);

        out.body = std::ptr::null_mut();
        let code = wasi_http_request(
            &fx.ops,
            FfiMethod::Get,
            FfiScheme::Http,
            authority.as_ptr(),
            path.as_ptr(),
            std::ptr::null(),
            &mut out,
        );
        assert_eq!(code, FfiExchangeCode::NullArg);
    }

    #[test]
    fn failing_steps_surface_their_codes() {
        let cases: [(&'static str, FfiExchangeCode); 5] = [
            ("headers_new", FfiExchangeCode::HeaderCreate),
            ("set_method", FfiExchangeCode::RequestBuild),
            ("send", FfiExchangeCode::Send),
            ("consume", FfiExchangeCode::BodyConsume),
            ("body_stream", FfiExchangeCode::InputStream),
        ];
        for (op, expected) in cases {
            let fx = Fixture::new();
            fx.respond(200, &[], b"body");
            fx.fail(op);

            let mut buf = vec![0u8; 32];
            let (code, _) = fx.request(&mut buf);
            assert_eq!(code, expected, "op {op}");
        }
    }

    #[test]
    fn pending_future_reports_future_get() {
        let fx = Fixture::new();
        fx.respond(200, &[], b"");
        fx.host().borrow_mut().pending = true;

        let mut buf = vec![0u8; 32];
        let (code, _) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::FutureGet);
    }

    #[test]
    fn resolved_error_reports_response_error() {
        let fx = Fixture::new();
        fx.host().borrow_mut().response_err = true;

        let mut buf = vec![0u8; 32];
        let (code, _) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::ResponseError);
    }

    #[test]
    fn mid_body_read_failure_reports_body_read() {
        let fx = Fixture::new();
        fx.respond(200, &[], b"part");
        fx.fail("read");

        let mut buf = vec![0u8; 64];
        let (code, _) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::BodyRead);
    }

    #[test]
    fn request_body_is_written_and_finished_before_send() {
        let fx = Fixture::new();
        fx.respond(200, &[], b"");

        let authority = CString::new("example.com").unwrap();
        let path = CString::new("/submit").unwrap();
        let body = CString::new("ping").unwrap();
        let mut buf = vec![0u8; 32];
        let mut out = FfiHttpResponse {
            status_code: 0,
            truncated: false,
            body: buf.as_mut_ptr() as *mut c_char,
            body_max_len: buf.len() as u32,
            body_len: 0,
            headers: FfiHeaderList::empty(),
        };
        let code = wasi_http_request(
            &fx.ops,
            FfiMethod::Post,
            FfiScheme::Https,
            authority.as_ptr(),
            path.as_ptr(),
            body.as_ptr(),
            &mut out,
        );
        assert_eq!(code, FfiExchangeCode::Ok);

        let host = fx.host().borrow();
        let sent = host.sent.as_ref().unwrap();
        assert_eq!(sent.method, Some(FfiMethod::Post));
        assert_eq!(sent.scheme, Some(FfiScheme::Https));
        assert_eq!(sent.authority.as_deref(), Some("example.com"));
        assert_eq!(sent.path_query.as_deref(), Some("/submit"));
        assert_eq!(sent.body, b"ping");
        assert!(sent.finished);
        assert_eq!(
            sent.headers[0],
            ("User-agent".to_string(), "WASI-HTTP/0.0.1".to_string())
        );

        let finish = host.log.iter().position(|op| *op == "body_finish").unwrap();
        let send = host.log.iter().position(|op| *op == "send").unwrap();
        assert!(finish < send);
    }

    #[test]
    fn every_allocated_handle_is_released() {
        let fx = Fixture::new();
        fx.respond(200, &[("a", "1")], b"hello");

        let mut buf = vec![0u8; 64];
        let (code, mut out) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::Ok);
        wasi_http_response_headers_free(&mut out);

        let host = fx.host().borrow();
        assert_eq!(host.allocs, host.released);
    }

    #[test]
    fn handles_are_released_on_failure_paths_too() {
        let fx = Fixture::new();
        fx.respond(200, &[], b"body");
        fx.fail("body_stream");

        let mut buf = vec![0u8; 64];
        let (code, _) = fx.request(&mut buf);
        assert_eq!(code, FfiExchangeCode::InputStream);

        let host = fx.host().borrow();
        assert_eq!(host.allocs, host.released);
    }

    #[test]
    fn headers_free_is_null_safe_and_idempotent() {
        wasi_http_response_headers_free(std::ptr::null_mut());

        let fx = Fixture::new();
        fx.respond(200, &[("a", "1")], b"");
        let mut buf = vec![0u8; 8];
        let (_, mut out) = fx.request(&mut buf);
        wasi_http_response_headers_free(&mut out);
        wasi_http_response_headers_free(&mut out);
    }

    #[test]
    fn handle_runs_the_c_callback_and_delivers_its_reply() {
        let fx = Fixture::new();
        let request = fx.incoming("/hi?x=1", "example.com");
        let outparam = fx.outparam();

        let code = wasi_http_handle(&fx.ops, request, outparam, echo_handler, std::ptr::null_mut(), 0);
        assert_eq!(code, FfiExchangeCode::Ok);

        let host = fx.host().borrow();
        let delivered = host.delivered.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(delivered.status, 200);
        assert_eq!(
            delivered.headers,
            vec![("Content-type".to_string(), "text/plain".to_string())]
        );
        assert_eq!(&*delivered.body.borrow(), b"path=/hi?x=1");
        assert!(delivered.finished.get());
    }

    #[test]
    fn handle_caps_the_reply_at_the_given_capacity() {
        let fx = Fixture::new();
        let request = fx.incoming("/a-much-longer-path-than-the-buffer", "example.com");
        let outparam = fx.outparam();

        let code = wasi_http_handle(&fx.ops, request, outparam, echo_handler, std::ptr::null_mut(), 8);
        assert_eq!(code, FfiExchangeCode::Ok);

        let host = fx.host().borrow();
        let delivered = host.delivered.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(delivered.body.borrow().len(), 8);
        assert_eq!(&*delivered.body.borrow(), b"path=/a-");
    }

    #[test]
    fn handle_falls_back_to_500_when_headers_fail() {
        let fx = Fixture::new();
        fx.fail("headers_new");
        let request = fx.incoming("/", "example.com");
        let outparam = fx.outparam();

        let code =
            wasi_http_handle(&fx.ops, request, outparam, teapot_handler, std::ptr::null_mut(), 0);
        assert_eq!(code, FfiExchangeCode::HeaderCreate);

        let host = fx.host().borrow();
        let delivered = host.delivered.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(delivered.status, 500);
        assert!(delivered.headers.is_empty());
    }

    #[test]
    fn handle_reports_failure_through_the_outparam_as_last_resort() {
        let fx = Fixture::new();
        fx.fail("set_status");
        let request = fx.incoming("/", "example.com");
        let outparam = fx.outparam();

        let code =
            wasi_http_handle(&fx.ops, request, outparam, teapot_handler, std::ptr::null_mut(), 0);
        assert_eq!(code, FfiExchangeCode::ResponseBuild);

        let host = fx.host().borrow();
        assert!(host.delivered.as_ref().unwrap().is_err());
    }

    #[test]
    fn handle_null_arguments_are_rejected() {
        let fx = Fixture::new();
        let code = wasi_http_handle(
            std::ptr::null(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            teapot_handler,
            std::ptr::null_mut(),
            0,
        );
        assert_eq!(code, FfiExchangeCode::NullArg);

        let outparam = fx.outparam();
        let code = wasi_http_handle(
            &fx.ops,
            std::ptr::null_mut(),
            outparam,
            teapot_handler,
            std::ptr::null_mut(),
            0,
        );
        assert_eq!(code, FfiExchangeCode::NullArg);
        // The outparam handle was never consumed; release it directly.
        unsafe { handle_drop(fx.ctx as *mut c_void, outparam, FfiHandleKind::Outparam) };
    }

    #[test]
    fn handle_releases_all_handles() {
        let fx = Fixture::new();
        let request = fx.incoming("/hi", "example.com");
        let outparam = fx.outparam();

        wasi_http_handle(&fx.ops, request, outparam, echo_handler, std::ptr::null_mut(), 0);

        let host = fx.host().borrow();
        assert_eq!(host.allocs, host.released);
    }
}
