//! C vtable adapter implementing the core host traits.
//!
//! # Design
//! The embedding runtime supplies one `FfiHostOps` struct of function
//! pointers plus an opaque context. `VtableHost` wraps a reference to it and
//! implements both core host traits; every resource handle the runtime hands
//! out is held in an [`OwnedHandle`] whose `Drop` routes back through
//! `handle_drop`, so early error returns inside the core release handles
//! without any cleanup code at this layer. Operations that consume a handle
//! on the runtime side use [`OwnedHandle::into_raw`] to skip the drop hook.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};

use wasi_http_core::host::{InboundHost, OutboundHost, ReadOutcome};
use wasi_http_core::{HostError, Method, Scheme};

use crate::types::{FfiHeaderView, FfiMethod, FfiScheme, FfiStringView};

/// What kind of resource a handle refers to, passed back on release so the
/// runtime can dispatch its own destructor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHandleKind {
    Headers = 0,
    Request = 1,
    OutgoingBody = 2,
    OutputStream = 3,
    Future = 4,
    Pollable = 5,
    Response = 6,
    IncomingBody = 7,
    InputStream = 8,
    IncomingRequest = 9,
    OutgoingResponse = 10,
    Outparam = 11,
}

/// Result of a `future_get` callback.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiFutureStatus {
    /// `response_out` was filled with a response handle.
    Ready = 0,
    /// The future holds no value.
    Pending = 1,
    /// The exchange resolved to a transport or protocol error.
    Error = 2,
}

/// Result of a `stream_read` callback.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiReadStatus {
    /// `read_out` bytes were written into the buffer.
    Data = 0,
    /// End of body; no bytes were written.
    Closed = 1,
    /// The stream failed.
    Error = 2,
}

/// The host operations table a runtime provides.
///
/// Every callback receives `ctx` as its first argument. Handle parameters
/// and results are opaque `void*` values owned by the runtime; ownership
/// transfers are called out per field. Callbacks returning `bool` report
/// `false` on failure. A null handle from a constructor callback is also a
/// failure.
#[repr(C)]
pub struct FfiHostOps {
    pub ctx: *mut c_void,

    // --- shared resource construction ---
    /// Build a header list from `len` borrowed entries. Returns null on
    /// failure.
    pub headers_new:
        unsafe extern "C" fn(ctx: *mut c_void, entries: *const FfiHeaderView, len: u32) -> *mut c_void,
    /// Release any handle this table produced. `kind` identifies its type.
    pub handle_drop: unsafe extern "C" fn(ctx: *mut c_void, handle: *mut c_void, kind: FfiHandleKind),

    // --- outbound request construction ---
    /// Build an outgoing request. Takes ownership of `headers`.
    pub request_new: unsafe extern "C" fn(ctx: *mut c_void, headers: *mut c_void) -> *mut c_void,
    pub request_set_method:
        unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void, method: FfiMethod) -> bool,
    pub request_set_scheme:
        unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void, scheme: FfiScheme) -> bool,
    pub request_set_authority:
        unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void, authority: *const c_char) -> bool,
    pub request_set_path_with_query:
        unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void, path_query: *const c_char) -> bool,
    /// Borrow the writable body resource of a request. Returns null on
    /// failure.
    pub request_body: unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void) -> *mut c_void,

    // --- outgoing body ---
    /// Obtain the output stream of an outgoing body. Returns null on failure.
    pub body_write: unsafe extern "C" fn(ctx: *mut c_void, body: *mut c_void) -> *mut c_void,
    pub stream_write_and_flush: unsafe extern "C" fn(
        ctx: *mut c_void,
        stream: *mut c_void,
        bytes: *const u8,
        len: u32,
    ) -> bool,
    /// Finish an outgoing body with no trailers. Takes ownership of `body`.
    pub body_finish: unsafe extern "C" fn(ctx: *mut c_void, body: *mut c_void) -> bool,

    // --- dispatch and await ---
    /// Hand the request to the outgoing handler. Takes ownership of
    /// `request`; returns a future handle, or null if refused.
    pub request_send: unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void) -> *mut c_void,
    pub future_subscribe: unsafe extern "C" fn(ctx: *mut c_void, future: *mut c_void) -> *mut c_void,
    pub pollable_block: unsafe extern "C" fn(ctx: *mut c_void, pollable: *mut c_void),
    /// Fetch the future's value. On `Ready`, writes an owned response handle
    /// to `response_out`.
    pub future_get: unsafe extern "C" fn(
        ctx: *mut c_void,
        future: *mut c_void,
        response_out: *mut *mut c_void,
    ) -> FfiFutureStatus,

    // --- incoming response ---
    pub response_status: unsafe extern "C" fn(ctx: *mut c_void, response: *mut c_void) -> u16,
    pub response_header_count: unsafe extern "C" fn(ctx: *mut c_void, response: *mut c_void) -> u32,
    /// Borrow the header at `index`. The views stay valid until the next
    /// host call. Returns false when out of range.
    pub response_header_get: unsafe extern "C" fn(
        ctx: *mut c_void,
        response: *mut c_void,
        index: u32,
        name_out: *mut FfiStringView,
        value_out: *mut FfiStringView,
    ) -> bool,
    /// Consume the response body. Returns null on failure or second call.
    pub response_consume: unsafe extern "C" fn(ctx: *mut c_void, response: *mut c_void) -> *mut c_void,
    /// Obtain the input stream of an incoming body. Returns null on failure.
    pub body_stream: unsafe extern "C" fn(ctx: *mut c_void, body: *mut c_void) -> *mut c_void,
    pub stream_subscribe: unsafe extern "C" fn(ctx: *mut c_void, stream: *mut c_void) -> *mut c_void,
    /// Read up to `max` bytes into `buf`; on `Data`, `read_out` holds the
    /// count.
    pub stream_read: unsafe extern "C" fn(
        ctx: *mut c_void,
        stream: *mut c_void,
        buf: *mut u8,
        max: u32,
        read_out: *mut u32,
    ) -> FfiReadStatus,

    // --- inbound ---
    /// Borrowed NUL-terminated path and query of an incoming request; null
    /// means absent.
    pub incoming_path_with_query:
        unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void) -> *const c_char,
    pub incoming_authority:
        unsafe extern "C" fn(ctx: *mut c_void, request: *mut c_void) -> *const c_char,
    /// Build an outgoing response. Takes ownership of `headers`.
    pub response_new: unsafe extern "C" fn(ctx: *mut c_void, headers: *mut c_void) -> *mut c_void,
    pub response_set_status:
        unsafe extern "C" fn(ctx: *mut c_void, response: *mut c_void, status: u16) -> bool,
    /// Borrow the writable body resource of a response. Returns null on
    /// failure.
    pub response_body: unsafe extern "C" fn(ctx: *mut c_void, response: *mut c_void) -> *mut c_void,
    /// Deliver the response (or, when `is_err` is set, a failure with
    /// `response` null) to the outparam. Takes ownership of both handles.
    pub outparam_set: unsafe extern "C" fn(
        ctx: *mut c_void,
        outparam: *mut c_void,
        response: *mut c_void,
        is_err: bool,
    ),
}

/// A runtime handle that releases itself through `handle_drop`.
pub struct OwnedHandle<'a> {
    ptr: *mut c_void,
    kind: FfiHandleKind,
    ops: &'a FfiHostOps,
}

impl<'a> OwnedHandle<'a> {
    pub(crate) fn new(ops: &'a FfiHostOps, ptr: *mut c_void, kind: FfiHandleKind) -> Self {
        OwnedHandle { ptr, kind, ops }
    }

    pub(crate) fn ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// Transfer ownership to the runtime: the drop hook is skipped.
    pub(crate) fn into_raw(self) -> *mut c_void {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl Drop for OwnedHandle<'_> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.ops.handle_drop)(self.ops.ctx, self.ptr, self.kind) };
        }
    }
}

/// Core host backed by an `FfiHostOps` table.
pub struct VtableHost<'a> {
    ops: &'a FfiHostOps,
}

impl<'a> VtableHost<'a> {
    pub fn new(ops: &'a FfiHostOps) -> Self {
        VtableHost { ops }
    }

    fn handle(
        &self,
        ptr: *mut c_void,
        kind: FfiHandleKind,
        what: &str,
    ) -> Result<OwnedHandle<'a>, HostError> {
        if ptr.is_null() {
            Err(HostError::new(format!("{what} returned no handle")))
        } else {
            Ok(OwnedHandle::new(self.ops, ptr, kind))
        }
    }

    fn check(&self, ok: bool, what: &str) -> Result<(), HostError> {
        if ok {
            Ok(())
        } else {
            Err(HostError::new(format!("{what} failed")))
        }
    }

    fn c_string(&self, s: &str, what: &str) -> Result<CString, HostError> {
        CString::new(s).map_err(|_| HostError::new(format!("{what} contains a NUL byte")))
    }

    fn build_headers(&self, entries: &[(String, String)]) -> Result<OwnedHandle<'a>, HostError> {
        let views: Vec<FfiHeaderView> = entries
            .iter()
            .map(|(name, value)| FfiHeaderView {
                name: FfiStringView::from_str(name),
                value: FfiStringView::from_str(value),
            })
            .collect();
        let ptr = unsafe {
            (self.ops.headers_new)(self.ops.ctx, views.as_ptr(), views.len() as u32)
        };
        self.handle(ptr, FfiHandleKind::Headers, "headers_new")
    }
}

impl<'a> OutboundHost for VtableHost<'a> {
    type Headers = OwnedHandle<'a>;
    type OutgoingRequest = OwnedHandle<'a>;
    type OutgoingBody = OwnedHandle<'a>;
    type OutputStream = OwnedHandle<'a>;
    type FutureResponse = OwnedHandle<'a>;
    type Pollable = OwnedHandle<'a>;
    type IncomingResponse = OwnedHandle<'a>;
    type IncomingBody = OwnedHandle<'a>;
    type InputStream = OwnedHandle<'a>;

    fn headers_from_list(
        &self,
        entries: &[(String, String)],
    ) -> Result<OwnedHandle<'a>, HostError> {
        self.build_headers(entries)
    }

    fn new_request(&self, headers: OwnedHandle<'a>) -> OwnedHandle<'a> {
        let ptr = unsafe { (self.ops.request_new)(self.ops.ctx, headers.into_raw()) };
        OwnedHandle::new(self.ops, ptr, FfiHandleKind::Request)
    }

    fn set_method(&self, request: &mut OwnedHandle<'a>, method: Method) -> Result<(), HostError> {
        let method = match method {
            Method::Get => FfiMethod::Get,
            Method::Head => FfiMethod::Head,
            Method::Post => FfiMethod::Post,
            Method::Put => FfiMethod::Put,
            Method::Delete => FfiMethod::Delete,
            Method::Connect => FfiMethod::Connect,
            Method::Options => FfiMethod::Options,
            Method::Trace => FfiMethod::Trace,
            Method::Patch => FfiMethod::Patch,
        };
        let ok = unsafe { (self.ops.request_set_method)(self.ops.ctx, request.ptr(), method) };
        self.check(ok, "request_set_method")
    }

    fn set_scheme(&self, request: &mut OwnedHandle<'a>, scheme: Scheme) -> Result<(), HostError> {
        let scheme = match scheme {
            Scheme::Http => FfiScheme::Http,
            Scheme::Https => FfiScheme::Https,
        };
        let ok = unsafe { (self.ops.request_set_scheme)(self.ops.ctx, request.ptr(), scheme) };
        self.check(ok, "request_set_scheme")
    }

    fn set_authority(&self, request: &mut OwnedHandle<'a>, authority: &str) -> Result<(), HostError> {
        let authority = self.c_string(authority, "authority")?;
        let ok = unsafe {
            (self.ops.request_set_authority)(self.ops.ctx, request.ptr(), authority.as_ptr())
        };
        self.check(ok, "request_set_authority")
    }

    fn set_path_with_query(
        &self,
        request: &mut OwnedHandle<'a>,
        path_query: &str,
    ) -> Result<(), HostError> {
        let path_query = self.c_string(path_query, "path_with_query")?;
        let ok = unsafe {
            (self.ops.request_set_path_with_query)(self.ops.ctx, request.ptr(), path_query.as_ptr())
        };
        self.check(ok, "request_set_path_with_query")
    }

    fn request_body(&self, request: &mut OwnedHandle<'a>) -> Result<OwnedHandle<'a>, HostError> {
        let ptr = unsafe { (self.ops.request_body)(self.ops.ctx, request.ptr()) };
        self.handle(ptr, FfiHandleKind::OutgoingBody, "request_body")
    }

    fn body_write_stream(&self, body: &mut OwnedHandle<'a>) -> Result<OwnedHandle<'a>, HostError> {
        let ptr = unsafe { (self.ops.body_write)(self.ops.ctx, body.ptr()) };
        self.handle(ptr, FfiHandleKind::OutputStream, "body_write")
    }

    fn write_and_flush(&self, stream: &mut OwnedHandle<'a>, bytes: &[u8]) -> Result<(), HostError> {
        let ok = unsafe {
            (self.ops.stream_write_and_flush)(
                self.ops.ctx,
                stream.ptr(),
                bytes.as_ptr(),
                bytes.len() as u32,
            )
        };
        self.check(ok, "stream_write_and_flush")
    }

    fn finish_body(&self, body: OwnedHandle<'a>) -> Result<(), HostError> {
        let ok = unsafe { (self.ops.body_finish)(self.ops.ctx, body.into_raw()) };
        self.check(ok, "body_finish")
    }

    fn send(&self, request: OwnedHandle<'a>) -> Result<OwnedHandle<'a>, HostError> {
        let ptr = unsafe { (self.ops.request_send)(self.ops.ctx, request.into_raw()) };
        self.handle(ptr, FfiHandleKind::Future, "request_send")
    }

    fn subscribe_future(&self, future: &OwnedHandle<'a>) -> OwnedHandle<'a> {
        let ptr = unsafe { (self.ops.future_subscribe)(self.ops.ctx, future.ptr()) };
        OwnedHandle::new(self.ops, ptr, FfiHandleKind::Pollable)
    }

    fn block(&self, pollable: &OwnedHandle<'a>) {
        unsafe { (self.ops.pollable_block)(self.ops.ctx, pollable.ptr()) };
    }

    fn future_result(
        &self,
        future: &OwnedHandle<'a>,
    ) -> Option<Result<OwnedHandle<'a>, HostError>> {
        let mut response: *mut c_void = std::ptr::null_mut();
        let status = unsafe { (self.ops.future_get)(self.ops.ctx, future.ptr(), &mut response) };
        match status {
            FfiFutureStatus::Ready => {
                Some(self.handle(response, FfiHandleKind::Response, "future_get"))
            }
            FfiFutureStatus::Pending => None,
            FfiFutureStatus::Error => {
                Some(Err(HostError::new("exchange resolved to an error")))
            }
        }
    }

    fn response_status(&self, response: &OwnedHandle<'a>) -> u16 {
        unsafe { (self.ops.response_status)(self.ops.ctx, response.ptr()) }
    }

    fn response_headers(&self, response: &OwnedHandle<'a>) -> Vec<(String, String)> {
        let count = unsafe { (self.ops.response_header_count)(self.ops.ctx, response.ptr()) };
        let mut headers = Vec::with_capacity(count as usize);
        for index in 0..count {
            let mut name = FfiStringView {
                ptr: std::ptr::null(),
                len: 0,
            };
            let mut value = FfiStringView {
                ptr: std::ptr::null(),
                len: 0,
            };
            let ok = unsafe {
                (self.ops.response_header_get)(
                    self.ops.ctx,
                    response.ptr(),
                    index,
                    &mut name,
                    &mut value,
                )
            };
            if !ok {
                break;
            }
            headers.push(unsafe { (name.to_string_lossy(), value.to_string_lossy()) });
        }
        headers
    }

    fn consume_body(&self, response: &mut OwnedHandle<'a>) -> Result<OwnedHandle<'a>, HostError> {
        let ptr = unsafe { (self.ops.response_consume)(self.ops.ctx, response.ptr()) };
        self.handle(ptr, FfiHandleKind::IncomingBody, "response_consume")
    }

    fn body_read_stream(&self, body: &mut OwnedHandle<'a>) -> Result<OwnedHandle<'a>, HostError> {
        let ptr = unsafe { (self.ops.body_stream)(self.ops.ctx, body.ptr()) };
        self.handle(ptr, FfiHandleKind::InputStream, "body_stream")
    }

    fn subscribe_input(&self, stream: &OwnedHandle<'a>) -> OwnedHandle<'a> {
        let ptr = unsafe { (self.ops.stream_subscribe)(self.ops.ctx, stream.ptr()) };
        OwnedHandle::new(self.ops, ptr, FfiHandleKind::Pollable)
    }

    fn read(&self, stream: &mut OwnedHandle<'a>, max: usize) -> ReadOutcome {
        let mut buf = vec![0u8; max];
        let mut read: u32 = 0;
        let status = unsafe {
            (self.ops.stream_read)(
                self.ops.ctx,
                stream.ptr(),
                buf.as_mut_ptr(),
                max as u32,
                &mut read,
            )
        };
        match status {
            FfiReadStatus::Data => {
                buf.truncate((read as usize).min(max));
                ReadOutcome::Data(buf)
            }
            FfiReadStatus::Closed => ReadOutcome::Closed,
            FfiReadStatus::Error => ReadOutcome::Err(HostError::new("stream_read failed")),
        }
    }
}

impl<'a> InboundHost for VtableHost<'a> {
    type IncomingRequest = OwnedHandle<'a>;
    type ResponseOutparam = OwnedHandle<'a>;
    type Headers = OwnedHandle<'a>;
    type OutgoingResponse = OwnedHandle<'a>;
    type OutgoingBody = OwnedHandle<'a>;
    type OutputStream = OwnedHandle<'a>;

    fn path_with_query(&self, request: &OwnedHandle<'a>) -> String {
        let ptr = unsafe { (self.ops.incoming_path_with_query)(self.ops.ctx, request.ptr()) };
        c_str_or_empty(ptr)
    }

    fn authority(&self, request: &OwnedHandle<'a>) -> String {
        let ptr = unsafe { (self.ops.incoming_authority)(self.ops.ctx, request.ptr()) };
        c_str_or_empty(ptr)
    }

    fn headers_from_list(
        &self,
        entries: &[(String, String)],
    ) -> Result<OwnedHandle<'a>, HostError> {
        self.build_headers(entries)
    }

    fn new_response(&self, headers: OwnedHandle<'a>) -> OwnedHandle<'a> {
        let ptr = unsafe { (self.ops.response_new)(self.ops.ctx, headers.into_raw()) };
        OwnedHandle::new(self.ops, ptr, FfiHandleKind::OutgoingResponse)
    }

    fn set_status(&self, response: &mut OwnedHandle<'a>, status: u16) -> Result<(), HostError> {
        let ok = unsafe { (self.ops.response_set_status)(self.ops.ctx, response.ptr(), status) };
        self.check(ok, "response_set_status")
    }

    fn response_body(&self, response: &mut OwnedHandle<'a>) -> Result<OwnedHandle<'a>, HostError> {
        let ptr = unsafe { (self.ops.response_body)(self.ops.ctx, response.ptr()) };
        self.handle(ptr, FfiHandleKind::OutgoingBody, "response_body")
    }

    fn body_write_stream(&self, body: &mut OwnedHandle<'a>) -> Result<OwnedHandle<'a>, HostError> {
        OutboundHost::body_write_stream(self, body)
    }

    fn write_and_flush(&self, stream: &mut OwnedHandle<'a>, bytes: &[u8]) -> Result<(), HostError> {
        OutboundHost::write_and_flush(self, stream, bytes)
    }

    fn finish_body(&self, body: OwnedHandle<'a>) -> Result<(), HostError> {
        OutboundHost::finish_body(self, body)
    }

    fn set_outparam(
        &self,
        outparam: OwnedHandle<'a>,
        response: Result<OwnedHandle<'a>, HostError>,
    ) {
        let (response, is_err) = match response {
            Ok(handle) => (handle.into_raw(), false),
            Err(_) => (std::ptr::null_mut(), true),
        };
        unsafe { (self.ops.outparam_set)(self.ops.ctx, outparam.into_raw(), response, is_err) };
    }
}

fn c_str_or_empty(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}
