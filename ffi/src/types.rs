//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! tagged enums with explicit discriminants. Conversion functions live here
//! to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::CString;
use std::os::raw::c_char;

use wasi_http_core::{ExchangeError, Method, Scheme};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum. Discriminants match the core ordering.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiMethod {
    Get = 0,
    Head = 1,
    Post = 2,
    Put = 3,
    Delete = 4,
    Connect = 5,
    Options = 6,
    Trace = 7,
    Patch = 8,
}

impl From<FfiMethod> for Method {
    fn from(m: FfiMethod) -> Self {
        match m {
            FfiMethod::Get => Method::Get,
            FfiMethod::Head => Method::Head,
            FfiMethod::Post => Method::Post,
            FfiMethod::Put => Method::Put,
            FfiMethod::Delete => Method::Delete,
            FfiMethod::Connect => Method::Connect,
            FfiMethod::Options => Method::Options,
            FfiMethod::Trace => Method::Trace,
            FfiMethod::Patch => Method::Patch,
        }
    }
}

/// URL scheme as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiScheme {
    Http = 0,
    Https = 1,
}

impl From<FfiScheme> for Scheme {
    fn from(s: FfiScheme) -> Self {
        match s {
            FfiScheme::Http => Scheme::Http,
            FfiScheme::Https => Scheme::Https,
        }
    }
}

// ---------------------------------------------------------------------------
// Result codes
// ---------------------------------------------------------------------------

/// Result of `wasi_http_request` and `wasi_http_handle`.
///
/// 0 is success; 1 through 12 identify the exchange step that failed;
/// `NullArg` and `Panic` cover boundary misuse and caught panics.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiExchangeCode {
    Ok = 0,
    FutureGet = 1,
    ResponseError = 2,
    BodyConsume = 3,
    RequestBuild = 4,
    Send = 5,
    BodyRead = 6,
    OutputStream = 7,
    HeaderCreate = 8,
    InputStream = 9,
    BodyFinish = 10,
    BodyWrite = 11,
    ResponseBuild = 12,
    NullArg = 13,
    Panic = 14,
}

impl From<&ExchangeError> for FfiExchangeCode {
    fn from(err: &ExchangeError) -> Self {
        match err {
            ExchangeError::FutureGet => FfiExchangeCode::FutureGet,
            ExchangeError::Response(_) => FfiExchangeCode::ResponseError,
            ExchangeError::BodyConsume(_) => FfiExchangeCode::BodyConsume,
            ExchangeError::RequestBuild(_) => FfiExchangeCode::RequestBuild,
            ExchangeError::Send(_) => FfiExchangeCode::Send,
            ExchangeError::BodyRead(_) => FfiExchangeCode::BodyRead,
            ExchangeError::OutputStream(_) => FfiExchangeCode::OutputStream,
            ExchangeError::HeaderCreate(_) => FfiExchangeCode::HeaderCreate,
            ExchangeError::InputStream(_) => FfiExchangeCode::InputStream,
            ExchangeError::BodyFinish(_) => FfiExchangeCode::BodyFinish,
            ExchangeError::BodyWrite(_) => FfiExchangeCode::BodyWrite,
            ExchangeError::ResponseBuild(_) => FfiExchangeCode::ResponseBuild,
        }
    }
}

// ---------------------------------------------------------------------------
// Borrowed views (host callbacks read these, never free them)
// ---------------------------------------------------------------------------

/// A borrowed byte string. Not NUL-terminated; `len` is authoritative.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiStringView {
    pub ptr: *const u8,
    pub len: u32,
}

impl FfiStringView {
    pub(crate) fn from_str(s: &str) -> Self {
        FfiStringView {
            ptr: s.as_ptr(),
            len: s.len() as u32,
        }
    }

    /// Copy the view into an owned `String`, lossy on invalid UTF-8.
    ///
    /// # Safety
    /// `ptr` must point to `len` readable bytes.
    pub(crate) unsafe fn to_string_lossy(self) -> String {
        if self.ptr.is_null() || self.len == 0 {
            return String::new();
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len as usize) };
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// A borrowed header entry.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiHeaderView {
    pub name: FfiStringView,
    pub value: FfiStringView,
}

// ---------------------------------------------------------------------------
// Inbound handler surface
// ---------------------------------------------------------------------------

/// The request view passed to a C handler callback. Fields are borrowed
/// NUL-terminated strings valid only for the duration of the callback.
#[repr(C)]
pub struct FfiHttpRequest {
    pub path_query: *const c_char,
    pub authority: *const c_char,
}

/// The reply a C handler callback fills in.
///
/// `body` points to a zeroed buffer of `body_max_len` bytes owned by the
/// library; the callback writes a NUL-terminated string into it. Writes are
/// truncated to the capacity the adapter was given.
#[repr(C)]
pub struct FfiReply {
    pub status_code: u16,
    pub body: *mut c_char,
    pub body_max_len: u32,
}

// ---------------------------------------------------------------------------
// Outbound response surface
// ---------------------------------------------------------------------------

/// A single response header as a pair of owned C strings.
#[repr(C)]
pub struct FfiHeader {
    pub name: *mut c_char,
    pub value: *mut c_char,
}

/// A list of response headers allocated by the library.
///
/// Freed with `wasi_http_response_headers_free`; both names and values are
/// released.
#[repr(C)]
pub struct FfiHeaderList {
    pub entries: *mut FfiHeader,
    pub len: u32,
}

impl FfiHeaderList {
    pub(crate) fn empty() -> Self {
        FfiHeaderList {
            entries: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Allocate an owned list from (name, value) pairs. Interior NUL bytes
    /// cannot be represented in a C string and abort the conversion by
    /// panic, which the boundary reports as `Panic`.
    pub(crate) fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        if pairs.is_empty() {
            return FfiHeaderList::empty();
        }
        let len = pairs.len() as u32;
        let mut entries: Box<[FfiHeader]> = pairs
            .into_iter()
            .map(|(name, value)| FfiHeader {
                name: CString::new(name).unwrap().into_raw(),
                value: CString::new(value).unwrap().into_raw(),
            })
            .collect();
        let ptr = entries.as_mut_ptr();
        std::mem::forget(entries);
        FfiHeaderList { entries: ptr, len }
    }

    /// Release the entry array and every C string in it.
    ///
    /// # Safety
    /// Must only be called on a list produced by `from_pairs`, exactly once.
    pub(crate) unsafe fn free(self) {
        if self.entries.is_null() || self.len == 0 {
            return;
        }
        let entries: Box<[FfiHeader]> = unsafe {
            Box::from_raw(std::slice::from_raw_parts_mut(
                self.entries,
                self.len as usize,
            ))
        };
        for entry in entries.iter() {
            if !entry.name.is_null() {
                drop(unsafe { CString::from_raw(entry.name) });
            }
            if !entry.value.is_null() {
                drop(unsafe { CString::from_raw(entry.value) });
            }
        }
    }
}

/// The outcome of `wasi_http_request`, filled into caller-owned storage.
///
/// The caller provides `body` (a buffer of `body_max_len` bytes) before the
/// call; the library fills `status_code`, `truncated`, `body_len`, writes a
/// NUL-terminated body prefix, and allocates `headers`. One byte of the
/// buffer is reserved for the terminator, so at most `body_max_len - 1` body
/// bytes are stored.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status_code: u16,
    pub truncated: bool,
    pub body: *mut c_char,
    pub body_max_len: u32,
    pub body_len: u32,
    pub headers: FfiHeaderList,
}
