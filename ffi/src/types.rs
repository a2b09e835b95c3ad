//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Requests are opaque: C builds them through `fanout_request_*` calls and
//! never sees their layout. Responses are plain data the C side reads
//! directly: `*mut c_char` for text, pointer plus length for bytes and arrays,
//! and tagged enums with explicit discriminants. Conversion functions live
//! here to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use fanout_core::{DispatchError, HttpRequest, HttpResponse};

/// Opaque handle to a `Client`.
pub struct FfiClient {
    pub(crate) inner: fanout_core::Client,
}

/// Opaque request under construction.
pub struct FfiRequest {
    pub(crate) method: String,
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl FfiRequest {
    pub(crate) fn to_core(&self) -> HttpRequest {
        self.headers
            .iter()
            .fold(HttpRequest::new(&self.method, &self.url), |req, (name, value)| {
                req.with_header(name, value)
            })
            .with_body(self.body.clone())
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One header value. A header repeated in the response appears once per value.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// A response as C-compatible plain data. `body` is not NUL-terminated and
/// may contain NUL bytes; read exactly `body_len` bytes.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub reason: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut u8,
    pub body_len: usize,
}

impl FfiHttpResponse {
    pub(crate) fn from_core(resp: HttpResponse) -> Self {
        let status = resp.status();
        let reason = c_string(resp.reason());
        let headers: Vec<FfiHeader> = resp
            .headers()
            .iter()
            .map(|(k, v)| FfiHeader {
                key: c_string(k),
                value: c_string(v),
            })
            .collect();
        let (headers, headers_len) = into_raw_slice(headers);
        let (body, body_len) = into_raw_slice(resp.into_body().into_bytes().to_vec());

        FfiHttpResponse {
            status,
            reason,
            headers,
            headers_len: headers_len as u32,
            body,
            body_len,
        }
    }

    /// Release everything this response points to.
    ///
    /// # Safety
    /// The response must have been built by `from_core` and not released yet.
    pub(crate) unsafe fn release(self) {
        free_c_string(self.reason);
        let headers = unsafe { from_raw_slice(self.headers, self.headers_len as usize) };
        for h in headers {
            free_c_string(h.key);
            free_c_string(h.value);
        }
        drop(unsafe { from_raw_slice(self.body, self.body_len) });
    }
}

/// Responses of `fanout_send_requests`, in input order.
#[repr(C)]
pub struct FfiResponseList {
    pub items: *mut FfiHttpResponse,
    pub len: u32,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    Transport = 1,
    DeadlineElapsed = 2,
    InvalidArgument = 3,
    Multiplex = 4,
    Panic = 5,
    NullArg = 6,
}

/// Tag that tells `fanout_free_result` what `FfiResult::data` points to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiDataTag {
    None = 0,
    Response = 1,
    ResponseList = 2,
}

/// Result envelope for every send operation.
///
/// On success `error_code` is `Ok`, `error_message` is null, and `data`
/// points to the payload tagged by `data_tag`.
/// On failure `error_code` describes the category, `error_message` is a
/// human-readable C string, `http_status` is the status the failing
/// transfer reached (0 if none), and `data` is null.
#[repr(C)]
pub struct FfiResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub data_tag: FfiDataTag,
    pub data: *mut c_void,
}

impl FfiResult {
    pub(crate) fn ok_response(resp: HttpResponse) -> *mut Self {
        let status = resp.status();
        let data = Box::into_raw(Box::new(FfiHttpResponse::from_core(resp)));
        Self::ok(FfiDataTag::Response, status, data as *mut c_void)
    }

    pub(crate) fn ok_response_list(responses: Vec<HttpResponse>) -> *mut Self {
        let items: Vec<FfiHttpResponse> =
            responses.into_iter().map(FfiHttpResponse::from_core).collect();
        let (items, len) = into_raw_slice(items);
        let list = Box::new(FfiResponseList {
            items,
            len: len as u32,
        });
        Self::ok(FfiDataTag::ResponseList, 0, Box::into_raw(list) as *mut c_void)
    }

    fn ok(data_tag: FfiDataTag, http_status: u16, data: *mut c_void) -> *mut Self {
        Box::into_raw(Box::new(FfiResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            http_status,
            data_tag,
            data,
        }))
    }

    pub(crate) fn from_error(err: DispatchError) -> *mut Self {
        let (error_code, http_status) = match &err {
            DispatchError::Transport(failure) => {
                (FfiErrorCode::Transport, failure.status.unwrap_or(0))
            }
            DispatchError::DeadlineElapsed(_) => (FfiErrorCode::DeadlineElapsed, 0),
            DispatchError::InvalidBatchSize | DispatchError::DuplicateKey(_) => {
                (FfiErrorCode::InvalidArgument, 0)
            }
            DispatchError::Multiplex(_) => (FfiErrorCode::Multiplex, 0),
        };
        Self::error(error_code, http_status, &err.to_string())
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::error(FfiErrorCode::NullArg, 0, &format!("null argument: {name}"))
    }

    pub(crate) fn invalid(msg: &str) -> *mut Self {
        Self::error(FfiErrorCode::InvalidArgument, 0, msg)
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::error(FfiErrorCode::Panic, 0, msg)
    }

    fn error(error_code: FfiErrorCode, http_status: u16, msg: &str) -> *mut Self {
        Box::into_raw(Box::new(FfiResult {
            error_code,
            error_message: c_string(msg),
            http_status,
            data_tag: FfiDataTag::None,
            data: std::ptr::null_mut(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Allocation helpers
// ---------------------------------------------------------------------------

/// Heap C string. Interior NUL bytes are dropped.
pub(crate) fn c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

pub(crate) fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Leak `items` as a boxed slice. An empty vector becomes a null pointer.
fn into_raw_slice<T>(items: Vec<T>) -> (*mut T, usize) {
    if items.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let len = items.len();
    (Box::into_raw(items.into_boxed_slice()) as *mut T, len)
}

/// Take back a slice leaked by `into_raw_slice`.
///
/// # Safety
/// `ptr` and `len` must come from one `into_raw_slice` call.
pub(crate) unsafe fn from_raw_slice<T>(ptr: *mut T, len: usize) -> Vec<T> {
    if ptr.is_null() {
        return Vec::new();
    }
    unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) }.into_vec()
}
