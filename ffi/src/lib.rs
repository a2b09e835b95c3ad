//! C-ABI wrapper around `fanout-core`.
//!
//! # Overview
//! Exposes the blocking client through `extern "C"` functions so any language
//! with a C FFI can send one request or a whole batch and read the responses
//! without knowing anything about the Rust async runtime underneath.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Requests are opaque handles built with `fanout_request_new` and
//!   `fanout_request_add_header`; they can be sent any number of times.
//! - A single `FfiResult` envelope with `FfiDataTag` + `void* data`
//!   conveys success payloads and errors uniformly.
//! - The C caller owns all returned pointers and must call the matching
//!   `fanout_*_free` / `fanout_free_*` function to release them.
//! - Send calls block the calling thread and must not be made from a thread
//!   that is itself driving a tokio runtime.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use fanout_core::{Client, ClientConfig};

use types::*;

/// Borrow a C string as `&str`. Invalid UTF-8 yields `None`.
fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client from a TOML configuration string.
///
/// A null `config_toml` uses the default configuration. Returns null if the
/// configuration does not parse or if an internal panic occurs.
/// The caller must free the returned pointer with `fanout_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_client_new(config_toml: *const c_char) -> *mut FfiClient {
    catch_unwind(|| {
        let config = if config_toml.is_null() {
            ClientConfig::default()
        } else {
            let Some(text) = str_arg(config_toml) else {
                return std::ptr::null_mut();
            };
            match ClientConfig::from_toml_str(text) {
                Ok(config) => config,
                Err(_) => return std::ptr::null_mut(),
            }
        };
        Box::into_raw(Box::new(FfiClient {
            inner: Client::new(config),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `fanout_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(client) });
        });
    }
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

/// Create a request. `body` may be null when `body_len` is 0; it is copied
/// and may contain NUL bytes.
///
/// Returns null if `method` or `url` is null or not UTF-8, or if `body` is
/// null while `body_len` is not 0.
/// The caller must free the returned pointer with `fanout_request_free`.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_request_new(
    method: *const c_char,
    url: *const c_char,
    body: *const u8,
    body_len: usize,
) -> *mut FfiRequest {
    catch_unwind(|| {
        if method.is_null() || url.is_null() || (body.is_null() && body_len > 0) {
            return std::ptr::null_mut();
        }
        let (Some(method), Some(url)) = (str_arg(method), str_arg(url)) else {
            return std::ptr::null_mut();
        };
        let body = if body_len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(body, body_len) }.to_vec()
        };
        Box::into_raw(Box::new(FfiRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body,
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Append one header value to a request. Calling it twice with the same name
/// sends the header twice.
///
/// Returns false if any argument is null or not UTF-8.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_request_add_header(
    request: *mut FfiRequest,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if request.is_null() || name.is_null() || value.is_null() {
            return false;
        }
        let (Some(name), Some(value)) = (str_arg(name), str_arg(value)) else {
            return false;
        };
        let request = unsafe { &mut *request };
        request.headers.push((name.to_string(), value.to_string()));
        true
    }))
    .unwrap_or(false)
}

/// Describe a request as `METHOD uri`. Returns null if `request` is null.
/// The caller must free the returned string with `fanout_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_request_describe(request: *const FfiRequest) -> *mut c_char {
    catch_unwind(|| {
        if request.is_null() {
            return std::ptr::null_mut();
        }
        let request = unsafe { &*request };
        c_string(&request.to_core().to_string())
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a request created by `fanout_request_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_request_free(request: *mut FfiRequest) {
    if !request.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(request) });
        });
    }
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// Send one request and wait for its response.
///
/// Returns a result with `data_tag = Response` on success. A 4xx or 5xx
/// status is a successful result; only transport failures are errors.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_send_request(
    client: *const FfiClient,
    request: *const FfiRequest,
) -> *mut FfiResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiResult::null_arg("client");
        }
        if request.is_null() {
            return FfiResult::null_arg("request");
        }
        let client = unsafe { &*client };
        let request = unsafe { &*request };
        match client.inner.send_request(request.to_core()) {
            Ok(resp) => FfiResult::ok_response(resp),
            Err(e) => FfiResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiResult::panic("panic in fanout_send_request"))
}

/// Send `len` requests in batches of `batch_size` and wait for all of them.
///
/// A `batch_size` of 0 uses the client's configured batch size. Returns a
/// result with `data_tag = ResponseList` whose items are in input order. If
/// any request fails in the transport, the result is that failure and no
/// responses are returned.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_send_requests(
    client: *const FfiClient,
    requests: *const *const FfiRequest,
    len: usize,
    batch_size: usize,
) -> *mut FfiResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiResult::null_arg("client");
        }
        if requests.is_null() && len > 0 {
            return FfiResult::null_arg("requests");
        }
        let client = unsafe { &*client };
        let pointers: &[*const FfiRequest] = if len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(requests, len) }
        };
        if let Some(i) = pointers.iter().position(|p| p.is_null()) {
            return FfiResult::invalid(&format!("request {i} is null"));
        }
        let batch = pointers
            .iter()
            .map(|&p| unsafe { &*p }.to_core())
            .collect();

        let batch_size = if batch_size == 0 {
            client.inner.batch_size()
        } else {
            batch_size
        };
        match client.inner.send_requests_with(batch, batch_size) {
            Ok(responses) => FfiResult::ok_response_list(responses),
            Err(e) => FfiResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiResult::panic("panic in fanout_send_requests"))
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiResult` returned by any `fanout_send_*` function.
/// Safe to call with null. Uses `data_tag` to determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_free_result(result: *mut FfiResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        free_c_string(result.error_message);
        if result.data.is_null() {
            return;
        }
        match result.data_tag {
            FfiDataTag::Response => {
                let resp = unsafe { Box::from_raw(result.data as *mut FfiHttpResponse) };
                unsafe { resp.release() };
            }
            FfiDataTag::ResponseList => {
                let list = unsafe { Box::from_raw(result.data as *mut FfiResponseList) };
                for resp in unsafe { from_raw_slice(list.items, list.len as usize) } {
                    unsafe { resp.release() };
                }
            }
            FfiDataTag::None => {}
        }
    });
}

/// Free a string returned by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fanout_free_string(s: *mut c_char) {
    let _ = catch_unwind(|| free_c_string(s));
}
