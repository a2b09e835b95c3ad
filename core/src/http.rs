//! Request and response message types.
//!
//! # Design
//! These are plain data. An `HttpRequest` is built by the caller and only read
//! by the dispatcher; an `HttpResponse` is assembled by the dispatcher through
//! `ResponseBuilder` as the status line, header lines and body of a transfer
//! arrive, and is read-only once handed back.
//!
//! Bodies wrap `bytes::Bytes` so a response body can be handed over from the
//! transport without copying.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;

use crate::headers::Headers;
use crate::types::RequestOptions;

/// Byte content of a request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body(Bytes);

impl Body {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: String,
    uri: String,
    headers: Headers,
    body: Body,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: Headers::new(),
            body: Body::empty(),
        }
    }

    /// Build a request from a method, a URL and optional body and headers.
    pub fn from_parts(method: &str, url: &str, options: RequestOptions) -> Self {
        let mut request = Self::new(method, url);
        for (name, values) in options.headers {
            for value in values.into_values() {
                request.headers.append(name.clone(), value);
            }
        }
        if let Some(body) = options.body {
            request.body = body;
        }
        request
    }

    /// Append a header value. Repeated names keep every value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

/// A completed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    reason: String,
    headers: Headers,
    body: Body,
}

impl HttpResponse {
    /// Start building a response with the given status code.
    pub fn builder(status: u16) -> ResponseBuilder {
        ResponseBuilder {
            inner: HttpResponse {
                status,
                reason: String::new(),
                headers: Headers::new(),
                body: Body::empty(),
            },
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase from the status line. Empty when the server sent none.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Incremental constructor for `HttpResponse`.
#[derive(Debug)]
pub struct ResponseBuilder {
    inner: HttpResponse,
}

impl ResponseBuilder {
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.inner.reason = reason.into();
        self
    }

    /// Add one header value. Never overwrites earlier values of the same name.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.inner.body = body.into();
        self
    }

    pub fn build(self) -> HttpResponse {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeaderValues;

    #[test]
    fn from_parts_builds_post_with_json_body() {
        let options = RequestOptions::new()
            .body("{}")
            .header("Content-Type", "application/json");
        let req = HttpRequest::from_parts("POST", "https://x/y", options);

        assert_eq!(req.method(), "POST");
        assert_eq!(req.uri(), "https://x/y");
        assert_eq!(
            req.headers().iter().collect::<Vec<_>>(),
            [("Content-Type", "application/json")]
        );
        assert_eq!(req.body().as_bytes(), b"{}");
    }

    #[test]
    fn from_parts_expands_multi_valued_headers() {
        let options = RequestOptions::new().header(
            "Accept",
            HeaderValues::Many(vec!["text/html".to_string(), "application/json".to_string()]),
        );
        let req = HttpRequest::from_parts("GET", "http://x/", options);
        assert_eq!(req.headers().get_all("accept"), ["text/html", "application/json"]);
        assert!(req.body().is_empty());
    }

    #[test]
    fn builder_preserves_repeated_headers() {
        let resp = HttpResponse::builder(200)
            .reason("OK")
            .add_header("Set-Cookie", "a=1")
            .add_header("Set-Cookie", "b=2")
            .body("hello")
            .build();

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.reason(), "OK");
        assert_eq!(resp.headers().get_all("set-cookie"), ["a=1", "b=2"]);
        assert_eq!(resp.body().text(), "hello");
        assert!(resp.is_success());
    }

    #[test]
    fn builder_defaults_to_empty_reason_and_body() {
        let resp = HttpResponse::builder(404).build();
        assert_eq!(resp.reason(), "");
        assert!(resp.body().is_empty());
        assert!(!resp.is_success());
    }

    #[test]
    fn request_display_shows_method_and_uri() {
        let req = HttpRequest::new("DELETE", "http://x/items/1");
        assert_eq!(req.to_string(), "DELETE http://x/items/1");
    }

    #[test]
    fn body_text_is_lossy() {
        let body = Body::from(vec![b'o', b'k', 0xff]);
        assert_eq!(body.len(), 3);
        assert_eq!(body.text(), "ok\u{fffd}");
    }
}
