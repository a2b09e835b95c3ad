//! `Transport` implementation over hyper's HTTP/1.1 client connection.
//!
//! Each handle opens its own TCP connection, performs the HTTP/1.1 handshake
//! and spawns the connection task on the loop that drives it. There is no
//! pooling; the connection is torn down when the handle is dropped. Only
//! plain `http://` URIs are supported.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION, USER_AGENT};
use http::uri::PathAndQuery;
use http::{Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper_util::rt::TokioIo;
use std::future::Future;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::headers::HeaderAccumulator;
use crate::transport::{HandleId, TransferHandle, TransferSpec, Transfer, Transport, TransportError};

const DEFAULT_USER_AGENT: &str = concat!("fanout/", env!("CARGO_PKG_VERSION"));

/// Opens one hyper connection per transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperTransport;

impl HyperTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for HyperTransport {
    type Handle = HyperHandle;

    fn open(&self, id: HandleId, spec: TransferSpec) -> HyperHandle {
        HyperHandle {
            id,
            spec,
            connection: None,
            status: None,
        }
    }
}

/// A configured transfer. Dropping it aborts its connection task.
#[derive(Debug)]
pub struct HyperHandle {
    id: HandleId,
    spec: TransferSpec,
    connection: Option<JoinHandle<()>>,
    status: Option<u16>,
}

impl Drop for HyperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.connection.take() {
            task.abort();
        }
    }
}

impl TransferHandle for HyperHandle {
    fn perform<'a>(
        &'a mut self,
        headers: &'a mut HeaderAccumulator,
    ) -> impl Future<Output = Result<Transfer, TransportError>> + 'a {
        async move {
            let Some(limit) = self.spec.options.timeout() else {
                return self.run(headers).await;
            };
            let outcome = tokio::time::timeout(limit, self.run(headers)).await;
            match outcome {
                Ok(result) => result,
                Err(_) => Err(self.error(format!("operation timed out after {limit:?}"))),
            }
        }
    }
}

impl HyperHandle {
    fn error(&self, message: String) -> TransportError {
        TransportError {
            message,
            status: self.status,
        }
    }

    async fn run(&mut self, headers: &mut HeaderAccumulator) -> Result<Transfer, TransportError> {
        let mut uri: Uri = self
            .spec
            .uri
            .parse()
            .map_err(|e| TransportError::new(format!("invalid uri {:?}: {e}", self.spec.uri)))?;
        let mut method = Method::from_bytes(self.spec.method().as_bytes())
            .map_err(|e| TransportError::new(format!("invalid method {:?}: {e}", self.spec.method())))?;
        let mut body = self.spec.body.clone();
        let origin = uri.authority().cloned();
        let mut hop = Hop::default();
        let mut redirects = 0;

        loop {
            let response = self.send(&method, &uri, body.clone(), hop).await?;
            let status = response.status();
            self.status = Some(status.as_u16());

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let (true, true, Some(location)) =
                (self.spec.options.follow_redirects(), status.is_redirection(), location)
            {
                if redirects >= self.spec.options.max_redirects() {
                    return Err(self.error(format!(
                        "maximum of {} redirects followed",
                        self.spec.options.max_redirects()
                    )));
                }
                redirects += 1;
                let next = resolve_location(&uri, &location)?;
                debug!(handle = %self.id, status = status.as_u16(), from = %uri, to = %next, "following redirect");
                if rewrites_to_get(status) && method != Method::HEAD {
                    method = Method::GET;
                    body = None;
                    hop.body_dropped = true;
                }
                hop.cross_origin = next.authority() != origin.as_ref();
                uri = next;
                continue;
            }

            let head = head_lines(&response);
            for line in &head {
                headers.on_header_line(line.as_bytes());
            }
            headers.on_header_line(b"\r\n");

            let content = response
                .into_body()
                .collect()
                .await
                .map_err(|e| self.error(format!("failed to read body: {e}")))?
                .to_bytes();

            return Ok(Transfer {
                status: status.as_u16(),
                body: self.shape_body(&head, content),
            });
        }
    }

    async fn send(
        &mut self,
        method: &Method,
        uri: &Uri,
        body: Option<Bytes>,
        hop: Hop,
    ) -> Result<Response<Incoming>, TransportError> {
        let scheme = uri.scheme_str().unwrap_or("http");
        if scheme != "http" {
            return Err(TransportError::new(format!("unsupported scheme {scheme:?} in {uri}")));
        }
        let host = uri
            .host()
            .ok_or_else(|| TransportError::new(format!("missing host in {uri}")))?;
        let port = uri.port_u16().unwrap_or(80);
        let addr = (host.trim_start_matches('[').trim_end_matches(']'), port);

        let stream = match self.spec.options.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| self.error(format!("connect to {host}:{port} timed out after {limit:?}")))?,
            None => TcpStream::connect(addr).await,
        }
        .map_err(|e| self.error(format!("connect to {host}:{port} failed: {e}")))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| self.error(format!("handshake with {host}:{port} failed: {e}")))?;

        let id = self.id;
        let task = tokio::spawn(async move {
            if let Err(e) = conn.await {
                trace!(handle = %id, error = %e, "connection closed with error");
            }
        });
        if let Some(previous) = self.connection.replace(task) {
            previous.abort();
        }

        let request = self.build_request(method, uri, host, body, hop)?;
        sender
            .send_request(request)
            .await
            .map_err(|e| self.error(format!("request failed: {e}")))
    }

    fn build_request(
        &self,
        method: &Method,
        uri: &Uri,
        host: &str,
        body: Option<Bytes>,
        hop: Hop,
    ) -> Result<Request<Full<Bytes>>, TransportError> {
        let target = uri.path_and_query().map_or("/", PathAndQuery::as_str);
        let mut builder = Request::builder().method(method.clone()).uri(target);
        for line in &self.spec.header_lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if hop.skips(name) {
                trace!(handle = %self.id, name, "not replaying header after redirect");
                continue;
            }
            builder = builder.header(name, value.trim());
        }

        let present = |name: HeaderName| builder.headers_ref().is_some_and(|h| h.contains_key(name));
        let (has_host, has_agent) = (present(HOST), present(USER_AGENT));
        if !has_host {
            let authority = uri.authority().map_or(host, |a| a.as_str());
            builder = builder.header(HOST, authority);
        }
        if !has_agent {
            let agent = self.spec.options.user_agent().unwrap_or(DEFAULT_USER_AGENT);
            builder = builder.header(USER_AGENT, agent);
        }

        builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| self.error(format!("invalid request: {e}")))
    }

    /// Apply `IncludeHead` and `ReturnBody` to the received content.
    fn shape_body(&self, head: &[String], content: Bytes) -> Bytes {
        let options = &self.spec.options;
        if !options.include_head() {
            return if options.return_body() { content } else { Bytes::new() };
        }
        let mut out = BytesMut::new();
        for line in head {
            out.extend_from_slice(line.as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if options.return_body() {
            out.extend_from_slice(&content);
        }
        out.freeze()
    }
}

/// How a redirected request differs from the original one.
#[derive(Debug, Clone, Copy, Default)]
struct Hop {
    /// The target authority is no longer the one first requested.
    cross_origin: bool,
    /// A 301/302/303 turned the request into a body-less GET.
    body_dropped: bool,
}

impl Hop {
    /// Caller headers that must not be replayed on this hop.
    fn skips(self, name: &str) -> bool {
        let is = |other: HeaderName| name.eq_ignore_ascii_case(other.as_str());
        (self.cross_origin && is(HOST))
            || (self.body_dropped && (is(CONTENT_TYPE) || is(CONTENT_LENGTH)))
    }
}

/// Status line followed by one line per header value, as received. The
/// reason phrase is the server's own when it differs from the canonical one.
fn head_lines(response: &Response<Incoming>) -> Vec<String> {
    let status = response.status();
    let reason = match response.extensions().get::<ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => status.canonical_reason().unwrap_or("").to_string(),
    };
    let mut lines = Vec::with_capacity(response.headers().len() + 1);
    lines.push(format!(
        "{:?} {} {}\r\n",
        response.version(),
        status.as_u16(),
        reason
    ));
    for (name, value) in response.headers() {
        lines.push(format!("{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes())));
    }
    lines
}

/// 301, 302 and 303 turn the follow-up into a body-less GET.
fn rewrites_to_get(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
    )
}

/// Resolve a `Location` header against the URI that produced it.
fn resolve_location(base: &Uri, location: &str) -> Result<Uri, TransportError> {
    let invalid = |e: &dyn std::fmt::Display| {
        TransportError::new(format!("invalid redirect location {location:?}: {e}"))
    };
    let parsed: Uri = location.parse().map_err(|e| invalid(&e))?;
    if parsed.scheme().is_some() {
        return Ok(parsed);
    }

    let path = if location.starts_with('/') {
        location.to_string()
    } else {
        let base_path = base.path();
        let dir = &base_path[..base_path.rfind('/').map_or(0, |i| i + 1)];
        format!("{dir}{location}")
    };
    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(path.parse::<PathAndQuery>().map_err(|e| invalid(&e))?);
    Uri::from_parts(parts).map_err(|e| invalid(&e))
}
