//! The seam between the dispatcher and the engine that moves bytes.
//!
//! # Design
//! A `Transport` opens one `TransferHandle` per operation. The handle owns
//! whatever the engine needs for that transfer (socket, connection task) and
//! releases it when dropped, so the dispatcher can guarantee release on every
//! exit path by simply letting operations go out of scope.
//!
//! `perform` returns a future that is driven on the dispatcher's loop. While
//! it runs, the handle feeds raw header lines, status line first, into the
//! operation's `HeaderAccumulator`. The futures need not be `Send`: every
//! handle of a batch is polled from the same thread.

use std::fmt;
use std::future::Future;

use bytes::Bytes;

use crate::headers::HeaderAccumulator;
use crate::http::HttpRequest;
use crate::options::EffectiveOptions;

/// Identity of one transfer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a handle is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    pub uri: String,
    /// Flattened `Name: value` lines, one per header value.
    pub header_lines: Vec<String>,
    /// `None` for an empty request body: no body frame is attached.
    pub body: Option<Bytes>,
    pub options: EffectiveOptions,
}

impl TransferSpec {
    pub fn new(request: &HttpRequest, options: EffectiveOptions) -> Self {
        let body = if request.body().is_empty() {
            None
        } else {
            Some(request.body().clone().into_bytes())
        };
        Self {
            uri: request.uri().to_string(),
            header_lines: request.headers().lines(),
            body,
            options,
        }
    }

    /// Method to send, after option merging.
    pub fn method(&self) -> &str {
        self.options.method()
    }
}

/// Raw outcome of a successful transfer. Headers travel separately through
/// the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub status: u16,
    pub body: Bytes,
}

/// Terminal failure of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Status code, if the engine got that far.
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// An engine capable of opening transfer handles.
pub trait Transport {
    type Handle: TransferHandle;

    /// Configure a handle for one transfer. Nothing is sent until `perform`.
    fn open(&self, id: HandleId, spec: TransferSpec) -> Self::Handle;
}

/// One configured transfer.
pub trait TransferHandle {
    /// Run the transfer to completion, streaming header lines into `headers`.
    fn perform<'a>(
        &'a mut self,
        headers: &'a mut HeaderAccumulator,
    ) -> impl Future<Output = Result<Transfer, TransportError>> + 'a;
}
