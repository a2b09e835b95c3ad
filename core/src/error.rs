//! Error types for dispatching requests.
//!
//! # Design
//! `TransportFailure` is the failure of one operation and keeps the request
//! that caused it, so a caller who sent a hundred requests can tell which one
//! broke. `DispatchError` wraps it together with the failures that are not
//! attributable to any single operation.

use std::time::Duration;

use crate::http::HttpRequest;
use crate::transport::TransportError;

/// One operation failed in the transport.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{request}: {message}")]
pub struct TransportFailure {
    pub message: String,
    pub request: HttpRequest,
    /// Status code, if the transport produced one before failing.
    pub status: Option<u16>,
}

impl TransportFailure {
    pub fn new(error: TransportError, request: HttpRequest) -> Self {
        Self {
            message: error.message,
            request,
            status: error.status,
        }
    }
}

/// Errors returned by the client and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// An operation failed. In a batch, this is the first failed operation
    /// in input order and every other result of the call is discarded.
    #[error("transport failure: {0}")]
    Transport(Box<TransportFailure>),

    /// The execution context shared by a batch could not be created.
    #[error("execution context failed: {0}")]
    Multiplex(#[source] std::io::Error),

    /// The batch deadline elapsed before every operation completed.
    #[error("batch deadline of {0:?} elapsed")]
    DeadlineElapsed(Duration),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("duplicate request key {0}")]
    DuplicateKey(String),
}

impl DispatchError {
    /// The failed operation, if this error is attributable to one.
    pub fn transport_failure(&self) -> Option<&TransportFailure> {
        match self {
            DispatchError::Transport(failure) => Some(&**failure),
            _ => None,
        }
    }
}

impl From<TransportFailure> for DispatchError {
    fn from(failure: TransportFailure) -> Self {
        DispatchError::Transport(Box::new(failure))
    }
}

/// Errors loading a `ClientConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("batch_size must be at least 1")]
    InvalidBatchSize,
}
