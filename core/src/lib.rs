//! Blocking HTTP client with ordered, batched concurrent dispatch.
//!
//! # Overview
//! Sends a single request, or a large set of requests in bounded batches
//! whose members run concurrently on one loop. Responses always come back in
//! input order, whatever order the transfers finished in.
//!
//! # Design
//! - `Client` is the public surface; `Dispatcher` holds the batching logic.
//! - The byte-moving engine sits behind the `Transport` trait. `HyperTransport`
//!   is the default; tests plug in fakes.
//! - Every operation owns its transport handle and its `HeaderAccumulator`;
//!   both are released as soon as the operation settles.
//! - Per-request transport options are the merge of the client's extra
//!   options and request-derived defaults, with the precedence spelled out in
//!   `options`.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod headers;
pub mod http;
pub mod hyper_transport;
pub mod options;
pub mod transport;
pub mod types;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_BATCH_SIZE};
pub use dispatch::{partition, Dispatcher};
pub use error::{ConfigError, DispatchError, TransportFailure};
pub use headers::{HeaderAccumulator, Headers};
pub use crate::http::{Body, HttpRequest, HttpResponse, ResponseBuilder};
pub use hyper_transport::HyperTransport;
pub use options::{EffectiveOptions, OptionKey, OptionValue, Precedence, TransportOptions};
pub use transport::{HandleId, TransferHandle, TransferSpec, Transfer, Transport, TransportError};
pub use types::{HeaderValues, RequestOptions};
