//! Blocking HTTP client that sends one request or many in ordered batches.
//!
//! # Design
//! `Client` is a thin surface over `Dispatcher`. It holds the configuration
//! fixed at construction (batch size, deadline, extra options and their
//! precedence) and carries no other state between calls. Every call blocks
//! the calling thread until its responses are complete.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, TransportFailure};
use crate::http::{HttpRequest, HttpResponse};
use crate::hyper_transport::HyperTransport;
use crate::transport::Transport;
use crate::types::RequestOptions;

/// HTTP client over a `Transport`, hyper by default.
pub struct Client<T: Transport = HyperTransport> {
    dispatcher: Dispatcher<T>,
    batch_size: usize,
}

impl Client<HyperTransport> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(HyperTransport::new(), config)
    }
}

impl Default for Client<HyperTransport> {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(transport, &config),
            batch_size: config.batch_size,
        }
    }

    /// Batch size used by `send_requests`.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn transport(&self) -> &T {
        self.dispatcher.transport()
    }

    /// Send one request and wait for its response.
    pub fn send_request(&self, request: HttpRequest) -> Result<HttpResponse, DispatchError> {
        self.dispatcher.execute(request)
    }

    /// Send `requests` in batches of the configured size. Responses come back
    /// in input order; any transport failure fails the whole call.
    pub fn send_requests(&self, requests: Vec<HttpRequest>) -> Result<Vec<HttpResponse>, DispatchError> {
        self.send_requests_with(requests, self.batch_size)
    }

    pub fn send_requests_with(
        &self,
        requests: Vec<HttpRequest>,
        batch_size: usize,
    ) -> Result<Vec<HttpResponse>, DispatchError> {
        let responses = self
            .dispatcher
            .dispatch(requests.into_iter().enumerate(), batch_size)?;
        Ok(responses.into_values().collect())
    }

    /// Send requests identified by caller-chosen keys. Batches are cut in
    /// iteration order; the result is ordered by key.
    pub fn send_keyed<K, I>(
        &self,
        requests: I,
        batch_size: usize,
    ) -> Result<BTreeMap<K, HttpResponse>, DispatchError>
    where
        K: Ord + Debug,
        I: IntoIterator<Item = (K, HttpRequest)>,
    {
        self.dispatcher.dispatch(requests, batch_size)
    }

    /// Send `requests` and report each one's outcome, in input order, instead
    /// of failing on the first transport failure.
    pub fn send_requests_settled(
        &self,
        requests: Vec<HttpRequest>,
        batch_size: usize,
    ) -> Result<Vec<Result<HttpResponse, TransportFailure>>, DispatchError> {
        let outcomes = self
            .dispatcher
            .dispatch_settled(requests.into_iter().enumerate(), batch_size)?;
        Ok(outcomes.into_values().collect())
    }

    /// Build a request from raw parts and send it.
    pub fn request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, DispatchError> {
        self.send_request(HttpRequest::from_parts(method, url, options))
    }
}
