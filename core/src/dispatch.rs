//! Single-request executor and batch scheduler.
//!
//! # Design
//! An operation pairs one request with one transport handle, one private
//! `HeaderAccumulator` and the key the caller gave the request. Operations are
//! created when a request enters a batch (or the single-request path) and are
//! consumed as soon as their outcome has been turned into a response or a
//! failure; dropping the handle releases it.
//!
//! A batch runs on its own current-thread runtime. Every handle's transfer
//! future is pushed into one `FuturesUnordered` and driven from that single
//! loop until all of them finish, so transfers interleave without a thread
//! per request. Batches run one after another; the runtime of batch `k` is
//! gone before batch `k + 1` opens its handles.
//!
//! Completion order is irrelevant to the caller: outcomes are stored by
//! position, and results are merged into a `BTreeMap` keyed by the caller's
//! keys.
//!
//! # Failure policy
//! `dispatch` is fail-fast: after a batch's loop ends, the first failed
//! operation in input order aborts the whole call and every response already
//! collected, in this batch or earlier ones, is discarded. `dispatch_settled`
//! keeps per-key outcomes instead. Neither retries anything.
//!
//! The blocking entry points must not be called from inside a tokio runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::runtime::{Builder, Runtime};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{DispatchError, TransportFailure};
use crate::headers::HeaderAccumulator;
use crate::http::{HttpRequest, HttpResponse};
use crate::options::{merge, Precedence, TransportOptions};
use crate::transport::{HandleId, TransferHandle, TransferSpec, Transfer, Transport, TransportError};

type Settled<K> = (K, Result<HttpResponse, TransportFailure>);

/// Drives operations through a `Transport`.
pub struct Dispatcher<T> {
    transport: T,
    extra_options: TransportOptions,
    precedence: Precedence,
    batch_deadline: Option<Duration>,
    next_handle: AtomicU64,
}

struct Operation<K, H> {
    key: K,
    id: HandleId,
    request: HttpRequest,
    handle: H,
    headers: HeaderAccumulator,
}

impl<K, H> Operation<K, H> {
    /// Release the handle and turn the outcome into a response or failure.
    fn settle(self, outcome: Result<Transfer, TransportError>) -> Settled<K> {
        let Operation {
            key,
            id,
            request,
            handle,
            headers,
        } = self;
        drop(handle);
        trace!(handle = %id, "released transfer handle");

        let result = match outcome {
            Ok(transfer) => Ok(build_response(transfer, headers)),
            Err(err) => {
                warn!(handle = %id, request = %request, error = %err, "transfer failed");
                Err(TransportFailure::new(err, request))
            }
        };
        (key, result)
    }
}

/// Assemble a response: status, then headers one by one, then the body.
fn build_response(transfer: Transfer, headers: HeaderAccumulator) -> HttpResponse {
    let (headers, reason) = headers.into_parts();
    headers
        .iter()
        .fold(
            HttpResponse::builder(transfer.status).reason(reason),
            |builder, (name, value)| builder.add_header(name, value),
        )
        .body(transfer.body)
        .build()
}

/// The loop a batch (or a single request) runs on.
fn execution_context() -> Result<Runtime, DispatchError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DispatchError::Multiplex)
}

/// Split `items` into consecutive batches of at most `batch_size`, keeping
/// their order. A `batch_size` of zero is treated as one.
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter();
    loop {
        let batch: Vec<T> = iter.by_ref().take(size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }
    batches
}

fn check_unique_keys<K: Ord + Debug>(items: &[(K, HttpRequest)]) -> Result<(), DispatchError> {
    let mut seen = BTreeSet::new();
    for (key, _) in items {
        if !seen.insert(key) {
            return Err(DispatchError::DuplicateKey(format!("{key:?}")));
        }
    }
    Ok(())
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            extra_options: config.extra_options.clone(),
            precedence: config.precedence,
            batch_deadline: config.batch_deadline,
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one request to completion, blocking the calling thread.
    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, DispatchError> {
        let runtime = execution_context()?;
        let mut op = self.open((), request, None);
        debug!(handle = %op.id, request = %op.request, "executing request");

        let outcome = runtime.block_on(op.handle.perform(&mut op.headers));
        let ((), result) = op.settle(outcome);
        Ok(result?)
    }

    /// Run `requests` in batches of `batch_size` and return every response
    /// keyed by its request's key. Fails with the first failed operation.
    pub fn dispatch<K, I>(
        &self,
        requests: I,
        batch_size: usize,
    ) -> Result<BTreeMap<K, HttpResponse>, DispatchError>
    where
        K: Ord + Debug,
        I: IntoIterator<Item = (K, HttpRequest)>,
    {
        let mut responses = BTreeMap::new();
        self.run_batches(requests, batch_size, |settled| {
            for (key, result) in settled {
                responses.insert(key, result?);
            }
            Ok(())
        })?;
        Ok(responses)
    }

    /// Like `dispatch`, but keeps each operation's outcome instead of failing
    /// the call on the first transport failure.
    pub fn dispatch_settled<K, I>(
        &self,
        requests: I,
        batch_size: usize,
    ) -> Result<BTreeMap<K, Result<HttpResponse, TransportFailure>>, DispatchError>
    where
        K: Ord + Debug,
        I: IntoIterator<Item = (K, HttpRequest)>,
    {
        let mut outcomes = BTreeMap::new();
        self.run_batches(requests, batch_size, |settled| {
            outcomes.extend(settled);
            Ok(())
        })?;
        Ok(outcomes)
    }

    fn run_batches<K, I, F>(
        &self,
        requests: I,
        batch_size: usize,
        mut on_batch: F,
    ) -> Result<(), DispatchError>
    where
        K: Ord + Debug,
        I: IntoIterator<Item = (K, HttpRequest)>,
        F: FnMut(Vec<Settled<K>>) -> Result<(), DispatchError>,
    {
        if batch_size == 0 {
            return Err(DispatchError::InvalidBatchSize);
        }
        let items: Vec<(K, HttpRequest)> = requests.into_iter().collect();
        check_unique_keys(&items)?;

        let total = items.len();
        let batches = partition(items, batch_size);
        let count = batches.len();
        debug!(requests = total, batches = count, batch_size, "dispatching");

        for (index, batch) in batches.into_iter().enumerate() {
            debug!(batch = index + 1, of = count, size = batch.len(), "starting batch");
            let settled = self.run_batch(batch)?;
            on_batch(settled)?;
        }
        Ok(())
    }

    /// Drive every request of one batch concurrently on a fresh loop.
    fn run_batch<K>(&self, batch: Vec<(K, HttpRequest)>) -> Result<Vec<Settled<K>>, DispatchError> {
        let runtime = execution_context()?;
        let deadline = self.batch_deadline;
        let mut ops: Vec<Operation<K, T::Handle>> = batch
            .into_iter()
            .map(|(key, request)| self.open(key, request, deadline))
            .collect();

        let outcomes = runtime.block_on(async {
            // Fixed before any handle is polled, so a handle timeout clamped to
            // the same limit can only expire at or after this instant.
            let expires = deadline.map(|limit| Instant::now() + limit);
            let mut outcomes: Vec<Option<Result<Transfer, TransportError>>> =
                ops.iter().map(|_| None).collect();
            let mut in_flight: FuturesUnordered<_> = ops
                .iter_mut()
                .enumerate()
                .map(|(idx, op)| async move { (idx, op.handle.perform(&mut op.headers).await) })
                .collect();

            let drive = async {
                while let Some((idx, outcome)) = in_flight.next().await {
                    outcomes[idx] = Some(outcome);
                }
            };
            let (Some(limit), Some(expires)) = (deadline, expires) else {
                drive.await;
                return Ok(outcomes);
            };
            let cut_off = tokio::time::timeout_at(expires, drive).await.is_err();
            // Handles whose clamped timeout won the race against the loop
            // deadline still count as the deadline elapsing.
            let timed_out = Instant::now() >= expires
                && outcomes.iter().any(|outcome| matches!(outcome, Some(Err(_))));
            if cut_off || timed_out {
                warn!(deadline = ?limit, "batch deadline elapsed");
                return Err(DispatchError::DeadlineElapsed(limit));
            }
            Ok(outcomes)
        })?;

        let settled = ops
            .into_iter()
            .zip(outcomes)
            .map(|(op, outcome)| {
                let outcome = outcome
                    .unwrap_or_else(|| Err(TransportError::new("transfer did not complete")));
                op.settle(outcome)
            })
            .collect();
        Ok(settled)
    }

    fn open<K>(
        &self,
        key: K,
        request: HttpRequest,
        deadline: Option<Duration>,
    ) -> Operation<K, T::Handle> {
        let id = HandleId::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut options = merge(&self.extra_options, &request, self.precedence);
        if let Some(limit) = deadline {
            options.clamp_timeout(limit);
        }
        let spec = TransferSpec::new(&request, options);
        trace!(handle = %id, method = spec.method(), uri = %spec.uri, "opening transfer handle");

        Operation {
            key,
            id,
            handle: self.transport.open(id, spec),
            headers: HeaderAccumulator::new(id),
            request,
        }
    }
}
