//! Call Exchange Table - correlates outgoing calls with their responses.
//!
//! Flow:
//! 1. Caller calls `register()` and gets a [`ReplyFuture`] carrying a fresh call id
//! 2. Caller sends the call envelope with that id
//! 3. The response listener calls `complete()` with the response of the same id
//! 4. The exchange is removed exactly once and the future resolves
//!
//! There is no timeout in the table. Callers that need bounded waiting use
//! [`ReplyFuture::timeout`] or [`ReplyFuture::cancel`].

use crate::domain::correlation::{CallId, CallIdGenerator};
use crate::domain::error::{RemoteError, RpcError, RpcResult};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Outcome reported by the remote side.
pub type CallOutcome = Result<Value, RemoteError>;

/// One outstanding call
struct CallExchange {
    /// Resolves the caller's future
    sender: oneshot::Sender<CallOutcome>,
    /// Function name (for logging)
    function: String,
    /// When the call was sent
    created_at: Instant,
}

/// Statistics for the exchange table
#[derive(Debug, Default)]
pub struct ExchangeStats {
    /// Calls registered
    pub registered: AtomicU64,
    /// Responses delivered to a waiting caller
    pub completed: AtomicU64,
    /// Responses whose caller had already dropped its future
    pub discarded: AtomicU64,
    /// Responses for no outstanding call
    pub stale: AtomicU64,
    /// Calls cancelled by the caller
    pub cancelled: AtomicU64,
}

/// Outstanding calls of one manager.
pub struct ExchangeTable {
    ids: CallIdGenerator,
    outstanding: DashMap<CallId, CallExchange>,
    stats: ExchangeStats,
}

impl ExchangeTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ids: CallIdGenerator::new(),
            outstanding: DashMap::new(),
            stats: ExchangeStats::default(),
        })
    }

    /// Register an outgoing call to `function`.
    pub fn register<T>(self: &Arc<Self>, function: &str) -> ReplyFuture<T> {
        let call_id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();

        self.outstanding.insert(
            call_id,
            CallExchange {
                sender: tx,
                function: function.to_string(),
                created_at: Instant::now(),
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);

        debug!(call_id = %call_id, function = function, "Registered call exchange");

        ReplyFuture {
            call_id,
            rx,
            table: Arc::downgrade(self),
            _marker: PhantomData,
        }
    }

    /// Complete the call `call_id` with the remote outcome.
    ///
    /// Returns true if a waiting caller received it.
    pub fn complete(&self, call_id: CallId, outcome: CallOutcome) -> bool {
        let Some((_, exchange)) = self.outstanding.remove(&call_id) else {
            self.stats.stale.fetch_add(1, Ordering::Relaxed);
            warn!(call_id = %call_id, "Response for unknown or completed call");
            return false;
        };

        let elapsed = exchange.created_at.elapsed();
        let success = outcome.is_ok();
        match exchange.sender.send(outcome) {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    call_id = %call_id,
                    function = %exchange.function,
                    success = success,
                    response_time_ms = elapsed.as_millis(),
                    "Completed call exchange"
                );
                true
            }
            Err(_) => {
                // caller dropped its future
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    call_id = %call_id,
                    function = %exchange.function,
                    "Response discarded"
                );
                false
            }
        }
    }

    /// Remove an outstanding call without resolving it.
    pub fn cancel(&self, call_id: CallId) -> bool {
        if self.outstanding.remove(&call_id).is_some() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(call_id = %call_id, "Cancelled call exchange");
            true
        } else {
            false
        }
    }

    /// Number of outstanding calls
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Check if a call is outstanding
    #[must_use]
    pub fn is_pending(&self, call_id: CallId) -> bool {
        self.outstanding.contains_key(&call_id)
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &ExchangeStats {
        &self.stats
    }
}

/// Pending reply of one outgoing call, decoded to `T` on completion.
///
/// Dropping the future does not cancel the call; the response is discarded
/// when it arrives.
#[must_use = "the reply is lost unless the future is awaited"]
pub struct ReplyFuture<T = Value> {
    call_id: CallId,
    rx: oneshot::Receiver<CallOutcome>,
    table: Weak<ExchangeTable>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ReplyFuture<T> {
    /// Id of the call.
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Decode the reply as `U` instead.
    pub fn cast<U>(self) -> ReplyFuture<U> {
        ReplyFuture {
            call_id: self.call_id,
            rx: self.rx,
            table: self.table,
            _marker: PhantomData,
        }
    }

    /// Remove the call from the exchange table. A later response is stale.
    pub fn cancel(self) -> bool {
        self.table
            .upgrade()
            .is_some_and(|table| table.cancel(self.call_id))
    }
}

impl<T: DeserializeOwned> ReplyFuture<T> {
    /// Wait at most `limit`, cancelling the call when it elapses.
    pub async fn timeout(mut self, limit: Duration) -> RpcResult<T> {
        match tokio::time::timeout(limit, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel();
                Err(RpcError::Timeout(limit))
            }
        }
    }

    /// Block the current thread until the reply arrives.
    ///
    /// Must not be called from within an async task.
    pub fn wait(self) -> RpcResult<T> {
        futures::executor::block_on(self)
    }
}

impl<T: DeserializeOwned> Future for ReplyFuture<T> {
    type Output = RpcResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(T::deserialize(value).map_err(RpcError::from)),
            Poll::Ready(Ok(Err(remote))) => Poll::Ready(Err(RpcError::Remote(remote))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Cancelled)),
        }
    }
}

impl<T> std::fmt::Debug for ReplyFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyFuture").field("call_id", &self.call_id).finish()
    }
}
