//! # Listeners
//!
//! Ordered callback lists used by channels (per message) and by remote events
//! (per payload). Callbacks run outside the lock, in registration order.

use crate::message::Message;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Handle returned when a callback is registered.
pub type ListenerId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: ListenerId,
    once: bool,
    callback: Callback<T>,
}

/// An ordered list of callbacks over values of type `T`.
pub struct Listener<T> {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry<T>>>,
}

/// Listener over received messages.
pub type ChannelListener = Listener<Message>;

impl<T> Listener<T> {
    /// Create an empty listener.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, once: bool, callback: Callback<T>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push(Entry { id, once, callback });
        id
    }

    /// Register a callback invoked for every value.
    pub fn on<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.push(false, Arc::new(f))
    }

    /// Register a callback removed after its first invocation.
    pub fn once<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.push(true, Arc::new(f))
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every callback with `value`. Returns how many ran.
    ///
    /// One-shot callbacks are detached before running, so each fires at most
    /// once even when `call` races with itself.
    pub fn call(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = {
            let mut entries = self.entries.write();
            let snapshot = entries.iter().map(|e| e.callback.clone()).collect();
            entries.retain(|e| !e.once);
            snapshot
        };

        for callback in &snapshot {
            callback(value);
        }
        snapshot.len()
    }
}

impl<T: Clone + Send + 'static> Listener<T> {
    /// Resolve with the next value passed to [`Listener::call`].
    pub fn next(&self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        self.once(move |value: &T| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(value.clone());
            }
        });
        rx
    }
}

impl<T> Default for Listener<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("callbacks", &self.len()).finish()
    }
}
