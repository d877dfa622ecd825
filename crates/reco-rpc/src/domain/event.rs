//! # Remote Events
//!
//! A [`RemoteEvent`] is a named broadcast callback. Invoking it notifies its
//! general subscribers in registration order, then the child event scoped to
//! the owning UID of the payload, if the payload has one and a child exists.
//!
//! ```text
//!  EventCall { name, payload, uid: "x" }
//!        │
//!        ▼
//!  RemoteEvent "Api.on_alert()" ── general subscribers
//!        │
//!        └── children["x"] ── subscribers of object "x"
//! ```

use dashmap::DashMap;
use reco_bus::{Listener, ListenerId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Event payloads that may belong to a remote object.
pub trait EventPayload: Serialize {
    /// UID of the object the event concerns.
    fn owner_uid(&self) -> Option<Value> {
        None
    }
}

impl EventPayload for Value {}

/// Key of a UID-scoped child event.
fn uid_key(uid: &Value) -> String {
    match uid {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A named broadcast callback with UID-scoped children.
pub struct RemoteEvent {
    name: String,
    uid: Option<Value>,
    subscribers: Listener<Value>,
    children: DashMap<String, Arc<RemoteEvent>>,
}

impl RemoteEvent {
    /// Create an event registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: None,
            subscribers: Listener::new(),
            children: DashMap::new(),
        }
    }

    /// Function name the event is registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The UID this event is scoped to, for child events.
    #[must_use]
    pub fn uid(&self) -> Option<&Value> {
        self.uid.as_ref()
    }

    /// Subscribe to every payload.
    pub fn on<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribers.on(f)
    }

    /// Subscribe with payloads decoded to `P`. Payloads that do not decode
    /// are skipped.
    pub fn on_typed<P, F>(&self, f: F) -> ListenerId
    where
        P: DeserializeOwned,
        F: Fn(P) + Send + Sync + 'static,
    {
        let name = self.name.clone();
        self.subscribers.on(move |value: &Value| match P::deserialize(value) {
            Ok(payload) => f(payload),
            Err(e) => warn!(event = %name, error = %e, "Event payload does not match subscriber type"),
        })
    }

    /// Subscribe to the next payload only.
    pub fn once<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribers.once(f)
    }

    /// Resolve with the next payload.
    pub fn next(&self) -> oneshot::Receiver<Value> {
        self.subscribers.next()
    }

    /// Remove a subscriber.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.subscribers.remove(id)
    }

    /// Number of general subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Stream of every payload from now on. Dropping the stream unsubscribes.
    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribers.on(move |value: &Value| {
            let _ = tx.send(value.clone());
        });
        EventStream {
            inner: UnboundedReceiverStream::new(rx),
            event: Arc::downgrade(self),
            id,
        }
    }

    /// Get or create the child event scoped to `uid`.
    pub fn by_uid(&self, uid: &Value) -> Arc<RemoteEvent> {
        let key = uid_key(uid);
        if let Some(child) = self.children.get(&key) {
            return child.clone();
        }
        self.children
            .entry(key)
            .or_insert_with(|| {
                debug!(event = %self.name, uid = %uid, "Created UID-scoped event");
                Arc::new(RemoteEvent {
                    name: self.name.clone(),
                    uid: Some(uid.clone()),
                    subscribers: Listener::new(),
                    children: DashMap::new(),
                })
            })
            .clone()
    }

    /// The child event scoped to `uid`, if one was created.
    #[must_use]
    pub fn child(&self, uid: &Value) -> Option<Arc<RemoteEvent>> {
        self.children.get(&uid_key(uid)).map(|c| c.clone())
    }

    /// Notify general subscribers, then the child scoped to `uid`.
    ///
    /// Returns the number of callbacks that ran.
    pub fn call(&self, payload: &Value, uid: Option<&Value>) -> usize {
        let mut notified = self.subscribers.call(payload);
        if let Some(child) = uid.and_then(|uid| self.child(uid)) {
            notified += child.call(payload, None);
        }
        notified
    }
}

impl fmt::Debug for RemoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEvent")
            .field("name", &self.name)
            .field("uid", &self.uid)
            .field("subscribers", &self.subscribers.len())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Stream of event payloads, see [`RemoteEvent::subscribe`].
pub struct EventStream {
    inner: UnboundedReceiverStream<Value>,
    event: Weak<RemoteEvent>,
    id: ListenerId,
}

impl Stream for EventStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(event) = self.event.upgrade() {
            event.remove(self.id);
        }
    }
}
