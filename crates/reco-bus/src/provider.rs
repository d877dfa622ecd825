//! # Domain Router
//!
//! The [`Provider`] owns the remote → channel registry of one node and routes
//! every inbound message by domain:
//!
//! ```text
//!  transport ──received(msg, domain, queue, source)──▶ Provider
//!                                                        │
//!                       general listeners (always, first)│
//!            ┌───────────────────────┬───────────────────┴──────┐
//!          DIRECT                   AUX                      PUBLISH
//!     channel[source]         channel[queue]            publish channel
//!     absent: warn+drop       absent: warn+drop         absent: drop
//! ```

use crate::channel::{Channel, Listeners, ProvidedChannel};
use crate::error::{BusError, BusResult};
use crate::listener::ChannelListener;
use crate::message::{Domain, Message, Metadata};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Remote name carried by the publish channel.
pub const PUB_REMOTE: &str = "pub";

/// What a channel is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// A node's direct queue.
    Direct,
    /// An aux topic.
    Aux,
    /// The publish exchange.
    Publish,
}

/// Transport-specific half of a provider.
pub trait ChannelBackend<C>: Send + Sync {
    /// Create a channel of `kind` for `remote`. Aux channels also bind the
    /// aux topic for inbound delivery before returning.
    fn new_channel(&self, remote: &str, kind: ChannelKind) -> BusResult<Arc<C>>;

    /// Broadcast a message on the publish exchange.
    fn publish(&self, message: Message) -> BusResult<()>;

    /// Release transport resources.
    fn close(&self) -> BusResult<()> {
        Ok(())
    }
}

/// The local node as seen by layers above the router.
pub trait Endpoint: Channel {
    /// Name of the local node.
    fn local_name(&self) -> &str;

    /// Get or create the direct channel to `remote`.
    fn channel_to(&self, remote: &str) -> BusResult<Arc<dyn Channel>>;

    /// Get or create the aux channel for `topic`.
    fn aux_channel_to(&self, topic: &str) -> BusResult<Arc<dyn Channel>>;
}

/// Routing counters.
#[derive(Debug, Default)]
pub struct RouterStats {
    /// Messages handed to `received`.
    pub received: AtomicU64,
    /// Own broadcasts echoed back and dropped.
    pub echoes: AtomicU64,
    /// Messages delivered to a registered channel.
    pub routed: AtomicU64,
    /// DIRECT/AUX messages from unknown remotes or queues.
    pub unroutable: AtomicU64,
}

/// Routes inbound messages to channels and hands out channels by remote.
pub struct Provider<C> {
    local_name: String,
    backend: Arc<dyn ChannelBackend<C>>,
    channels: DashMap<String, Arc<C>>,
    publish_channel: RwLock<Option<Arc<C>>>,
    listeners: Listeners,
    closed: AtomicBool,
    stats: RouterStats,
}

impl<C: ProvidedChannel + 'static> Provider<C> {
    /// Create a provider for the local node `local_name`.
    pub fn new(local_name: impl Into<String>, backend: Arc<dyn ChannelBackend<C>>) -> Self {
        Self {
            local_name: local_name.into(),
            backend,
            channels: DashMap::new(),
            publish_channel: RwLock::new(None),
            listeners: Listeners::new(),
            closed: AtomicBool::new(false),
            stats: RouterStats::default(),
        }
    }

    /// Name of the local node.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Get or create the direct channel for `remote`.
    pub fn channel(&self, remote: &str) -> BusResult<Arc<C>> {
        self.get_or_create(remote, ChannelKind::Direct)
    }

    /// Get or create the aux channel for `remote`.
    pub fn aux_channel(&self, remote: &str) -> BusResult<Arc<C>> {
        self.get_or_create(remote, ChannelKind::Aux)
    }

    fn get_or_create(&self, remote: &str, kind: ChannelKind) -> BusResult<Arc<C>> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if let Some(channel) = self.channels.get(remote) {
            return Ok(channel.clone());
        }

        // The entry guard makes creation atomic per remote.
        match self.channels.entry(remote.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let channel = self.backend.new_channel(remote, kind)?;
                entry.insert(channel.clone());
                debug!(remote = remote, kind = ?kind, "Registered channel");
                Ok(channel)
            }
        }
    }

    /// Look up a registered direct or aux channel without creating one.
    ///
    /// The publish channel is never returned here, whatever its remote name.
    #[must_use]
    pub fn channel_by_remote(&self, remote: &str) -> Option<Arc<C>> {
        self.channels.get(remote).map(|c| c.clone())
    }

    /// All registered channels.
    #[must_use]
    pub fn channels(&self) -> Vec<Arc<C>> {
        self.channels.iter().map(|e| e.value().clone()).collect()
    }

    /// Designate the channel that receives PUBLISH-domain messages.
    pub fn set_publish_channel(&self, channel: Arc<C>) {
        *self.publish_channel.write() = Some(channel);
    }

    /// The designated publish channel, if any.
    #[must_use]
    pub fn publish_channel(&self) -> Option<Arc<C>> {
        self.publish_channel.read().clone()
    }

    /// Routing counters.
    #[must_use]
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Entry point for the transport: route one inbound message.
    pub fn received(&self, message: Message, domain: Domain, queue: &str, source: &str) {
        if source == self.local_name {
            self.stats.echoes.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let routed = match domain {
            Domain::Direct => self.channel_by_remote(source),
            Domain::Aux => self.channel_by_remote(queue),
            Domain::Publish => self.publish_channel(),
        };

        let message = message.received(Metadata {
            source: source.to_string(),
            queue: queue.to_string(),
            domain,
            channel: routed.clone().map(|c| c as Arc<dyn Channel>),
        });

        self.listeners.dispatch(&message);

        match (domain, routed) {
            (_, Some(channel)) => {
                self.stats.routed.fetch_add(1, Ordering::Relaxed);
                channel.received(&message);
            }
            (Domain::Direct, None) => {
                self.stats.unroutable.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source = source,
                    name = message.name(),
                    "Direct message received from unknown remote"
                );
            }
            (Domain::Aux, None) => {
                self.stats.unroutable.fetch_add(1, Ordering::Relaxed);
                warn!(
                    queue = queue,
                    name = message.name(),
                    "Aux message received on unknown aux channel"
                );
            }
            (Domain::Publish, None) => {}
        }
    }

    /// Close the backend and drop every registration.
    pub fn close(&self) -> BusResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.channels.clear();
        self.publish_channel.write().take();
        debug!(node = %self.local_name, "Provider closed");
        self.backend.close()
    }

    /// Whether [`Provider::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<C: ProvidedChannel + 'static> Channel for Provider<C> {
    fn remote(&self) -> Option<&str> {
        None
    }

    fn send(&self, message: Message) -> BusResult<()> {
        self.publish(message)
    }

    fn publish(&self, message: Message) -> BusResult<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        self.backend.publish(message)
    }

    fn listen_all(&self) -> &ChannelListener {
        self.listeners.general()
    }

    fn listen(&self, name: &str) -> Arc<ChannelListener> {
        self.listeners.named(name)
    }
}

impl<C: ProvidedChannel + 'static> Endpoint for Provider<C> {
    fn local_name(&self) -> &str {
        &self.local_name
    }

    fn channel_to(&self, remote: &str) -> BusResult<Arc<dyn Channel>> {
        Ok(self.channel(remote)? as Arc<dyn Channel>)
    }

    fn aux_channel_to(&self, topic: &str) -> BusResult<Arc<dyn Channel>> {
        Ok(self.aux_channel(topic)? as Arc<dyn Channel>)
    }
}
