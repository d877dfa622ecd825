//! # Channels
//!
//! A channel is the logical endpoint for one remote identity (or for the
//! broadcast domain when it has no remote). Channels never own sockets; they
//! hand encoded envelopes to their provider's transport.

use crate::error::BusResult;
use crate::listener::ChannelListener;
use crate::message::Message;
use dashmap::DashMap;
use std::sync::Arc;

/// Outbound and listening surface of a channel.
pub trait Channel: Send + Sync {
    /// Remote identity, or `None` for broadcast/provider channels.
    fn remote(&self) -> Option<&str>;

    /// Send a message point-to-point to the remote.
    fn send(&self, message: Message) -> BusResult<()>;

    /// Broadcast a message to every node on the publish exchange.
    fn publish(&self, message: Message) -> BusResult<()>;

    /// The general listener, called for every message received on this channel.
    fn listen_all(&self) -> &ChannelListener;

    /// Get or create the listener for one message name.
    fn listen(&self, name: &str) -> Arc<ChannelListener>;
}

/// A channel owned by a [`Provider`](crate::Provider), which feeds it inbound messages.
pub trait ProvidedChannel: Channel {
    /// Handle a message routed to this channel.
    fn received(&self, message: &Message);
}

/// General plus per-name listeners, shared by every channel implementation.
#[derive(Debug, Default)]
pub struct Listeners {
    general: ChannelListener,
    by_name: DashMap<String, Arc<ChannelListener>>,
}

impl Listeners {
    /// Create an empty listener set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The general listener.
    #[must_use]
    pub fn general(&self) -> &ChannelListener {
        &self.general
    }

    /// Get or create the listener for `name`.
    pub fn named(&self, name: &str) -> Arc<ChannelListener> {
        if let Some(listener) = self.by_name.get(name) {
            return listener.clone();
        }
        self.by_name
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ChannelListener::new()))
            .clone()
    }

    /// Call the general listener, then the listener registered for the message name.
    pub fn dispatch(&self, message: &Message) {
        self.general.call(message);

        let named = self.by_name.get(message.name()).map(|l| l.clone());
        if let Some(listener) = named {
            listener.call(message);
        }
    }
}
