//! # Transport Binding
//!
//! [`Transport`] is the seam to the broker: it moves encoded envelopes between
//! named queues. [`BusChannel`] and [`BusBackend`] plug a transport into the
//! generic [`Provider`](crate::Provider).

use crate::channel::{Channel, Listeners, ProvidedChannel};
use crate::codec::Serializer;
use crate::envelope::Envelope;
use crate::error::BusResult;
use crate::listener::ChannelListener;
use crate::message::{Domain, Message};
use crate::provider::{ChannelBackend, ChannelKind};
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

/// Moves encoded frames to queues on a broker.
pub trait Transport: Send + Sync {
    /// Deliver a frame to the direct queue of node `remote`.
    fn send(&self, remote: &str, frame: Bytes) -> BusResult<()>;

    /// Deliver a frame to every node bound to aux `topic`.
    fn send_aux(&self, topic: &str, frame: Bytes) -> BusResult<()>;

    /// Deliver a frame to every node on the publish exchange.
    fn publish(&self, frame: Bytes) -> BusResult<()>;

    /// Start receiving frames sent to aux `topic`.
    fn bind_aux(&self, topic: &str) -> BusResult<()>;

    /// Stop receiving and release resources.
    fn close(&self) -> BusResult<()>;
}

/// The local side shared by every channel of a node.
pub struct Link {
    local_name: String,
    serializer: Arc<dyn Serializer>,
    transport: Arc<dyn Transport>,
}

impl Link {
    /// Create a link for the node `local_name`.
    pub fn new(
        local_name: impl Into<String>,
        serializer: Arc<dyn Serializer>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            local_name: local_name.into(),
            serializer,
            transport,
        }
    }

    /// Name of the local node.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The payload serializer.
    #[must_use]
    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    fn frame(&self, message: &Message, domain: Domain) -> BusResult<Bytes> {
        Envelope::encode(message, domain, &self.local_name, self.serializer.as_ref())
    }

    fn send(&self, remote: &str, message: &Message) -> BusResult<()> {
        trace!(to = remote, name = message.name(), "Sending direct");
        self.transport.send(remote, self.frame(message, Domain::Direct)?)
    }

    fn send_aux(&self, topic: &str, message: &Message) -> BusResult<()> {
        trace!(topic = topic, name = message.name(), "Sending aux");
        self.transport.send_aux(topic, self.frame(message, Domain::Aux)?)
    }

    fn publish(&self, message: &Message) -> BusResult<()> {
        trace!(name = message.name(), "Publishing");
        self.transport.publish(self.frame(message, Domain::Publish)?)
    }
}

/// Channel over a [`Transport`].
///
/// A direct channel sends to its remote's queue, an aux channel to its topic
/// and the publish channel to the publish exchange.
pub struct BusChannel {
    remote: String,
    kind: ChannelKind,
    link: Arc<Link>,
    listeners: Listeners,
}

impl BusChannel {
    /// Create a channel of `kind` to `remote` over `link`.
    pub fn new(remote: impl Into<String>, kind: ChannelKind, link: Arc<Link>) -> Self {
        Self {
            remote: remote.into(),
            kind,
            link,
            listeners: Listeners::new(),
        }
    }

    /// What this channel is bound to.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Whether this channel targets an aux topic.
    #[must_use]
    pub fn is_aux(&self) -> bool {
        self.kind == ChannelKind::Aux
    }
}

impl Channel for BusChannel {
    fn remote(&self) -> Option<&str> {
        Some(&self.remote)
    }

    fn send(&self, message: Message) -> BusResult<()> {
        match self.kind {
            ChannelKind::Direct => self.link.send(&self.remote, &message),
            ChannelKind::Aux => self.link.send_aux(&self.remote, &message),
            ChannelKind::Publish => self.link.publish(&message),
        }
    }

    fn publish(&self, message: Message) -> BusResult<()> {
        self.link.publish(&message)
    }

    fn listen_all(&self) -> &ChannelListener {
        self.listeners.general()
    }

    fn listen(&self, name: &str) -> Arc<ChannelListener> {
        self.listeners.named(name)
    }
}

impl ProvidedChannel for BusChannel {
    fn received(&self, message: &Message) {
        self.listeners.dispatch(message);
    }
}

/// [`ChannelBackend`] producing [`BusChannel`]s.
pub struct BusBackend {
    link: Arc<Link>,
    transport: Arc<dyn Transport>,
}

impl BusBackend {
    /// Create a backend for the node described by `link`.
    pub fn new(link: Arc<Link>) -> Self {
        let transport = link.transport.clone();
        Self { link, transport }
    }

    /// The link shared by channels of this backend.
    #[must_use]
    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }
}

impl ChannelBackend<BusChannel> for BusBackend {
    fn new_channel(&self, remote: &str, kind: ChannelKind) -> BusResult<Arc<BusChannel>> {
        if kind == ChannelKind::Aux {
            self.transport.bind_aux(remote)?;
        }
        Ok(Arc::new(BusChannel::new(remote, kind, self.link.clone())))
    }

    fn publish(&self, message: Message) -> BusResult<()> {
        self.link.publish(&message)
    }

    fn close(&self) -> BusResult<()> {
        self.transport.close()
    }
}
