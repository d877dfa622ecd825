//! # In-Memory Broker
//!
//! A single-process broker implementing the three exchange domains with
//! bounded per-node queues. Each connected node gets a pump task that decodes
//! frames and feeds its [`Provider`].
//!
//! Queue keys seen by the receiving provider:
//!
//! | Domain  | queue                  |
//! |---------|------------------------|
//! | Direct  | receiving node name    |
//! | Publish | `<exchange>pub`        |
//! | Aux     | topic                  |
//!
//! Aux topics are bound on the `<exchange>.<topic>` exchange.

use crate::codec::Serializer;
use crate::config::BusConfig;
use crate::envelope::Envelope;
use crate::error::{BusError, BusResult};
use crate::provider::{ChannelBackend, ChannelKind, Provider, PUB_REMOTE};
use crate::transport::{BusBackend, BusChannel, Link, Transport};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Provider over the broker's channels.
pub type BusProvider = Provider<BusChannel>;

/// A frame queued for one node.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue or topic key the frame was delivered on.
    pub queue: String,
    /// Encoded envelope.
    pub body: Bytes,
}

/// Broker counters.
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Frames enqueued to a node.
    pub delivered: AtomicU64,
    /// Frames dropped because a queue was full or gone.
    pub dropped: AtomicU64,
    /// Aux frames sent to topics nobody was bound to.
    pub unbound: AtomicU64,
}

/// In-process message broker for one exchange.
pub struct MemoryBroker {
    exchange_name: String,
    nodes: DashMap<String, mpsc::Sender<Delivery>>,
    aux_bindings: DashMap<String, BTreeSet<String>>,
    stats: BrokerStats,
}

impl MemoryBroker {
    /// Create a broker for `exchange_name`.
    pub fn new(exchange_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            exchange_name: exchange_name.into(),
            nodes: DashMap::new(),
            aux_bindings: DashMap::new(),
            stats: BrokerStats::default(),
        })
    }

    /// Exchange served by this broker.
    #[must_use]
    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    /// Queue every node receives broadcasts on.
    #[must_use]
    pub fn publish_queue(&self) -> String {
        format!("{}pub", self.exchange_name)
    }

    /// Exchange carrying the aux `topic`.
    #[must_use]
    pub fn aux_exchange(&self, topic: &str) -> String {
        format!("{}.{}", self.exchange_name, topic)
    }

    /// Nodes bound to the aux `topic`, sorted.
    #[must_use]
    pub fn aux_bindings(&self, topic: &str) -> Vec<String> {
        self.aux_bindings
            .get(&self.aux_exchange(topic))
            .map(|nodes| nodes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of connected nodes, sorted.
    #[must_use]
    pub fn nodes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Broker counters.
    #[must_use]
    pub fn stats(&self) -> &BrokerStats {
        &self.stats
    }

    /// Connect a node and return its provider.
    ///
    /// Must be called within a tokio runtime; the node's pump task is spawned
    /// on it. The publish channel of the provider is set before returning.
    pub fn connect(self: &Arc<Self>, config: &BusConfig) -> BusResult<Arc<BusProvider>> {
        config.validate()?;
        if config.exchange_name != self.exchange_name {
            return Err(BusError::Config(format!(
                "exchange `{}` does not match broker exchange `{}`",
                config.exchange_name, self.exchange_name
            )));
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        match self.nodes.entry(config.local_name.clone()) {
            Entry::Occupied(_) => {
                return Err(BusError::Config(format!(
                    "node `{}` is already connected",
                    config.local_name
                )))
            }
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }

        let serializer = config.codec.serializer();
        let transport = Arc::new(MemoryTransport {
            broker: self.clone(),
            node: config.local_name.clone(),
        });
        let link = Arc::new(Link::new(&config.local_name, serializer.clone(), transport));
        let backend = Arc::new(BusBackend::new(link));
        let provider = Arc::new(Provider::new(
            &config.local_name,
            backend.clone() as Arc<dyn ChannelBackend<BusChannel>>,
        ));
        provider.set_publish_channel(backend.new_channel(PUB_REMOTE, ChannelKind::Publish)?);

        tokio::spawn(pump(rx, Arc::downgrade(&provider), serializer));

        debug!(
            node = %config.local_name,
            exchange = %self.exchange_name,
            codec = config.codec.serializer().name(),
            "Node connected"
        );
        Ok(provider)
    }

    fn disconnect(&self, node: &str) {
        self.nodes.remove(node);
        for mut binding in self.aux_bindings.iter_mut() {
            binding.value_mut().remove(node);
        }
        self.aux_bindings.retain(|_, nodes| !nodes.is_empty());
        debug!(node = node, "Node disconnected");
    }

    fn deliver(&self, node: &str, delivery: Delivery) -> BusResult<()> {
        let Some(sender) = self.nodes.get(node).map(|s| s.clone()) else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(node = node, queue = %delivery.queue, "No queue bound for node, frame dropped");
            return Err(BusError::UnknownQueue(node.to_string()));
        };

        match sender.try_send(delivery) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(delivery)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(node = node, queue = %delivery.queue, "Queue full, frame dropped");
                Err(BusError::Transport(format!("queue of `{node}` is full")))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(BusError::UnknownQueue(node.to_string()))
            }
        }
    }

    fn fan_out(&self, targets: Vec<String>, queue: &str, body: &Bytes) {
        for node in targets {
            let delivery = Delivery {
                queue: queue.to_string(),
                body: body.clone(),
            };
            if let Err(e) = self.deliver(&node, delivery) {
                warn!(node = %node, queue = queue, error = %e, "Fan-out delivery failed");
            }
        }
    }
}

/// [`Transport`] of one node connected to a [`MemoryBroker`].
struct MemoryTransport {
    broker: Arc<MemoryBroker>,
    node: String,
}

impl Transport for MemoryTransport {
    fn send(&self, remote: &str, frame: Bytes) -> BusResult<()> {
        self.broker.deliver(
            remote,
            Delivery {
                queue: remote.to_string(),
                body: frame,
            },
        )
    }

    fn send_aux(&self, topic: &str, frame: Bytes) -> BusResult<()> {
        let targets = self.broker.aux_bindings(topic);

        if targets.is_empty() {
            self.broker.stats.unbound.fetch_add(1, Ordering::Relaxed);
            warn!(topic = topic, "Aux frame sent to a topic with no bindings");
            return Ok(());
        }
        self.broker.fan_out(targets, topic, &frame);
        Ok(())
    }

    fn publish(&self, frame: Bytes) -> BusResult<()> {
        let targets: Vec<String> = self.broker.nodes.iter().map(|e| e.key().clone()).collect();
        self.broker.fan_out(targets, &self.broker.publish_queue(), &frame);
        Ok(())
    }

    fn bind_aux(&self, topic: &str) -> BusResult<()> {
        if !self.broker.nodes.contains_key(&self.node) {
            return Err(BusError::Closed);
        }
        self.broker
            .aux_bindings
            .entry(self.broker.aux_exchange(topic))
            .or_default()
            .insert(self.node.clone());
        debug!(node = %self.node, topic = topic, "Aux topic bound");
        Ok(())
    }

    fn close(&self) -> BusResult<()> {
        self.broker.disconnect(&self.node);
        Ok(())
    }
}

async fn pump(
    mut rx: mpsc::Receiver<Delivery>,
    provider: Weak<BusProvider>,
    serializer: Arc<dyn Serializer>,
) {
    while let Some(delivery) = rx.recv().await {
        let Some(provider) = provider.upgrade() else {
            break;
        };
        match Envelope::decode(delivery.body, serializer.as_ref()) {
            Ok(envelope) => provider.received(
                envelope.message,
                envelope.domain,
                &delivery.queue,
                &envelope.source,
            ),
            Err(e) => warn!(queue = %delivery.queue, error = %e, "Dropping undecodable frame"),
        }
    }
}
