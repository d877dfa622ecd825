//! # Reco Bus - Topic-Routed Message Bus
//!
//! Message model, channels and the per-node domain router underneath the
//! reco RPC layer.
//!
//! ## Domains
//!
//! ```text
//!              DIRECT                   PUBLISH                   AUX
//!   node a ──────────────▶ b   a ──▶ every node       a ──▶ nodes bound to topic
//!            queue "b"            queue "<exchange>pub"        queue "<topic>"
//! ```
//!
//! Every node owns one [`Provider`]. The transport hands it each inbound frame
//! together with the domain, queue and source; the provider runs its general
//! listeners and then routes the message to exactly one registered channel,
//! or to none.
//!
//! ## Wire format
//!
//! See [`envelope`]. Payloads are opaque [`serde_json::Value`]s encoded by the
//! configured [`Serializer`].

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod channel;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod memory;
pub mod message;
pub mod provider;
pub mod transport;

// Re-export main types
pub use channel::{Channel, Listeners, ProvidedChannel};
pub use codec::{CodecKind, JsonSerializer, MsgPackSerializer, Serializer};
pub use config::BusConfig;
pub use envelope::Envelope;
pub use error::{BusError, BusResult};
pub use listener::{ChannelListener, Listener, ListenerId};
pub use memory::{BrokerStats, BusProvider, Delivery, MemoryBroker};
pub use message::{Domain, Message, Metadata, NamedPayload};
pub use provider::{ChannelBackend, ChannelKind, Endpoint, Provider, RouterStats, PUB_REMOTE};
pub use transport::{BusBackend, BusChannel, Link, Transport};

/// Opaque payload value carried by every message.
pub use serde_json::Value;
