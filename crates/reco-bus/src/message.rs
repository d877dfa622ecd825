//! # Messages and Domains
//!
//! A [`Message`] is the unit that flows over every channel: a name, an opaque
//! payload value and receive-side metadata. Metadata is attached by the
//! [`Provider`](crate::Provider) when a message arrives and is never encoded.

use crate::channel::Channel;
use crate::error::{BusError, BusResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Routing category of an exchange.
///
/// The byte codes are part of the wire envelope and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Domain {
    /// Sent to exactly one remote.
    Direct = 0,
    /// Broadcast to every node listening on the publish exchange.
    Publish = 1,
    /// Multicast to every node bound to an aux topic.
    Aux = 2,
}

impl Domain {
    /// The stable byte code of this domain.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Resolve a domain from its byte code.
    pub fn from_code(code: u8) -> BusResult<Self> {
        match code {
            0 => Ok(Domain::Direct),
            1 => Ok(Domain::Publish),
            2 => Ok(Domain::Aux),
            other => Err(BusError::UnknownDomain(other)),
        }
    }
}

impl TryFrom<u8> for Domain {
    type Error = BusError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Domain::from_code(code)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Direct => f.write_str("direct"),
            Domain::Publish => f.write_str("publish"),
            Domain::Aux => f.write_str("aux"),
        }
    }
}

/// Payload types that always travel under the same message name.
pub trait NamedPayload: Serialize {
    /// The message name used for every payload of this type.
    const NAME: &'static str;

    /// Wrap this payload into a message.
    fn to_message(&self) -> BusResult<Message> {
        Message::encode(Self::NAME, self)
    }
}

/// Receive-side metadata of a message.
#[derive(Clone)]
pub struct Metadata {
    /// Name of the node that sent the message.
    pub source: String,
    /// Queue or topic key the message arrived on.
    pub queue: String,
    /// Domain the message was sent in.
    pub domain: Domain,
    /// Channel the message was routed to, if one is registered.
    pub channel: Option<Arc<dyn Channel>>,
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("source", &self.source)
            .field("queue", &self.queue)
            .field("domain", &self.domain)
            .field("channel", &self.channel.as_ref().map(|c| c.remote()))
            .finish()
    }
}

/// A named message with an opaque payload.
#[derive(Debug, Clone)]
pub struct Message {
    name: String,
    payload: Value,
    meta: Option<Metadata>,
    attributes: HashMap<String, Value>,
}

impl Message {
    /// Create a message with the given name and payload.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            meta: None,
            attributes: HashMap::new(),
        }
    }

    /// Create a message carrying no payload.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }

    /// Create a message by converting a typed payload into a value.
    pub fn encode<T: Serialize + ?Sized>(name: impl Into<String>, payload: &T) -> BusResult<Self> {
        let payload = serde_json::to_value(payload).map_err(|e| BusError::Encode(e.to_string()))?;
        Ok(Self::new(name, payload))
    }

    /// The message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload value.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consume the message, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> BusResult<T> {
        T::deserialize(&self.payload).map_err(|e| BusError::Decode(e.to_string()))
    }

    /// Receive-side metadata, present only on received messages.
    #[must_use]
    pub fn meta(&self) -> Option<&Metadata> {
        self.meta.as_ref()
    }

    /// Name of the sending node.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.meta.as_ref().map(|m| m.source.as_str())
    }

    /// Queue or topic key the message arrived on.
    #[must_use]
    pub fn queue(&self) -> Option<&str> {
        self.meta.as_ref().map(|m| m.queue.as_str())
    }

    /// Domain the message was received in.
    #[must_use]
    pub fn domain(&self) -> Option<Domain> {
        self.meta.as_ref().map(|m| m.domain)
    }

    /// Channel the message was routed to.
    #[must_use]
    pub fn channel(&self) -> Option<&Arc<dyn Channel>> {
        self.meta.as_ref().and_then(|m| m.channel.as_ref())
    }

    /// Attach receive-side metadata.
    #[must_use]
    pub fn received(mut self, meta: Metadata) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Set a local attribute. Attributes are never encoded.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Get a local attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({} {})", self.name, self.payload)
    }
}
