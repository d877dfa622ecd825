//! Bus node configuration with validation.

use crate::codec::CodecKind;
use crate::error::{BusError, BusResult};
use serde::{Deserialize, Serialize};

/// Configuration of one node on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name of this node; also the name of its direct queue.
    pub local_name: String,
    /// Name of the exchange shared by every node of the system.
    pub exchange_name: String,
    /// Payload serializer, identical on every node.
    pub codec: CodecKind,
    /// Bound of the inbound queue of this node.
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            local_name: "node".to_string(),
            exchange_name: "reco".to_string(),
            codec: CodecKind::Json,
            queue_capacity: 1024,
        }
    }
}

impl BusConfig {
    /// Default configuration for the node `local_name`.
    pub fn named(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> BusResult<()> {
        if self.local_name.is_empty() {
            return Err(BusError::Config("local_name cannot be empty".into()));
        }
        if self.exchange_name.is_empty() {
            return Err(BusError::Config("exchange_name cannot be empty".into()));
        }
        if self.local_name == self.publish_queue() {
            return Err(BusError::Config(format!(
                "local_name `{}` collides with the publish queue",
                self.local_name
            )));
        }
        if self.queue_capacity == 0 {
            return Err(BusError::Config("queue_capacity cannot be 0".into()));
        }
        Ok(())
    }

    /// Name of the queue every node receives broadcasts on.
    #[must_use]
    pub fn publish_queue(&self) -> String {
        format!("{}pub", self.exchange_name)
    }
}
