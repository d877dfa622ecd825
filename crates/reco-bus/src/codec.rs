//! # Payload Serializers
//!
//! The envelope carries the payload as an opaque byte block produced by a
//! pluggable [`Serializer`]. Every node on one exchange must use the same one.

use crate::error::{BusError, BusResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Turns payload values into bytes and back.
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Encode a payload value.
    fn serialize(&self, value: &Value) -> BusResult<Vec<u8>>;

    /// Decode a payload value.
    fn deserialize(&self, bytes: &[u8]) -> BusResult<Value>;
}

/// JSON payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, value: &Value) -> BusResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| BusError::Encode(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> BusResult<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| BusError::Decode(e.to_string()))
    }
}

/// MessagePack payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackSerializer;

impl Serializer for MsgPackSerializer {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn serialize(&self, value: &Value) -> BusResult<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| BusError::Encode(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> BusResult<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        rmp_serde::from_slice(bytes).map_err(|e| BusError::Decode(e.to_string()))
    }
}

/// Serializer selection in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Json,
    MsgPack,
}

impl CodecKind {
    /// Build the serializer for this kind.
    #[must_use]
    pub fn serializer(self) -> Arc<dyn Serializer> {
        match self {
            CodecKind::Json => Arc::new(JsonSerializer),
            CodecKind::MsgPack => Arc::new(MsgPackSerializer),
        }
    }
}
