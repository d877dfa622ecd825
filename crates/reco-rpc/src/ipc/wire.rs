//! Wire messages of the RPC protocol.
//!
//! | Name | Payload | Sent |
//! |------|---------|------|
//! | `rpcivk` | [`CallRequest`] | caller to callee, on the callee's channel |
//! | `rpcres` | [`CallResponse`] | callee to caller, direct |
//! | `rpcive` | [`EventCall`] | any node, usually published |
//!
//! Field names are camelCase on the wire.

use crate::domain::correlation::CallId;
use crate::domain::error::RemoteError;
use reco_bus::NamedPayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invocation of a remote function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Id the response must carry
    pub call_id: CallId,
    /// Function name, e.g. `Logger.log(string)`
    pub name: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,
}

impl NamedPayload for CallRequest {
    const NAME: &'static str = "rpcivk";
}

/// Completion of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub call_id: CallId,
    pub success: bool,
    /// Return value; on failure a bare reason string or an encoded [`RemoteError`]
    #[serde(default)]
    pub value: Value,
}

impl CallResponse {
    pub fn success(call_id: CallId, value: Value) -> Self {
        Self {
            call_id,
            success: true,
            value,
        }
    }

    /// A call refused before any handler ran; the value is the bare reason.
    pub fn rejected(call_id: CallId, reason: &str) -> Self {
        Self {
            call_id,
            success: false,
            value: Value::String(reason.to_string()),
        }
    }

    /// A handler failure with its cause chain.
    pub fn failure(call_id: CallId, error: &RemoteError) -> Self {
        Self {
            call_id,
            success: false,
            value: error.to_value(),
        }
    }

    /// The outcome carried by this response.
    #[must_use]
    pub fn into_outcome(self) -> Result<Value, RemoteError> {
        if self.success {
            Ok(self.value)
        } else {
            Err(RemoteError::from_value(&self.value))
        }
    }
}

impl NamedPayload for CallResponse {
    const NAME: &'static str = "rpcres";
}

/// Invocation of a remote event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCall {
    /// Function name of the event getter
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    /// UID of the object the payload belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Value>,
}

impl NamedPayload for EventCall {
    const NAME: &'static str = "rpcive";
}
