//! RPC error types.
//!
//! Compile errors are fatal for the interface they concern. Every per-call
//! failure on the receiving side becomes a failure response; on the calling
//! side it surfaces as [`RpcError::Remote`].

use reco_bus::BusError;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure value sent for a call to an unregistered function.
pub const UNKNOWN_FUNCTION: &str = "unknown function";

/// Failure value sent when authorization denies a call.
pub const PERMISSION_DENIED: &str = "Permission denied";

/// Message used when a failure response carries no usable description.
pub const UNKNOWN_REMOTE_FAILURE: &str = "unknown remote failure";

/// Malformed interface or object shape, detected at first compile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("event getter `{method}` must take no parameters, found {params}")]
    EventArity { method: String, params: usize },

    #[error("async method `{method}` has no sync sibling `{sibling}` with the same parameters")]
    MissingSyncSibling { method: String, sibling: String },

    #[error("object getter `{method}` must take exactly one UID parameter, found {params}")]
    ObjectFactoryArity { method: String, params: usize },

    #[error("object getter `{method}` takes `{found}` but the object UID is `{expected}`")]
    ObjectUidMismatch {
        method: String,
        expected: String,
        found: String,
    },

    #[error("object `{object}` has no UID accessor")]
    MissingUid { object: String },

    #[error("member `{object}.{member}` targets `{target}`, which is not a method of the interface")]
    UnresolvedObjectTarget {
        object: String,
        member: String,
        target: String,
    },

    #[error("member `{object}.{member}` forwards to `{target}`, whose first parameter `{found}` does not accept UID `{expected}`")]
    ForwardUidMismatch {
        object: String,
        member: String,
        target: String,
        expected: String,
        found: String,
    },

    #[error("method `{name}` is declared twice on `{interface}`")]
    DuplicateMethod { interface: String, name: String },
}

/// A failure reported by the remote side of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Top-level failure message.
    pub message: String,
    /// Underlying causes, outermost first.
    pub causes: Vec<String>,
}

impl RemoteError {
    /// A failure with a message and no causes.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Build from a handler error, keeping its cause chain.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            causes: error.chain().skip(1).map(ToString::to_string).collect(),
        }
    }

    /// Interpret the value of a failure response.
    ///
    /// A string is the message; `{"error", "causes"}` carries a message and its
    /// causes; anything else yields [`UNKNOWN_REMOTE_FAILURE`].
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(message) => Self::new(message.clone()),
            Value::Object(fields) => match fields.get("error").and_then(Value::as_str) {
                Some(message) => Self {
                    message: message.to_string(),
                    causes: fields
                        .get("causes")
                        .and_then(Value::as_array)
                        .map(|causes| {
                            causes
                                .iter()
                                .filter_map(|c| c.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default(),
                },
                None => Self::new(UNKNOWN_REMOTE_FAILURE),
            },
            _ => Self::new(UNKNOWN_REMOTE_FAILURE),
        }
    }

    /// The value sent in a failure response.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({ "error": self.message, "causes": self.causes })
    }

    /// Whether the remote had no function under the called name.
    #[must_use]
    pub fn is_unknown_function(&self) -> bool {
        self.message == UNKNOWN_FUNCTION
    }

    /// Whether the remote refused the call.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.message == PERMISSION_DENIED
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

/// Invalid RPC configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("wildcard group cannot be empty")]
    EmptyWildcard,
    #[error("max_concurrent_calls cannot be 0")]
    ZeroConcurrency,
}

/// Errors surfaced to RPC callers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("`{interface}` has no method `{method}`")]
    UnknownMethod { interface: String, method: String },

    #[error("`{interface}.{method}` is overloaded and no overload takes {args} arguments")]
    AmbiguousMethod {
        interface: String,
        method: String,
        args: usize,
    },

    #[error("`{method}` is {kind} and cannot be called")]
    NotCallable { method: String, kind: &'static str },

    #[error("`{method}` is {kind}, not an event getter")]
    NotEvent { method: String, kind: &'static str },

    #[error("no function registered as `{0}`")]
    UnknownFunction(String),

    #[error("function `{0}` has no local handler")]
    NoHandler(String),

    #[error("remote failure: {0}")]
    Remote(RemoteError),

    #[error("handler failure: {0}")]
    Handler(RemoteError),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl RpcError {
    /// The remote failure, when the remote side reported one.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            RpcError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Codec(e.to_string())
    }
}

/// Result alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
