//! # Bus Errors

use thiserror::Error;

/// Errors raised by channels, providers, codecs and transports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The provider or transport was closed.
    #[error("bus closed")]
    Closed,

    /// No queue is bound under the given name.
    #[error("no queue bound for `{0}`")]
    UnknownQueue(String),

    /// A domain byte that does not map to any [`Domain`](crate::Domain).
    #[error("unknown domain code {0}")]
    UnknownDomain(u8),

    /// The payload could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The envelope or payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The underlying transport refused the operation.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Invalid bus configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;
