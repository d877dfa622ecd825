//! Domain types of the RPC layer.
//!
//! Descriptors, compiled dispatch tables, remote functions and events, call
//! correlation, security and configuration. Nothing here sends on the bus.

pub mod args;
pub mod compiled;
pub mod config;
pub mod correlation;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod exchange;
pub mod function;
pub mod security;

// Re-exports for convenience
pub use args::{from_args, to_args, FromArgs, IntoArgs};
pub use compiled::{CompiledInterface, CompiledMethod, CompiledObjectClass, CompiledObjectMethod, MethodKind};
pub use config::RpcConfig;
pub use correlation::{CallId, CallIdGenerator};
pub use descriptor::{
    Describe, InterfaceDescriptor, MemberDescriptor, MethodDescriptor, ObjectDescriptor, ObjectRef, RemoteApi,
    RemoteObjectType, Returns, TypeDescriptor,
};
pub use error::{CompileError, ConfigError, RemoteError, RpcError, RpcResult};
pub use event::{EventPayload, EventStream, RemoteEvent};
pub use exchange::{CallOutcome, ExchangeStats, ExchangeTable, ReplyFuture};
pub use function::{handler_fn, CallInfo, FunctionHandler, RemoteFunction};
pub use security::{InboundSecurityManager, StaticSecurityManager};
