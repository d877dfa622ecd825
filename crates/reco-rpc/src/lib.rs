//! # Reco RPC - Remote Calls, Objects and Events over the Reco Bus
//!
//! Peers declare service interfaces as typed descriptors. The compiler turns
//! each interface into a table of compiled methods; the [`RpcManager`] serves
//! local handlers and issues calls over bus channels.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          RpcManager                               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Registry ── CompiledInterface ── CompiledMethod                  │
//! │     │            Sync │ Async │ EventGetter │ ObjectFactory       │
//! │     ├── functions (by deterministic name)                         │
//! │     └── events    (by deterministic name, UID-scoped children)    │
//! │                                                                   │
//! │  ExchangeTable ── ReplyFuture          dispatch ── security       │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ rpcivk / rpcres / rpcive
//!                         reco_bus::Endpoint
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use reco_bus::{BusConfig, MemoryBroker};
//! use reco_rpc::{Handlers, RpcManager};
//!
//! let broker = MemoryBroker::new("reco");
//! let server = RpcManager::new(broker.connect(&BusConfig::named("a"))?);
//! server.register::<Logger>(Handlers::new().on_fn("log", |_, args| async move {
//!     println!("{}", args[0]);
//!     Ok(Value::Null)
//! }))?;
//!
//! let client = RpcManager::new(broker.connect(&BusConfig::named("b"))?);
//! client.bind::<Logger>("a")?.call::<(), _>("log", ("hi",)).await?;
//! ```
//!
//! # Function names
//!
//! Every remote function is named `<interface>.<method>(<t1>,<t2>,...)`, so
//! overloads never collide and names are stable across restarts.

#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod binding;
pub mod compiler;
pub mod domain;
pub mod ipc;
pub mod manager;
pub mod object;

// Re-export main types
pub use binding::{RemoteBinding, Reply};
pub use compiler::{CompileHook, Registry};
pub use domain::*;
pub use ipc::{CallRequest, CallResponse, EventCall};
pub use manager::{Handlers, RpcManager};
pub use object::RemoteObject;
