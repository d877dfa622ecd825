//! # Reco Test Suite
//!
//! Multi-node scenarios over the in-memory broker.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Shared interfaces, node setup, tracing
//! └── integration/
//!     ├── calls.rs      # Call/response, failures, security, codecs
//!     ├── events.rs     # Remote events and UID scoping
//!     ├── objects.rs    # Remote object proxies
//!     └── routing.rs    # DIRECT, AUX and PUBLISH call routing
//! benches/
//! └── rpc_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests, with logs
//! RUST_LOG=reco_rpc=debug cargo test -p reco-tests
//!
//! # Benchmarks
//! cargo bench -p reco-tests
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;

pub use fixtures::init_tracing;
