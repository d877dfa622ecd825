//! Protocol messages and their inbound handling.

pub mod dispatch;
pub mod wire;

pub use wire::{CallRequest, CallResponse, EventCall};
