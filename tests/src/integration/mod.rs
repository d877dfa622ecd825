//! Cross-node scenarios.

pub mod calls;
pub mod events;
pub mod objects;
pub mod routing;
