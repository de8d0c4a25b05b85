//! Messenger abstractions: inbound updates and the outbound reply port.

pub mod port;
pub mod types;
