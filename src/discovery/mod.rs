//! # Discovery
//!
//! Membership registry: the register table, the wire protocol around it and
//! the discovery node that serves it.

pub mod handlers;
pub mod node;
pub mod protocol;
pub mod register_table;
pub mod service_register;

#[cfg(test)]
mod tests;

pub use node::{DiscoveryNode, PeerMap};
pub use protocol::Role;
pub use register_table::RegisterTable;
pub use service_register::{NodeType, ServiceRegister};
