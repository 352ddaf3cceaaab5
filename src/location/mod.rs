//! Client side of discovery, run by every node that is not itself a
//! discovery node.

pub mod client;
pub mod node;

pub use client::DiscoveryClient;
pub use node::LocationNode;
