//! Discovery and messaging substrate for a mesh of role-specific nodes.
//!
//! - [`common`]: message envelope, framing, config, errors, logging
//! - [`transport`]: newline-JSON TCP server, one-shot client, probe fan-out
//! - [`node`]: handler table shared by every role
//! - [`discovery`]: registry node and its register table
//! - [`location`]: discovery client run by ordinary nodes

pub mod common;
pub mod discovery;
pub mod location;
pub mod node;
pub mod transport;

pub use common::messages::{Message, Payload};
pub use discovery::{DiscoveryNode, NodeType, RegisterTable, ServiceRegister};
pub use location::{DiscoveryClient, LocationNode};
pub use node::CommunicationNode;
