//! Node communication wrapper shared by every role.

pub mod background;
pub mod communication;

pub use communication::{CommunicationNode, Handler};
