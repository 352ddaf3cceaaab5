//! # Transport
//!
//! Line-framed JSON over TCP.
//!
//! - [`server`]: listener that dispatches inbound frames and writes replies
//! - [`client`]: one-shot `send_message` with an optional awaited reply
//! - [`probe`]: bounded fan-out used by the discovery scans

pub mod client;
pub mod probe;
pub mod server;

pub use client::send_message;
pub use server::TcpServer;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use crate::common::messages::Message;

/// Boxed future returned by a handler: the reply to write back, if any.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Option<Message>> + Send>>;

/// Callback the server invokes for every inbound message, together with the
/// sender's socket address when known.
pub type Dispatcher = Arc<dyn Fn(Message, Option<SocketAddr>) -> HandlerFuture + Send + Sync>;
