//! # Communication Node
//!
//! The base every node role is built on: a table mapping message types to
//! handlers, a TCP server feeding that table, and a client for outbound
//! messages.
//!
//! ## Dispatch
//!
//! On receipt, the handler registered for `header.type` is invoked. If there
//! is none the message is dropped silently; an awaiting sender just times out.

use log::{debug, info};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::common::error::TransportError;
use crate::common::messages::Message;
use crate::transport::{self, Dispatcher, HandlerFuture, TcpServer};

/// Type-erased message handler.
pub type Handler = Arc<dyn Fn(Message, Option<SocketAddr>) -> HandlerFuture + Send + Sync>;

type HandlerTable = Arc<RwLock<HashMap<String, Handler>>>;

pub struct CommunicationNode {
    name: String,
    ip: String,
    port: u16,
    handlers: HandlerTable,
    server: Mutex<Option<TcpServer>>,
}

impl CommunicationNode {
    /// Create a node that is not listening yet.
    ///
    /// Handlers can be registered and exercised through
    /// [`dispatch`](Self::dispatch) before [`start_server`](Self::start_server)
    /// is called.
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            server: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Configured listening port (may be `0`, see [`local_addr`](Self::local_addr)).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start listening on `ip:port`. Calling it again while running is a no-op.
    pub async fn start_server(&self) -> Result<SocketAddr, TransportError> {
        let mut server = self.server.lock().await;

        if let Some(running) = server.as_ref().filter(|s| s.is_running()) {
            return Ok(running.local_addr());
        }

        let handlers = self.handlers.clone();
        let dispatcher: Dispatcher = Arc::new(move |message: Message, peer: Option<SocketAddr>| {
            let handlers = handlers.clone();
            Box::pin(async move { dispatch_to(&handlers, message, peer).await }) as HandlerFuture
        });

        let started = TcpServer::bind(&self.ip, self.port, dispatcher).await?;
        let addr = started.local_addr();
        info!("🚀 Node '{}' serving on {}", self.name, addr);

        *server = Some(started);
        Ok(addr)
    }

    /// Stop the listener and every open connection.
    pub async fn stop_server(&self) {
        if let Some(server) = self.server.lock().await.take() {
            server.stop();
            info!("Node '{}' stopped serving on {}", self.name, server.local_addr());
        }
    }

    /// Address the server is bound to, while it runs.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(TcpServer::local_addr)
    }

    /// Register `handler` for messages of `msg_type`, replacing any previous one.
    ///
    /// # Example
    /// ```ignore
    /// node.register_handler("PING", |msg, _peer| async move {
    ///     Some(msg.reply("PONG", "10.0.0.7", Payload::new()))
    /// }).await;
    /// ```
    pub async fn register_handler<F, Fut>(&self, msg_type: &str, handler: F)
    where
        F: Fn(Message, Option<SocketAddr>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Message>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |message: Message, peer: Option<SocketAddr>| {
            Box::pin(handler(message, peer)) as HandlerFuture
        });

        self.handlers
            .write()
            .await
            .insert(msg_type.to_string(), handler);

        debug!("Handler registered for '{}' on node {}", msg_type, self.name);
    }

    /// Whether a handler exists for `msg_type`.
    pub async fn has_handler(&self, msg_type: &str) -> bool {
        self.handlers.read().await.contains_key(msg_type)
    }

    /// Route one message to its handler and return the handler's reply.
    pub async fn dispatch(&self, message: Message, peer: Option<SocketAddr>) -> Option<Message> {
        dispatch_to(&self.handlers, message, peer).await
    }

    /// Send a message to another node. See [`transport::send_message`].
    pub async fn send_message(
        &self,
        ip: &str,
        port: u16,
        message: &Message,
        await_response: bool,
        timeout: Duration,
    ) -> Option<Message> {
        let response = transport::send_message(ip, port, message, await_response, timeout).await;
        debug!(
            "Response from {}:{} -> {:?}",
            ip,
            port,
            response.as_ref().map(Message::msg_type)
        );
        response
    }
}

async fn dispatch_to(handlers: &HandlerTable, message: Message, peer: Option<SocketAddr>) -> Option<Message> {
    // Clone the handler out so the table lock is not held while it runs.
    let handler = handlers.read().await.get(message.msg_type()).cloned();

    match handler {
        Some(handler) => handler(message, peer).await,
        None => {
            debug!("No handler for type '{}'", message.msg_type());
            None
        }
    }
}
