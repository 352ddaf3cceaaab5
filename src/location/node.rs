//! # Location Node
//!
//! An ordinary node: a [`CommunicationNode`] for its own traffic plus a
//! [`DiscoveryClient`] that keeps it registered and resolves other nodes.
//! Role-specific handlers go on the same dispatch table regardless of role.

use log::info;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::client::DiscoveryClient;
use crate::common::config::{LocationNodeConfig, LocationSettings, NodeInfo};
use crate::common::error::{ConfigError, TransportError};
use crate::common::messages::Message;
use crate::discovery::NodeType;
use crate::node::CommunicationNode;

pub struct LocationNode {
    comm: Arc<CommunicationNode>,
    discovery: Arc<DiscoveryClient>,
}

impl LocationNode {
    /// Build the node. Nothing listens and no heartbeat runs until
    /// [`start`](Self::start).
    pub fn new(node: NodeInfo, settings: LocationSettings) -> Result<Self, ConfigError> {
        let discovery = DiscoveryClient::new(node.name.as_str(), node.ip.as_str(), settings)?;
        let comm = CommunicationNode::new(node.name, node.ip, node.port);

        Ok(Self {
            comm: Arc::new(comm),
            discovery: Arc::new(discovery),
        })
    }

    pub fn from_config(config: LocationNodeConfig) -> Result<Self, ConfigError> {
        Self::new(config.node, config.location)
    }

    /// Start serving and heartbeating. A second call while running changes
    /// nothing; after [`shutdown`](Self::shutdown) both start again.
    pub async fn start(&self) -> Result<SocketAddr, TransportError> {
        let addr = self.comm.start_server().await?;
        if !self.discovery.start_heartbeat().await {
            return Ok(addr);
        }
        info!(
            "📍 Node '{}' ({}) up on {}",
            self.comm.name(),
            self.discovery.role(),
            addr
        );
        Ok(addr)
    }

    pub async fn shutdown(&self) {
        self.discovery.stop().await;
        self.comm.stop_server().await;
    }

    pub fn comm(&self) -> &Arc<CommunicationNode> {
        &self.comm
    }

    pub fn discovery(&self) -> &Arc<DiscoveryClient> {
        &self.discovery
    }

    pub async fn register_handler<F, Fut>(&self, msg_type: &str, handler: F)
    where
        F: Fn(Message, Option<SocketAddr>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Message>> + Send + 'static,
    {
        self.comm.register_handler(msg_type, handler).await;
    }

    pub async fn send_message(
        &self,
        ip: &str,
        port: u16,
        message: &Message,
        await_response: bool,
        timeout: Duration,
    ) -> Option<Message> {
        self.comm
            .send_message(ip, port, message, await_response, timeout)
            .await
    }

    pub async fn query_by_name(&self, name: &str) -> Option<Message> {
        self.discovery.query_by_name(name).await
    }

    pub async fn query_by_role(&self, role: NodeType) -> Option<Message> {
        self.discovery.query_by_role(role).await
    }
}
