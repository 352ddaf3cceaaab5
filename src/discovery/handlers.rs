//! Server side of the discovery protocol.
//!
//! Each handler body returns `Result<Payload, RegistryError>`; the wrapper
//! turns the outcome into an `OK` or `ERROR` reply, so a bad request is
//! always answered and never tears down the connection.

use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

use super::protocol::{self, HeartbeatRequest, NameQuery, Role, RoleQuery};
use super::register_table::RegisterTable;
use super::service_register::{NodeType, ServiceRegister};
use crate::common::error::RegistryError;
use crate::common::messages::{payload, types, Message, Payload, Status};
use crate::node::CommunicationNode;

/// State the handlers need: the responder's identity and its table.
pub struct DiscoveryHandlers {
    name: String,
    ip: String,
    table: Arc<RegisterTable>,
}

impl DiscoveryHandlers {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, table: Arc<RegisterTable>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            table,
        }
    }

    /// Install the four discovery handlers on `comm`.
    pub async fn install(self: &Arc<Self>, comm: &CommunicationNode) {
        let handlers = self.clone();
        comm.register_handler(types::DISCOVERY_HEARTBEAT, move |msg, _| {
            let handlers = handlers.clone();
            async move { Some(handlers.handle_heartbeat(&msg).await) }
        })
        .await;

        let handlers = self.clone();
        comm.register_handler(types::DISCOVERY_QUERY_BY_NAME, move |msg, _| {
            let handlers = handlers.clone();
            async move { Some(handlers.handle_query_by_name(&msg).await) }
        })
        .await;

        let handlers = self.clone();
        comm.register_handler(types::DISCOVERY_QUERY_BY_ROLE, move |msg, _| {
            let handlers = handlers.clone();
            async move { Some(handlers.handle_query_by_role(&msg).await) }
        })
        .await;

        let handlers = self.clone();
        comm.register_handler(types::DISCOVERY_QUERY_ALL, move |msg, _| {
            let handlers = handlers.clone();
            async move { Some(handlers.handle_query_all(&msg).await) }
        })
        .await;
    }

    // ========================================================================
    // HEARTBEAT
    // ========================================================================

    /// Register or refresh the sender. Replies always carry the responder's
    /// own `{ip, name}` so a prober can identify who answered.
    pub async fn handle_heartbeat(&self, message: &Message) -> Message {
        let outcome = self.register_heartbeat(message).await;

        let mut body = payload(json!({ "ip": self.ip, "name": self.name }));
        let body = match outcome {
            Ok(()) => {
                body.insert("status".into(), Status::Ok.as_str().into());
                body
            }
            Err(e) => {
                warn!("⚠️ Heartbeat from {} rejected: {}", message.src(), e);
                body.insert("status".into(), Status::Error.as_str().into());
                body.insert("error_msg".into(), e.to_string().into());
                body
            }
        };

        message.reply(types::DISCOVERY_HEARTBEAT_RESPONSE, self.ip.as_str(), body)
    }

    async fn register_heartbeat(&self, message: &Message) -> Result<(), RegistryError> {
        let request: HeartbeatRequest = protocol::decode(message)?;

        let (name, ip, role) = match (
            protocol::present(request.name),
            protocol::present(request.ip),
            protocol::present(request.role),
        ) {
            (Some(name), Some(ip), Some(role)) => (name, ip, role),
            _ => return Err(RegistryError::Validation("missing fields".into())),
        };

        match role.parse::<Role>()? {
            Role::Discovery => {
                debug!("Heartbeat from peer discovery node {} ({})", name, ip);
                Ok(())
            }
            Role::Service(node_type) => {
                self.table
                    .add_node(ServiceRegister::new(name.as_str(), ip.as_str(), node_type))
                    .await?;
                debug!("💓 Heartbeat from {} ({}) - {}", name, node_type, ip);
                Ok(())
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn handle_query_by_name(&self, message: &Message) -> Message {
        let outcome = self.query_by_name(message).await;
        self.answer(message, types::DISCOVERY_QUERY_BY_NAME_RESPONSE, outcome)
    }

    async fn query_by_name(&self, message: &Message) -> Result<Payload, RegistryError> {
        let query: NameQuery = protocol::decode(message)?;
        let name = protocol::present(query.name)
            .ok_or_else(|| RegistryError::Validation("missing name".into()))?;

        let node = self
            .table
            .get_node(&name)
            .await
            .ok_or_else(|| RegistryError::NotFound(name.clone()))?;

        Ok(payload(json!({ "ip": node.ip, "node": to_value(&node)? })))
    }

    pub async fn handle_query_by_role(&self, message: &Message) -> Message {
        let outcome = self.query_by_role(message).await;
        self.answer(message, types::DISCOVERY_QUERY_BY_ROLE_RESPONSE, outcome)
    }

    async fn query_by_role(&self, message: &Message) -> Result<Payload, RegistryError> {
        let query: RoleQuery = protocol::decode(message)?;
        let role = protocol::present(query.role)
            .ok_or_else(|| RegistryError::Validation("missing role".into()))?;
        let node_type: NodeType = role.parse()?;

        let ips: Vec<String> = self
            .table
            .get_nodes_by_type(node_type)
            .await
            .into_iter()
            .map(|n| n.ip)
            .collect();

        Ok(payload(json!({ "ips": ips })))
    }

    pub async fn handle_query_all(&self, message: &Message) -> Message {
        let outcome = self.query_all().await;
        self.answer(message, types::DISCOVERY_QUERY_ALL_RESPONSE, outcome)
    }

    async fn query_all(&self) -> Result<Payload, RegistryError> {
        let nodes = self
            .table
            .get_all_nodes()
            .await
            .iter()
            .map(to_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(payload(json!({ "nodes": nodes })))
    }

    /// Wrap a query outcome into its reply.
    fn answer(&self, request: &Message, reply_type: &str, outcome: Result<Payload, RegistryError>) -> Message {
        let body = match outcome {
            Ok(mut body) => {
                body.insert("status".into(), Status::Ok.as_str().into());
                body
            }
            Err(e) => {
                info!("Query {} from {} failed: {}", request.msg_type(), request.src(), e);
                payload(json!({ "status": Status::Error.as_str(), "error_msg": e.to_string() }))
            }
        };

        request.reply(reply_type, self.ip.as_str(), body)
    }
}

fn to_value(node: &ServiceRegister) -> Result<Value, RegistryError> {
    serde_json::to_value(node).map_err(|e| RegistryError::Internal(e.to_string()))
}
