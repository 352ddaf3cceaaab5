//! Request builders and reply readers for the four discovery message types.
//!
//! | Type | Payload in | Payload out |
//! |---|---|---|
//! | `DISCOVERY_HEARTBEAT` | name, ip, role | status, ip, name (+ error_msg) |
//! | `DISCOVERY_QUERY_BY_NAME` | name | status, ip, node (or error_msg) |
//! | `DISCOVERY_QUERY_BY_ROLE` | role | status, ips (or error_msg) |
//! | `DISCOVERY_QUERY_ALL` | - | status, nodes |

use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

use super::service_register::{NodeType, ServiceRegister};
use crate::common::error::RegistryError;
use crate::common::messages::{payload, types, Message, Payload};

/// Role token carried by a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A registrable node.
    Service(NodeType),
    /// Another discovery node; never stored.
    Discovery,
}

impl FromStr for Role {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(types::DISCOVERY_ROLE) {
            return Ok(Role::Discovery);
        }
        s.parse().map(Role::Service)
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Service(t) => t.as_str(),
            Role::Discovery => types::DISCOVERY_ROLE,
        }
    }
}

/// Inbound heartbeat body. Every field is optional on the wire so a partial
/// request still decodes and can be answered with a precise reason.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HeartbeatRequest {
    pub name: Option<String>,
    pub ip: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NameQuery {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoleQuery {
    pub role: Option<String>,
}

/// Empty strings count as absent.
pub fn present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

/// Decode a request body, reporting a shape mismatch as a validation error.
pub fn decode<T>(message: &Message) -> Result<T, RegistryError>
where
    T: for<'de> Deserialize<'de>,
{
    message
        .decode_payload()
        .map_err(|e| RegistryError::Validation(format!("malformed payload: {}", e)))
}

// ============================================================================
// REQUESTS
// ============================================================================

pub fn heartbeat(src: &str, dst: &str, name: &str, ip: &str, role: Role) -> Message {
    Message::new(
        types::DISCOVERY_HEARTBEAT,
        src,
        Some(dst.to_string()),
        payload(json!({ "name": name, "ip": ip, "role": role.as_str() })),
    )
}

pub fn query_by_name(src: &str, dst: &str, name: &str) -> Message {
    Message::new(
        types::DISCOVERY_QUERY_BY_NAME,
        src,
        Some(dst.to_string()),
        payload(json!({ "name": name })),
    )
}

pub fn query_by_role(src: &str, dst: &str, role: NodeType) -> Message {
    Message::new(
        types::DISCOVERY_QUERY_BY_ROLE,
        src,
        Some(dst.to_string()),
        payload(json!({ "role": role.as_str() })),
    )
}

pub fn query_all(src: &str, dst: &str) -> Message {
    Message::new(types::DISCOVERY_QUERY_ALL, src, Some(dst.to_string()), Payload::new())
}

// ============================================================================
// REPLIES
// ============================================================================

/// `(name, ip)` of the responder, if `reply` is a successful heartbeat answer
/// carrying both fields.
pub fn peer_identity(reply: &Message) -> Option<(String, String)> {
    if reply.msg_type() != types::DISCOVERY_HEARTBEAT_RESPONSE || !reply.is_ok() {
        return None;
    }

    let name = reply.payload_str("name").filter(|s| !s.is_empty())?;
    let ip = reply.payload_str("ip").filter(|s| !s.is_empty())?;
    Some((name.to_string(), ip.to_string()))
}

/// Entry carried by a successful by-name answer.
pub fn node_of(reply: &Message) -> Option<ServiceRegister> {
    if !reply.is_ok() {
        return None;
    }
    let node = reply.payload().get("node")?.clone();
    serde_json::from_value(node).ok()
}

/// Addresses carried by a successful by-role answer.
pub fn ips_of(reply: &Message) -> Vec<String> {
    #[derive(Deserialize)]
    struct Ips {
        #[serde(default)]
        ips: Vec<String>,
    }

    if !reply.is_ok() {
        return Vec::new();
    }
    reply.decode_payload::<Ips>().map(|b| b.ips).unwrap_or_default()
}

/// Entries carried by a successful query-all answer.
pub fn nodes_of(reply: &Message) -> Vec<ServiceRegister> {
    #[derive(Deserialize)]
    struct Nodes {
        #[serde(default)]
        nodes: Vec<ServiceRegister>,
    }

    if !reply.is_ok() {
        return Vec::new();
    }
    reply.decode_payload::<Nodes>().map(|b| b.nodes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tokens() {
        assert_eq!("DISCOVERY".parse::<Role>().unwrap(), Role::Discovery);
        assert_eq!("discovery".parse::<Role>().unwrap(), Role::Discovery);
        assert_eq!("AUTH".parse::<Role>().unwrap(), Role::Service(NodeType::Auth));
        assert_eq!(
            "STORAGE".parse::<Role>(),
            Err(RegistryError::InvalidRole("STORAGE".into()))
        );
    }

    #[test]
    fn test_partial_heartbeat_decodes() {
        let msg = Message::new(
            types::DISCOVERY_HEARTBEAT,
            "10.0.0.7",
            None,
            payload(json!({ "name": "data1", "ip": "" })),
        );
        let request: HeartbeatRequest = decode(&msg).unwrap();
        assert_eq!(request.name.as_deref(), Some("data1"));
        assert_eq!(present(request.ip), None);
        assert_eq!(request.role, None);
    }

    #[test]
    fn test_wrong_field_shape_is_validation_error() {
        let msg = Message::new(
            types::DISCOVERY_HEARTBEAT,
            "10.0.0.7",
            None,
            payload(json!({ "name": 42 })),
        );
        let err = decode::<HeartbeatRequest>(&msg).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[test]
    fn test_peer_identity_requires_ok_and_both_fields() {
        let request = heartbeat("10.0.0.2", "10.0.0.3", "discovery1", "10.0.0.2", Role::Discovery);

        let ok = request.reply(
            types::DISCOVERY_HEARTBEAT_RESPONSE,
            "10.0.0.3",
            payload(json!({ "status": "OK", "name": "discovery2", "ip": "10.0.0.3" })),
        );
        assert_eq!(
            peer_identity(&ok),
            Some(("discovery2".to_string(), "10.0.0.3".to_string()))
        );

        let error = request.reply(
            types::DISCOVERY_HEARTBEAT_RESPONSE,
            "10.0.0.3",
            payload(json!({ "status": "ERROR", "name": "discovery2", "ip": "10.0.0.3" })),
        );
        assert_eq!(peer_identity(&error), None);

        let nameless = request.reply(
            types::DISCOVERY_HEARTBEAT_RESPONSE,
            "10.0.0.3",
            payload(json!({ "status": "OK", "ip": "10.0.0.3" })),
        );
        assert_eq!(peer_identity(&nameless), None);
    }

    #[test]
    fn test_ips_of_error_reply_is_empty() {
        let request = query_by_role("10.0.0.7", "10.0.0.2", NodeType::Data);
        let reply = request.reply(
            types::DISCOVERY_QUERY_BY_ROLE_RESPONSE,
            "10.0.0.2",
            payload(json!({ "status": "ERROR", "error_msg": "invalid role" })),
        );
        assert!(ips_of(&reply).is_empty());
    }
}
