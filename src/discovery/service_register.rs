//! A single row of the register table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::error::RegistryError;
use crate::common::messages::precise_timestamp;

/// Role of a registrable node.
///
/// Discovery nodes are deliberately absent: they identify themselves with the
/// reserved `DISCOVERY` token and are never stored in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    Routing,
    Processing,
    Data,
    Auth,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Routing,
        NodeType::Processing,
        NodeType::Data,
        NodeType::Auth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Routing => "ROUTING",
            NodeType::Processing => "PROCESSING",
            NodeType::Data => "DATA",
            NodeType::Auth => "AUTH",
        }
    }
}

impl FromStr for NodeType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RegistryError::InvalidRole(s.to_string()))
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node known to a discovery node.
///
/// Serialized as `{"name", "ip", "type", "last_heartbeat"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegister {
    pub name: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Unix seconds of the most recent heartbeat.
    pub last_heartbeat: f64,
}

impl ServiceRegister {
    /// New entry stamped with the current time.
    pub fn new(name: impl Into<String>, ip: impl Into<String>, node_type: NodeType) -> Self {
        Self::with_heartbeat(name, ip, node_type, precise_timestamp())
    }

    pub fn with_heartbeat(
        name: impl Into<String>,
        ip: impl Into<String>,
        node_type: NodeType,
        last_heartbeat: f64,
    ) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            node_type,
            last_heartbeat,
        }
    }

    /// Seconds since the last heartbeat, as seen at `now`.
    pub fn silence(&self, now: f64) -> f64 {
        now - self.last_heartbeat
    }
}

impl fmt::Display for ServiceRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) - {}", self.name, self.node_type, self.ip)
    }
}
