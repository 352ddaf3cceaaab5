//! # Configuration Utilities
//!
//! Node configuration is read from TOML files. Every node needs an address
//! range to probe; it comes from the file's `subnet` key or, failing that,
//! from the `DISCOVERY_SUBNET` environment variable.
//!
//! ## Example: discovery node
//! ```toml
//! [node]
//! name = "discovery1"
//! ip = "10.0.0.2"
//! port = 9100
//!
//! [discovery]
//! subnet = "10.0.0.0/24"
//! heartbeat_timeout_secs = 10
//! clean_interval_secs = 60
//! ```
//!
//! ## Example: location node
//! ```toml
//! [node]
//! name = "data1"
//! ip = "10.0.0.7"
//! port = 9000
//!
//! [location]
//! role = "DATA"
//! discovery_port = 9100
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use super::error::ConfigError;
use super::subnet::AddressRange;
use crate::discovery::NodeType;

/// Environment variable consulted when no subnet is configured.
pub const SUBNET_ENV: &str = "DISCOVERY_SUBNET";

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: DiscoveryNodeConfig = load_config("config/discovery.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path).map_err(ConfigError::from)?;
    let config: T = toml::from_str(&content).map_err(ConfigError::from)?;
    Ok(config)
}

/// Resolve the address range: explicit setting first, then the environment.
pub fn resolve_subnet(configured: Option<&str>) -> Result<AddressRange, ConfigError> {
    match configured {
        Some(subnet) => subnet.parse(),
        None => std::env::var(SUBNET_ENV)
            .map_err(|_| ConfigError::MissingSubnet)?
            .parse(),
    }
}

/// Identity of this node on the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node name (e.g. "discovery1", "data-3")
    pub name: String,
    /// Address other nodes reach this node at (e.g. "10.0.0.7")
    pub ip: String,
    /// Port this node's message server listens on
    pub port: u16,
}

/// Timing and fan-out settings of a discovery node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// CIDR range to scan for peer discovery nodes
    pub subnet: Option<String>,
    /// Entries silent for longer than this are evicted (seconds)
    pub heartbeat_timeout_secs: u64,
    /// How often the cleanup loop runs (seconds)
    pub clean_interval_secs: u64,
    /// How often the peer scan runs (seconds)
    pub discovery_interval_secs: u64,
    /// Per-probe timeout (milliseconds)
    pub discovery_timeout_ms: u64,
    /// Maximum concurrent probes per scan
    pub discovery_workers: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            subnet: None,
            heartbeat_timeout_secs: 10,
            clean_interval_secs: 60,
            discovery_interval_secs: 10,
            discovery_timeout_ms: 800,
            discovery_workers: 32,
        }
    }
}

impl DiscoverySettings {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.clean_interval_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

/// Settings of the discovery client every ordinary node runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    /// Role this node registers under
    pub role: NodeType,
    /// CIDR range to scan for discovery nodes
    #[serde(default)]
    pub subnet: Option<String>,
    /// Port discovery nodes listen on
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Per-probe timeout (milliseconds)
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// How often the heartbeat scan runs (seconds)
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Maximum concurrent probes per scan
    #[serde(default = "default_discovery_workers")]
    pub discovery_workers: usize,
    /// Timeout for queries forwarded to a discovery node (milliseconds)
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl LocationSettings {
    pub fn new(role: NodeType) -> Self {
        Self {
            role,
            subnet: None,
            discovery_port: default_discovery_port(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            discovery_workers: default_discovery_workers(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn default_discovery_port() -> u16 {
    9100
}

fn default_discovery_timeout_ms() -> u64 {
    800
}

fn default_heartbeat_interval_secs() -> u64 {
    2
}

fn default_discovery_workers() -> usize {
    32
}

fn default_query_timeout_ms() -> u64 {
    1000
}

/// Complete configuration file of a discovery node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryNodeConfig {
    pub node: NodeInfo,
    #[serde(default)]
    pub discovery: DiscoverySettings,
}

/// Complete configuration file of an ordinary (location-aware) node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationNodeConfig {
    pub node: NodeInfo,
    pub location: LocationSettings,
}
