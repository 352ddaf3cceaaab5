//! # Discovery Client
//!
//! Peer-discovery logic every ordinary node runs. Each heartbeat round probes
//! the whole address range with a heartbeat carrying this node's role; every
//! discovery node that answers `OK` both registers us and tells us where it
//! is. The answers become the `discovery_nodes` map that queries are sent to.

use log::{debug, info};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::common::config::{resolve_subnet, LocationSettings};
use crate::common::error::ConfigError;
use crate::common::messages::Message;
use crate::common::subnet::AddressRange;
use crate::discovery::protocol::{self, Role};
use crate::discovery::{NodeType, PeerMap, ServiceRegister};
use crate::node::background::{run_periodic, Cadence, LoopControl};
use crate::transport::{self, probe};

pub struct DiscoveryClient {
    name: String,
    ip: String,
    settings: LocationSettings,
    range: AddressRange,
    candidates: Vec<Ipv4Addr>,
    discovery_nodes: RwLock<PeerMap>,
    heartbeat: LoopControl,
}

impl DiscoveryClient {
    /// Fails if no address range is configured.
    pub fn new(
        name: impl Into<String>,
        ip: impl Into<String>,
        settings: LocationSettings,
    ) -> Result<Self, ConfigError> {
        let ip = ip.into();
        let range = resolve_subnet(settings.subnet.as_deref())?;
        let candidates = range.candidates(&ip);

        Ok(Self {
            name: name.into(),
            ip,
            settings,
            range,
            candidates,
            discovery_nodes: RwLock::new(Arc::new(BTreeMap::new())),
            heartbeat: LoopControl::new(),
        })
    }

    pub fn role(&self) -> NodeType {
        self.settings.role
    }

    /// Current snapshot of known discovery nodes: name -> ip.
    pub async fn discovery_nodes(&self) -> PeerMap {
        self.discovery_nodes.read().await.clone()
    }

    // ========================================================================
    // HEARTBEAT LOOP
    // ========================================================================

    /// Run heartbeat rounds until [`stop`](Self::stop). Returns `false`
    /// without starting anything if the loop already runs.
    pub async fn start_heartbeat(self: &Arc<Self>) -> bool {
        let stop = match self.heartbeat.begin().await {
            Some(stop) => stop,
            None => {
                debug!("Heartbeat of '{}' already running", self.name);
                return false;
            }
        };

        info!(
            "💓 Heartbeat every {:?} as {} over {}",
            self.settings.heartbeat_interval(),
            self.settings.role,
            self.range
        );

        let client = self.clone();
        tokio::spawn(run_periodic(
            "heartbeat",
            self.settings.heartbeat_interval(),
            Cadence::WorkFirst,
            stop,
            move || {
                let client = client.clone();
                async move {
                    client.heartbeat_round().await;
                }
            },
        ));
        true
    }

    pub async fn stop(&self) {
        self.heartbeat.halt().await;
    }

    /// One probe cycle followed by the swap. Returns whether the map changed.
    pub async fn heartbeat_round(&self) -> bool {
        let found = self.find_discovery_nodes().await;
        self.update_discovery_nodes(found).await
    }

    /// Heartbeat every candidate and collect the discovery nodes that accepted.
    pub async fn find_discovery_nodes(&self) -> BTreeMap<String, String> {
        let port = self.settings.discovery_port;
        let timeout = self.settings.discovery_timeout();
        let role = Role::Service(self.settings.role);

        debug!("Heartbeating {} hosts on port {}", self.candidates.len(), port);

        probe::probe_hosts(
            &self.candidates,
            self.settings.discovery_workers,
            timeout + probe::PROBE_GRACE,
            |host| {
                let target = host.to_string();
                let request = protocol::heartbeat(&self.ip, &target, &self.name, &self.ip, role);
                async move {
                    let reply = transport::send_message(&target, port, &request, true, timeout).await?;
                    protocol::peer_identity(&reply)
                }
            },
        )
        .await
    }

    /// Swap in `found` if it differs from the current map.
    pub async fn update_discovery_nodes(&self, found: BTreeMap<String, String>) -> bool {
        let mut nodes = self.discovery_nodes.write().await;
        if **nodes == found {
            return false;
        }

        info!("🧭 Discovery nodes changed: {:?}", found);
        *nodes = Arc::new(found);
        true
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Ask a known discovery node for the entry registered under `name`.
    ///
    /// Returns `None` straight away when no discovery node is known.
    pub async fn query_by_name(&self, name: &str) -> Option<Message> {
        let target = self.pick_discovery_node().await?;
        let request = protocol::query_by_name(&self.ip, &target, name);
        self.forward(&target, &request).await
    }

    /// Ask a known discovery node for the addresses registered under `role`.
    pub async fn query_by_role(&self, role: NodeType) -> Option<Message> {
        let target = self.pick_discovery_node().await?;
        let request = protocol::query_by_role(&self.ip, &target, role);
        self.forward(&target, &request).await
    }

    pub async fn query_all(&self) -> Option<Message> {
        let target = self.pick_discovery_node().await?;
        let request = protocol::query_all(&self.ip, &target);
        self.forward(&target, &request).await
    }

    /// Ip registered under `name`, if any.
    pub async fn resolve(&self, name: &str) -> Option<String> {
        let reply = self.query_by_name(name).await?;
        protocol::node_of(&reply).map(|node| node.ip)
    }

    /// Ips registered under `role`; empty when unknown or unreachable.
    pub async fn resolve_role(&self, role: NodeType) -> Vec<String> {
        match self.query_by_role(role).await {
            Some(reply) => protocol::ips_of(&reply),
            None => Vec::new(),
        }
    }

    /// Every registered entry; empty when unknown or unreachable.
    pub async fn registered_nodes(&self) -> Vec<ServiceRegister> {
        match self.query_all().await {
            Some(reply) => protocol::nodes_of(&reply),
            None => Vec::new(),
        }
    }

    /// First entry of the current snapshot.
    async fn pick_discovery_node(&self) -> Option<String> {
        let nodes = self.discovery_nodes().await;
        let picked = nodes.values().next().cloned();
        if picked.is_none() {
            debug!("No discovery node known yet");
        }
        picked
    }

    async fn forward(&self, target: &str, request: &Message) -> Option<Message> {
        transport::send_message(
            target,
            self.settings.discovery_port,
            request,
            true,
            self.settings.query_timeout(),
        )
        .await
    }
}
