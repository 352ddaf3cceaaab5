//! # Discovery Node
//!
//! The registry role. It layers on top of a [`CommunicationNode`]:
//! - the four discovery handlers, answering from its [`RegisterTable`]
//! - a peer loop that scans the address range for other discovery nodes
//! - a cleanup loop that evicts entries whose heartbeats stopped
//!
//! Queries are answered from the local table only. The peer map is kept
//! current and exposed through [`DiscoveryNode::peers`], but nothing is
//! forwarded to peers.

use log::{debug, info};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use super::handlers::DiscoveryHandlers;
use super::protocol::{self, Role};
use super::register_table::RegisterTable;
use crate::common::config::{resolve_subnet, DiscoveryNodeConfig, DiscoverySettings, NodeInfo};
use crate::common::error::{ConfigError, TransportError};
use crate::common::messages::precise_timestamp;
use crate::common::subnet::AddressRange;
use crate::node::background::{run_periodic, Cadence, LoopControl};
use crate::node::CommunicationNode;
use crate::transport::{self, probe};

/// Snapshot of discovered peers: name -> ip.
pub type PeerMap = Arc<BTreeMap<String, String>>;

pub struct DiscoveryNode {
    comm: Arc<CommunicationNode>,
    table: Arc<RegisterTable>,
    settings: DiscoverySettings,
    range: AddressRange,
    candidates: Vec<Ipv4Addr>,
    peers: RwLock<PeerMap>,
    loops: LoopControl,
}

impl DiscoveryNode {
    /// Build a node with its handlers installed. Nothing listens and no loop
    /// runs until [`start`](Self::start).
    ///
    /// Fails if no address range is configured (see
    /// [`resolve_subnet`]).
    pub async fn new(node: NodeInfo, settings: DiscoverySettings) -> Result<Arc<Self>, ConfigError> {
        let range = resolve_subnet(settings.subnet.as_deref())?;
        let candidates = range.candidates(&node.ip);

        let comm = Arc::new(CommunicationNode::new(node.name.as_str(), node.ip.as_str(), node.port));
        let table = Arc::new(RegisterTable::new());

        let handlers = Arc::new(DiscoveryHandlers::new(node.name.as_str(), node.ip.as_str(), table.clone()));
        handlers.install(&comm).await;

        info!(
            "🧭 Discovery node '{}' at {}:{} covering {} ({} candidates)",
            node.name,
            node.ip,
            node.port,
            range,
            candidates.len()
        );

        Ok(Arc::new(Self {
            comm,
            table,
            settings,
            range,
            candidates,
            peers: RwLock::new(Arc::new(BTreeMap::new())),
            loops: LoopControl::new(),
        }))
    }

    pub async fn from_config(config: DiscoveryNodeConfig) -> Result<Arc<Self>, ConfigError> {
        Self::new(config.node, config.discovery).await
    }

    /// Start the server, then both background loops.
    ///
    /// Calling it again while running is a no-op; after
    /// [`shutdown`](Self::shutdown) it starts everything afresh.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, TransportError> {
        let addr = self.comm.start_server().await?;
        self.start_loops().await;
        Ok(addr)
    }

    /// Start the peer and cleanup loops without the server. Returns `false`
    /// if they were already running.
    pub async fn start_loops(self: &Arc<Self>) -> bool {
        match self.loops.begin().await {
            Some(stop) => {
                self.spawn_peer_discovery(stop.clone());
                self.spawn_cleanup(stop);
                true
            }
            None => {
                debug!("Loops of '{}' already running", self.comm.name());
                false
            }
        }
    }

    /// Stop both loops and the server.
    pub async fn shutdown(&self) {
        self.loops.halt().await;
        self.comm.stop_server().await;
        info!("🛑 Discovery node '{}' shut down", self.comm.name());
    }

    pub fn comm(&self) -> &Arc<CommunicationNode> {
        &self.comm
    }

    pub fn register_table(&self) -> &Arc<RegisterTable> {
        &self.table
    }

    pub fn candidates(&self) -> &[Ipv4Addr] {
        &self.candidates
    }

    /// Current peer snapshot.
    pub async fn peers(&self) -> PeerMap {
        self.peers.read().await.clone()
    }

    // ========================================================================
    // PEER DISCOVERY
    // ========================================================================

    fn spawn_peer_discovery(self: &Arc<Self>, stop: watch::Receiver<bool>) {
        info!(
            "🔭 Peer discovery every {:?} over {}",
            self.settings.discovery_interval(),
            self.range
        );

        let node = self.clone();
        tokio::spawn(run_periodic(
            "peer discovery",
            self.settings.discovery_interval(),
            Cadence::WorkFirst,
            stop,
            move || {
                let node = node.clone();
                async move {
                    let found = node.find_peers().await;
                    node.update_peers(found).await;
                }
            },
        ));
    }

    /// Probe every candidate with a `DISCOVERY` heartbeat and collect who
    /// answered.
    pub async fn find_peers(&self) -> BTreeMap<String, String> {
        let port = self.probe_port().await;
        let timeout = self.settings.discovery_timeout();
        let name = self.comm.name();
        let ip = self.comm.ip();

        debug!("Probing {} hosts for peers on port {}", self.candidates.len(), port);

        probe::probe_hosts(
            &self.candidates,
            self.settings.discovery_workers,
            timeout + probe::PROBE_GRACE,
            |host| {
                let target = host.to_string();
                let request = protocol::heartbeat(ip, &target, name, ip, Role::Discovery);
                async move {
                    let reply = transport::send_message(&target, port, &request, true, timeout).await?;
                    protocol::peer_identity(&reply)
                }
            },
        )
        .await
    }

    /// Swap in `found` if it differs from the current peers. Returns whether
    /// the map changed.
    pub async fn update_peers(&self, found: BTreeMap<String, String>) -> bool {
        let mut peers = self.peers.write().await;
        if **peers == found {
            return false;
        }

        info!("🔭 Peers changed: {:?}", found);
        *peers = Arc::new(found);
        true
    }

    /// Peers listen on the same port as this node.
    async fn probe_port(&self) -> u16 {
        match self.comm.local_addr().await {
            Some(addr) => addr.port(),
            None => self.comm.port(),
        }
    }

    // ========================================================================
    // CLEANUP
    // ========================================================================

    fn spawn_cleanup(self: &Arc<Self>, stop: watch::Receiver<bool>) {
        info!(
            "🧹 Cleanup every {:?} (timeout {:?})",
            self.settings.clean_interval(),
            self.settings.heartbeat_timeout()
        );

        let node = self.clone();
        tokio::spawn(run_periodic(
            "cleanup",
            self.settings.clean_interval(),
            Cadence::SleepFirst,
            stop,
            move || {
                let node = node.clone();
                async move {
                    node.clean_inactive_registers().await;
                }
            },
        ));
    }

    /// Evict every entry silent for longer than the heartbeat timeout.
    /// Returns the evicted names.
    pub async fn clean_inactive_registers(&self) -> Vec<String> {
        let now = precise_timestamp();
        let timeout = self.settings.heartbeat_timeout().as_secs_f64();
        let cutoff = now - timeout;

        let mut evicted = Vec::new();
        for node in self.table.get_all_nodes().await {
            if node.silence(now) <= timeout {
                continue;
            }
            if let Some(removed) = self.table.remove_stale(&node.name, cutoff).await {
                info!(
                    "🧹 Evicted {} after {:.1}s of silence",
                    removed,
                    removed.silence(now)
                );
                evicted.push(removed.name);
            }
        }

        evicted
    }
}
