//! # Register Table
//!
//! In-memory membership store of a discovery node.
//!
//! Invariants, checked on every write:
//! - no two entries share a name
//! - no two entries share an ip
//!
//! Each operation takes the table lock exactly once, so a heartbeat upsert and
//! a cleanup eviction never interleave partially. Reads return owned
//! snapshots; nothing outside the table holds a reference into it.

use log::debug;
use std::collections::HashSet;
use tokio::sync::Mutex;

use super::service_register::{NodeType, ServiceRegister};
use crate::common::error::RegistryError;

#[derive(Default)]
struct Entries {
    /// Kept in insertion order.
    nodes: Vec<ServiceRegister>,
    ips: HashSet<String>,
}

impl Entries {
    fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    fn owner_of(&self, ip: &str) -> Option<&str> {
        if !self.ips.contains(ip) {
            return None;
        }
        self.nodes
            .iter()
            .find(|n| n.ip == ip)
            .map(|n| n.name.as_str())
    }
}

#[derive(Default)]
pub struct RegisterTable {
    entries: Mutex<Entries>,
}

impl RegisterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry or refresh an existing one.
    ///
    /// For a known name the ip, type and heartbeat are updated in place; an ip
    /// change is refused if another name already owns the new ip. For an
    /// unknown name the entry is inserted unless its ip is taken. A rejected
    /// call leaves the table untouched.
    ///
    /// The stored heartbeat never moves backwards.
    pub async fn add_node(&self, node: ServiceRegister) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;

        if let Some(owner) = entries.owner_of(&node.ip) {
            if owner != node.name {
                return Err(RegistryError::IpConflict {
                    ip: node.ip,
                    owner: owner.to_string(),
                });
            }
        }

        match entries.position(&node.name) {
            Some(index) => {
                let previous_ip = entries.nodes[index].ip.clone();
                if previous_ip != node.ip {
                    entries.ips.remove(&previous_ip);
                    entries.ips.insert(node.ip.clone());
                    debug!("{} moved from {} to {}", node.name, previous_ip, node.ip);
                }

                let existing = &mut entries.nodes[index];
                existing.ip = node.ip;
                existing.node_type = node.node_type;
                existing.last_heartbeat = existing.last_heartbeat.max(node.last_heartbeat);
            }
            None => {
                debug!("Registering {}", node);
                entries.ips.insert(node.ip.clone());
                entries.nodes.push(node);
            }
        }

        Ok(())
    }

    /// Remove an entry by name, freeing its ip. Returns the removed entry.
    pub async fn remove_node(&self, name: &str) -> Option<ServiceRegister> {
        let mut entries = self.entries.lock().await;

        let index = entries.position(name)?;
        let removed = entries.nodes.remove(index);
        entries.ips.remove(&removed.ip);

        Some(removed)
    }

    /// Remove `name` only if its last heartbeat is still older than `cutoff`.
    ///
    /// Lets the cleanup pass evict from a snapshot without racing a heartbeat
    /// that arrived after the snapshot was taken.
    pub async fn remove_stale(&self, name: &str, cutoff: f64) -> Option<ServiceRegister> {
        let mut entries = self.entries.lock().await;

        let index = entries.position(name)?;
        if entries.nodes[index].last_heartbeat >= cutoff {
            return None;
        }
        let removed = entries.nodes.remove(index);
        entries.ips.remove(&removed.ip);

        Some(removed)
    }

    pub async fn get_node(&self, name: &str) -> Option<ServiceRegister> {
        let entries = self.entries.lock().await;
        entries.position(name).map(|i| entries.nodes[i].clone())
    }

    /// Entries of one role, in insertion order.
    pub async fn get_nodes_by_type(&self, node_type: NodeType) -> Vec<ServiceRegister> {
        self.entries
            .lock()
            .await
            .nodes
            .iter()
            .filter(|n| n.node_type == node_type)
            .cloned()
            .collect()
    }

    pub async fn get_all_nodes(&self) -> Vec<ServiceRegister> {
        self.entries.lock().await.nodes.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
