//! Discovery over loopback: a registry on 127.0.0.1, clients and peers on
//! 127.0.0.2, both inside 127.0.0.0/30.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dftp_mesh::common::config::{DiscoverySettings, LocationSettings, NodeInfo};
use dftp_mesh::common::messages::{payload, types};
use dftp_mesh::discovery::protocol;
use dftp_mesh::{CommunicationNode, DiscoveryClient, DiscoveryNode, LocationNode, Message, NodeType};

const SUBNET: &str = "127.0.0.0/30";

fn info(name: &str, ip: &str, port: u16) -> NodeInfo {
    NodeInfo {
        name: name.into(),
        ip: ip.into(),
        port,
    }
}

fn discovery_settings() -> DiscoverySettings {
    DiscoverySettings {
        subnet: Some(SUBNET.into()),
        discovery_timeout_ms: 300,
        ..DiscoverySettings::default()
    }
}

fn location_settings(role: NodeType, discovery_port: u16) -> LocationSettings {
    LocationSettings {
        subnet: Some(SUBNET.into()),
        discovery_port,
        discovery_timeout_ms: 300,
        heartbeat_interval_secs: 1,
        ..LocationSettings::new(role)
    }
}

/// Registry on 127.0.0.1 with only its server running.
async fn registry() -> (Arc<DiscoveryNode>, u16) {
    let node = DiscoveryNode::new(info("discovery1", "127.0.0.1", 0), discovery_settings())
        .await
        .unwrap();
    let port = node.comm().start_server().await.unwrap().port();
    (node, port)
}

/// Bare node on 127.0.0.1 that accepts every heartbeat and counts them.
async fn counting_registry() -> (CommunicationNode, u16, Arc<AtomicUsize>) {
    let heartbeats = Arc::new(AtomicUsize::new(0));
    let node = CommunicationNode::new("discovery1", "127.0.0.1", 0);

    let counter = heartbeats.clone();
    node.register_handler(types::DISCOVERY_HEARTBEAT, move |msg, _| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(msg.reply(
                types::DISCOVERY_HEARTBEAT_RESPONSE,
                "127.0.0.1",
                payload(json!({ "status": "OK", "name": "discovery1", "ip": "127.0.0.1" })),
            ))
        }
    })
    .await;

    let port = node.start_server().await.unwrap().port();
    (node, port, heartbeats)
}

#[tokio::test]
async fn test_heartbeat_round_finds_registry_and_registers() {
    let (registry, port) = registry().await;
    let client = DiscoveryClient::new("data1", "127.0.0.2", location_settings(NodeType::Data, port)).unwrap();

    assert!(client.heartbeat_round().await);

    let known = client.discovery_nodes().await;
    assert_eq!(known.get("discovery1").map(String::as_str), Some("127.0.0.1"));

    let stored = registry.register_table().get_node("data1").await.unwrap();
    assert_eq!(stored.ip, "127.0.0.2");
    assert_eq!(stored.node_type, NodeType::Data);

    // nothing changed on the second round
    assert!(!client.heartbeat_round().await);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_queries_through_registry() {
    let (registry, port) = registry().await;
    let client = DiscoveryClient::new("auth1", "127.0.0.2", location_settings(NodeType::Auth, port)).unwrap();
    client.heartbeat_round().await;

    let by_name = client.query_by_name("auth1").await.unwrap();
    assert!(by_name.is_ok());
    assert_eq!(by_name.payload_str("ip"), Some("127.0.0.2"));
    assert_eq!(protocol::node_of(&by_name).unwrap().node_type, NodeType::Auth);

    let missing = client.query_by_name("ghost").await.unwrap();
    assert!(!missing.is_ok());

    assert_eq!(client.resolve("auth1").await.as_deref(), Some("127.0.0.2"));
    assert_eq!(client.resolve_role(NodeType::Auth).await, vec!["127.0.0.2"]);
    assert!(client.resolve_role(NodeType::Routing).await.is_empty());

    let all = client.registered_nodes().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "auth1");

    registry.shutdown().await;
}

#[tokio::test]
async fn test_registry_goes_away() {
    let (registry, port) = registry().await;
    let client = DiscoveryClient::new("data1", "127.0.0.2", location_settings(NodeType::Data, port)).unwrap();
    client.heartbeat_round().await;
    assert_eq!(client.discovery_nodes().await.len(), 1);

    registry.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // one silent round drops it
    assert!(client.heartbeat_round().await);
    assert!(client.discovery_nodes().await.is_empty());
    assert!(client.query_by_name("data1").await.is_none());
}

#[tokio::test]
async fn test_discovery_nodes_find_each_other() {
    let (first, port) = registry().await;
    let second = DiscoveryNode::new(info("discovery2", "127.0.0.2", port), discovery_settings())
        .await
        .unwrap();
    second.comm().start_server().await.unwrap();

    let seen_by_first = first.find_peers().await;
    assert!(first.update_peers(seen_by_first).await);
    assert_eq!(
        first.peers().await.get("discovery2").map(String::as_str),
        Some("127.0.0.2")
    );

    let seen_by_second = second.find_peers().await;
    second.update_peers(seen_by_second).await;
    assert_eq!(
        second.peers().await.get("discovery1").map(String::as_str),
        Some("127.0.0.1")
    );

    // peers are never registered as services
    assert!(first.register_table().is_empty().await);
    assert!(second.register_table().is_empty().await);

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn test_location_node_end_to_end() {
    let registry = DiscoveryNode::new(info("discovery1", "127.0.0.1", 0), discovery_settings())
        .await
        .unwrap();
    let registry_port = registry.start().await.unwrap().port();

    let data = LocationNode::new(
        info("data1", "127.0.0.2", 0),
        location_settings(NodeType::Data, registry_port),
    )
    .unwrap();
    data.register_handler("READ", |msg, _| async move {
        Some(msg.reply("READ_RESPONSE", "127.0.0.2", payload(json!({ "status": "OK", "data": "abc" }))))
    })
    .await;
    let data_port = data.start().await.unwrap().port();

    // wait for the heartbeat loop to register the node and learn the registry
    let mut registered = false;
    for _ in 0..30 {
        let stored = registry.register_table().get_node("data1").await.is_some();
        let known = !data.discovery().discovery_nodes().await.is_empty();
        if stored && known {
            registered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(registered);

    let reply = data.query_by_role(NodeType::Data).await.unwrap();
    let ips = protocol::ips_of(&reply);
    assert_eq!(ips, vec!["127.0.0.2"]);

    let read = Message::new("READ", "127.0.0.1", Some(ips[0].clone()), payload(json!({})));
    let answer = data
        .send_message(&ips[0], data_port, &read, true, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(answer.payload_str("data"), Some("abc"));

    data.shutdown().await;
    registry.shutdown().await;
}

#[tokio::test]
async fn test_double_start_sends_one_heartbeat_per_interval() {
    let (registry, port, heartbeats) = counting_registry().await;
    let data = LocationNode::new(
        info("data1", "127.0.0.2", 0),
        location_settings(NodeType::Data, port),
    )
    .unwrap();

    let first = data.start().await.unwrap();
    let second = data.start().await.unwrap();
    assert_eq!(first, second);

    // one loop sends at 0s and 1s; a duplicated loop would double that
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let sent = heartbeats.load(Ordering::SeqCst);
    assert!((1..=2).contains(&sent), "sent {} heartbeats", sent);

    data.shutdown().await;
    registry.stop_server().await;
}

#[tokio::test]
async fn test_location_node_heartbeats_again_after_restart() {
    let (registry, port, heartbeats) = counting_registry().await;
    let data = LocationNode::new(
        info("data1", "127.0.0.2", 0),
        location_settings(NodeType::Data, port),
    )
    .unwrap();

    data.start().await.unwrap();
    data.shutdown().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    heartbeats.store(0, Ordering::SeqCst);

    data.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(heartbeats.load(Ordering::SeqCst) >= 1);
    assert!(!data.discovery().discovery_nodes().await.is_empty());

    data.shutdown().await;
    registry.stop_server().await;
}
