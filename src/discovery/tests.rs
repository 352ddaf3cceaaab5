use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::common::config::{DiscoverySettings, NodeInfo};
use crate::common::error::ConfigError;
use crate::common::messages::{payload, types, Message, Payload, Status};

fn settings() -> DiscoverySettings {
    DiscoverySettings {
        subnet: Some("127.0.0.0/30".into()),
        ..DiscoverySettings::default()
    }
}

async fn discovery_node(settings: DiscoverySettings) -> Arc<DiscoveryNode> {
    let info = NodeInfo {
        name: "discovery1".into(),
        ip: "127.0.0.1".into(),
        port: 0,
    };
    DiscoveryNode::new(info, settings).await.unwrap()
}

fn request(msg_type: &str, body: serde_json::Value) -> Message {
    Message::new(msg_type, "10.0.0.99", Some("127.0.0.1".into()), payload(body))
}

async fn heartbeat(node: &DiscoveryNode, name: &str, ip: &str, role: &str) -> Message {
    let msg = request(
        types::DISCOVERY_HEARTBEAT,
        json!({ "name": name, "ip": ip, "role": role }),
    );
    node.comm().dispatch(msg, None).await.unwrap()
}

// ============================================================================
// HEARTBEAT
// ============================================================================

#[tokio::test]
async fn test_heartbeat_registers_and_identifies_responder() {
    let node = discovery_node(settings()).await;

    let reply = heartbeat(&node, "data1", "10.0.0.7", "DATA").await;

    assert_eq!(reply.msg_type(), types::DISCOVERY_HEARTBEAT_RESPONSE);
    assert_eq!(reply.status(), Some(Status::Ok));
    assert_eq!(reply.payload_str("name"), Some("discovery1"));
    assert_eq!(reply.payload_str("ip"), Some("127.0.0.1"));
    assert_eq!(reply.src(), "127.0.0.1");
    assert_eq!(reply.dst(), Some("10.0.0.99"));

    let stored = node.register_table().get_node("data1").await.unwrap();
    assert_eq!(stored.ip, "10.0.0.7");
    assert_eq!(stored.node_type, NodeType::Data);
}

#[tokio::test]
async fn test_peer_heartbeat_leaves_table_alone() {
    let node = discovery_node(settings()).await;

    let reply = heartbeat(&node, "discovery2", "127.0.0.2", "DISCOVERY").await;

    assert!(reply.is_ok());
    assert_eq!(reply.payload_str("name"), Some("discovery1"));
    assert!(node.register_table().is_empty().await);
}

#[tokio::test]
async fn test_heartbeat_missing_fields() {
    let node = discovery_node(settings()).await;

    for body in [
        json!({ "ip": "10.0.0.7", "role": "DATA" }),
        json!({ "name": "data1", "role": "DATA" }),
        json!({ "name": "data1", "ip": "10.0.0.7" }),
        json!({ "name": "", "ip": "10.0.0.7", "role": "DATA" }),
        json!({}),
    ] {
        let reply = node
            .comm()
            .dispatch(request(types::DISCOVERY_HEARTBEAT, body), None)
            .await
            .unwrap();
        assert_eq!(reply.status(), Some(Status::Error));
        assert_eq!(reply.payload_str("error_msg"), Some("missing fields"));
        // still identifies the responder
        assert_eq!(reply.payload_str("name"), Some("discovery1"));
    }

    assert!(node.register_table().is_empty().await);
}

#[tokio::test]
async fn test_heartbeat_invalid_role() {
    let node = discovery_node(settings()).await;

    let reply = heartbeat(&node, "x", "10.0.0.7", "STORAGE").await;

    assert_eq!(reply.status(), Some(Status::Error));
    assert!(reply.payload_str("error_msg").unwrap().contains("invalid role"));
    assert!(node.register_table().get_node("x").await.is_none());
}

#[tokio::test]
async fn test_heartbeat_ip_conflict() {
    let node = discovery_node(settings()).await;
    heartbeat(&node, "nodeA", "10.0.0.5", "DATA").await;

    let reply = heartbeat(&node, "nodeB", "10.0.0.5", "AUTH").await;

    assert_eq!(reply.status(), Some(Status::Error));
    assert!(reply.payload_str("error_msg").unwrap().contains("already exists"));
    assert!(node.register_table().get_node("nodeB").await.is_none());
}

#[tokio::test]
async fn test_heartbeat_with_null_payload() {
    let node = discovery_node(settings()).await;
    let raw = r#"{"header":{"type":"DISCOVERY_HEARTBEAT","src":"10.0.0.99"},"payload":null}"#;
    let msg = Message::from_line(raw).unwrap();

    let reply = node.comm().dispatch(msg, None).await.unwrap();

    assert_eq!(reply.status(), Some(Status::Error));
    assert_eq!(reply.dst(), Some("10.0.0.99"));
}

// ============================================================================
// QUERIES
// ============================================================================

#[tokio::test]
async fn test_query_by_name() {
    let node = discovery_node(settings()).await;
    heartbeat(&node, "auth1", "10.0.0.8", "AUTH").await;

    let reply = node
        .comm()
        .dispatch(request(types::DISCOVERY_QUERY_BY_NAME, json!({ "name": "auth1" })), None)
        .await
        .unwrap();

    assert_eq!(reply.msg_type(), types::DISCOVERY_QUERY_BY_NAME_RESPONSE);
    assert!(reply.is_ok());
    assert_eq!(reply.payload_str("ip"), Some("10.0.0.8"));

    let stored = node.register_table().get_node("auth1").await.unwrap();
    assert_eq!(protocol::node_of(&reply), Some(stored));
}

#[tokio::test]
async fn test_query_by_name_errors() {
    let node = discovery_node(settings()).await;

    let unknown = node
        .comm()
        .dispatch(request(types::DISCOVERY_QUERY_BY_NAME, json!({ "name": "ghost" })), None)
        .await
        .unwrap();
    assert_eq!(unknown.status(), Some(Status::Error));
    assert!(unknown.payload_str("error_msg").unwrap().starts_with("not found"));

    let nameless = node
        .comm()
        .dispatch(request(types::DISCOVERY_QUERY_BY_NAME, json!({})), None)
        .await
        .unwrap();
    assert_eq!(nameless.payload_str("error_msg"), Some("missing name"));
}

#[tokio::test]
async fn test_query_by_role() {
    let node = discovery_node(settings()).await;
    heartbeat(&node, "data1", "10.0.0.7", "DATA").await;
    heartbeat(&node, "data2", "10.0.0.9", "DATA").await;
    heartbeat(&node, "auth1", "10.0.0.8", "AUTH").await;

    let reply = node
        .comm()
        .dispatch(request(types::DISCOVERY_QUERY_BY_ROLE, json!({ "role": "DATA" })), None)
        .await
        .unwrap();

    assert!(reply.is_ok());
    assert_eq!(protocol::ips_of(&reply), vec!["10.0.0.7", "10.0.0.9"]);
}

#[tokio::test]
async fn test_query_by_role_without_matches_is_ok() {
    let node = discovery_node(settings()).await;
    heartbeat(&node, "data1", "10.0.0.7", "DATA").await;

    let reply = node
        .comm()
        .dispatch(request(types::DISCOVERY_QUERY_BY_ROLE, json!({ "role": "ROUTING" })), None)
        .await
        .unwrap();

    assert_eq!(reply.status(), Some(Status::Ok));
    assert_eq!(reply.payload().get("ips"), Some(&json!([])));
}

#[tokio::test]
async fn test_query_by_role_errors() {
    let node = discovery_node(settings()).await;

    let invalid = node
        .comm()
        .dispatch(request(types::DISCOVERY_QUERY_BY_ROLE, json!({ "role": "DISCOVERY" })), None)
        .await
        .unwrap();
    assert_eq!(invalid.status(), Some(Status::Error));
    assert!(invalid.payload_str("error_msg").unwrap().contains("invalid role"));

    let missing = node
        .comm()
        .dispatch(request(types::DISCOVERY_QUERY_BY_ROLE, json!({})), None)
        .await
        .unwrap();
    assert_eq!(missing.payload_str("error_msg"), Some("missing role"));
}

#[tokio::test]
async fn test_query_all() {
    let node = discovery_node(settings()).await;

    let empty = node
        .comm()
        .dispatch(
            Message::new(types::DISCOVERY_QUERY_ALL, "10.0.0.99", None, Payload::new()),
            None,
        )
        .await
        .unwrap();
    assert!(empty.is_ok());
    assert!(protocol::nodes_of(&empty).is_empty());

    heartbeat(&node, "data1", "10.0.0.7", "DATA").await;
    heartbeat(&node, "auth1", "10.0.0.8", "AUTH").await;

    let full = node
        .comm()
        .dispatch(
            Message::new(types::DISCOVERY_QUERY_ALL, "10.0.0.99", None, Payload::new()),
            None,
        )
        .await
        .unwrap();
    let names: Vec<_> = protocol::nodes_of(&full).into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["data1", "auth1"]);
}

// ============================================================================
// PEERS AND CLEANUP
// ============================================================================

#[tokio::test]
async fn test_update_peers_replaces_only_on_change() {
    let node = discovery_node(settings()).await;
    assert!(node.peers().await.is_empty());

    let found: BTreeMap<_, _> = [("discovery2".to_string(), "127.0.0.2".to_string())].into();
    assert!(node.update_peers(found.clone()).await);

    let before = node.peers().await;
    assert!(!node.update_peers(found).await);
    assert!(Arc::ptr_eq(&before, &node.peers().await));

    // silence drops a peer
    assert!(node.update_peers(BTreeMap::new()).await);
    assert!(node.peers().await.is_empty());
}

#[tokio::test]
async fn test_candidates_exclude_self() {
    let node = discovery_node(settings()).await;
    assert_eq!(node.candidates(), &["127.0.0.2".parse::<std::net::Ipv4Addr>().unwrap()]);
}

#[tokio::test]
async fn test_cleanup_evicts_only_silent_entries() {
    let node = discovery_node(settings()).await;
    let now = crate::common::messages::precise_timestamp();

    node.register_table()
        .add_node(ServiceRegister::with_heartbeat("stale", "10.0.0.5", NodeType::Data, now - 30.0))
        .await
        .unwrap();
    node.register_table()
        .add_node(ServiceRegister::with_heartbeat("fresh", "10.0.0.6", NodeType::Data, now))
        .await
        .unwrap();

    let evicted = node.clean_inactive_registers().await;

    assert_eq!(evicted, vec!["stale"]);
    assert!(node.register_table().get_node("stale").await.is_none());
    assert!(node.register_table().get_node("fresh").await.is_some());
}

#[tokio::test]
async fn test_cleanup_loop_keeps_heartbeating_nodes() {
    let node = discovery_node(DiscoverySettings {
        heartbeat_timeout_secs: 1,
        clean_interval_secs: 1,
        ..settings()
    })
    .await;
    assert!(node.start_loops().await);

    heartbeat(&node, "nodeB", "10.0.0.6", "DATA").await;
    for _ in 0..13 {
        heartbeat(&node, "nodeA", "10.0.0.5", "DATA").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let names: Vec<_> = node
        .register_table()
        .get_all_nodes()
        .await
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(names, vec!["nodeA"]);

    node.shutdown().await;
}

#[tokio::test]
async fn test_restart_after_shutdown_resumes_cleanup() {
    let node = discovery_node(DiscoverySettings {
        heartbeat_timeout_secs: 1,
        clean_interval_secs: 1,
        ..settings()
    })
    .await;

    node.start().await.unwrap();
    node.shutdown().await;
    node.start().await.unwrap();

    node.register_table()
        .add_node(ServiceRegister::with_heartbeat("stale", "10.0.0.5", NodeType::Data, 0.0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(node.register_table().get_node("stale").await.is_none());
    node.shutdown().await;
}

#[tokio::test]
async fn test_second_start_keeps_one_set_of_loops() {
    let node = discovery_node(settings()).await;

    let first = node.start().await.unwrap();
    let second = node.start().await.unwrap();

    assert_eq!(first, second);
    assert!(!node.start_loops().await);

    node.shutdown().await;
    assert!(node.start_loops().await);
    node.shutdown().await;
}

#[tokio::test]
async fn test_missing_subnet_is_fatal() {
    std::env::remove_var(crate::common::config::SUBNET_ENV);
    let info = NodeInfo {
        name: "discovery1".into(),
        ip: "127.0.0.1".into(),
        port: 0,
    };

    let result = DiscoveryNode::new(info, DiscoverySettings::default()).await;
    assert!(matches!(result, Err(ConfigError::MissingSubnet)));
}
