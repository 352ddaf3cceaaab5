//! # Message Envelope
//!
//! Every exchange between nodes is a [`Message`]: a header naming the message
//! type and its endpoints, a free-form JSON payload, and metadata stamped once
//! at construction.
//!
//! ## Wire Format
//!
//! One JSON object per line, terminated by a single `\n`:
//! ```text
//! {"header":{"type":"DISCOVERY_HEARTBEAT","src":"10.0.0.7","dst":"10.0.0.2"},"payload":{...},"metadata":{"msg_id":"...","timestamp":1700000000}}\n
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload mapping carried by every message.
pub type Payload = Map<String, Value>;

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Message type tokens understood by the discovery substrate.
pub mod types {
    pub const DISCOVERY_HEARTBEAT: &str = "DISCOVERY_HEARTBEAT";
    pub const DISCOVERY_QUERY_BY_NAME: &str = "DISCOVERY_QUERY_BY_NAME";
    pub const DISCOVERY_QUERY_BY_ROLE: &str = "DISCOVERY_QUERY_BY_ROLE";
    pub const DISCOVERY_QUERY_ALL: &str = "DISCOVERY_QUERY_ALL";

    pub const DISCOVERY_HEARTBEAT_RESPONSE: &str = "DISCOVERY_HEARTBEAT_RESPONSE";
    pub const DISCOVERY_QUERY_BY_NAME_RESPONSE: &str = "DISCOVERY_QUERY_BY_NAME_RESPONSE";
    pub const DISCOVERY_QUERY_BY_ROLE_RESPONSE: &str = "DISCOVERY_QUERY_BY_ROLE_RESPONSE";
    pub const DISCOVERY_QUERY_ALL_RESPONSE: &str = "DISCOVERY_QUERY_ALL_RESPONSE";

    /// Role token a discovery node announces itself with.
    pub const DISCOVERY_ROLE: &str = "DISCOVERY";
}

/// Outcome marker carried in the `status` field of every discovery reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
        }
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub src: String,
    #[serde(default)]
    pub dst: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub msg_id: Uuid,
    /// Unix timestamp (seconds) taken when the message was built. Missing or
    /// null on the wire means "now"; fractional seconds are truncated.
    #[serde(default = "current_timestamp", deserialize_with = "whole_seconds")]
    pub timestamp: i64,
}

impl Metadata {
    /// Fresh id and timestamp.
    pub fn generate() -> Self {
        Self {
            msg_id: Uuid::new_v4(),
            timestamp: current_timestamp(),
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::generate()
    }
}

/// A single protocol message.
///
/// Fields are read-only once built; handlers answer with a new value built
/// through [`Message::reply`] instead of editing the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    header: Header,
    #[serde(default, deserialize_with = "nullable_payload")]
    payload: Payload,
    #[serde(default)]
    metadata: Metadata,
}

impl Message {
    /// Build a message with freshly generated metadata.
    ///
    /// # Example
    /// ```ignore
    /// let msg = Message::new(
    ///     types::DISCOVERY_QUERY_BY_NAME,
    ///     "10.0.0.7",
    ///     Some("10.0.0.2".to_string()),
    ///     payload(json!({ "name": "data-1" })),
    /// );
    /// ```
    pub fn new(
        msg_type: impl Into<String>,
        src: impl Into<String>,
        dst: Option<String>,
        payload: Payload,
    ) -> Self {
        Self::with_metadata(msg_type, src, dst, payload, Metadata::generate())
    }

    /// Build a message around existing metadata (used when rebuilding a
    /// message that was already stamped elsewhere).
    pub fn with_metadata(
        msg_type: impl Into<String>,
        src: impl Into<String>,
        dst: Option<String>,
        payload: Payload,
        metadata: Metadata,
    ) -> Self {
        Self {
            header: Header {
                msg_type: msg_type.into(),
                src: src.into(),
                dst,
            },
            payload,
            metadata,
        }
    }

    /// Build the answer to `self`: addressed back to the request's `src`.
    pub fn reply(&self, msg_type: impl Into<String>, src: impl Into<String>, payload: Payload) -> Self {
        Self::new(msg_type, src, Some(self.header.src.clone()), payload)
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    pub fn src(&self) -> &str {
        &self.header.src
    }

    pub fn dst(&self) -> Option<&str> {
        self.header.dst.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn msg_id(&self) -> Uuid {
        self.metadata.msg_id
    }

    /// String field of the payload, if present and a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// `status` field of a reply.
    pub fn status(&self) -> Option<Status> {
        match self.payload_str("status")? {
            "OK" => Some(Status::Ok),
            "ERROR" => Some(Status::Error),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some(Status::Ok)
    }

    /// Decode the payload into a typed body.
    pub fn decode_payload<T>(&self) -> serde_json::Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }

    /// Serialize to a single `\n`-terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one frame (with or without its trailing newline).
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end_matches(['\n', '\r']))
    }
}

/// Turn a `json!({...})` object into a [`Payload`]; anything else becomes empty.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn nullable_payload<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}

fn whole_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(current_timestamp()),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|secs| secs.trunc() as i64))
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", n))),
        Some(other) => Err(D::Error::custom(format!("timestamp must be a number, got {}", other))),
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Current Unix timestamp in whole seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current Unix timestamp in seconds with millisecond precision.
///
/// Used for heartbeat bookkeeping, where whole seconds are too coarse.
pub fn precise_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
