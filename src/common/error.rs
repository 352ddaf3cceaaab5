//! # Error Kinds
//!
//! Typed errors for the three places the substrate can fail: the wire
//! (transport), the membership store (registry) and startup (config).
//!
//! Transport errors never reach collaborators: [`send_message`](crate::transport::send_message)
//! collapses them into `None`. Registry errors are turned into `ERROR` replies
//! by the discovery handlers. Config errors are fatal at startup.

use thiserror::Error;

/// Failure while moving a frame across a TCP connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("timed out")]
    Timeout,

    #[error("connection closed before a full frame arrived")]
    Closed,
}

/// Rejection raised by the register table or a discovery handler.
///
/// The variants are kept apart so callers can branch on *why* a request
/// failed instead of matching on strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A required field was missing, empty or had the wrong shape.
    #[error("{0}")]
    Validation(String),

    /// The role token does not name one of the registrable roles.
    #[error("invalid role '{0}'")]
    InvalidRole(String),

    /// The ip is already owned by a different registered name.
    #[error("node ip '{ip}' already exists (owned by '{owner}')")]
    IpConflict { ip: String, owner: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else that went wrong while building a reply.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DISCOVERY_SUBNET not set and no subnet configured")]
    MissingSubnet,

    #[error("invalid subnet '{0}'")]
    InvalidSubnet(String),

    #[error("address range /{prefix} is too large to probe")]
    RangeTooLarge { prefix: u8 },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
