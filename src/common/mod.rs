//! # Common Components
//!
//! Shared utilities and data structures used by every node role.
//!
//! ## Modules
//!
//! - [`messages`]: Message envelope and discovery message types
//! - [`connection`]: TCP connection abstraction with line framing
//! - [`config`]: Configuration parsing utilities
//! - [`subnet`]: Address range enumeration for probing
//! - [`error`]: Error kinds
//! - [`logging`]: Logger setup for the binaries

pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod messages;
pub mod subnet;
