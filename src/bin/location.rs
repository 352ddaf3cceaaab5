//! # Location Binary Entry Point
//!
//! Runs an ordinary node that heartbeats to the discovery nodes it finds and
//! periodically resolves its peers.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin location -- --config config/location.toml
//! cargo run --bin location -- --config config/location.toml --role AUTH
//! ```

use clap::Parser;
use log::info;
use std::time::Duration;

use dftp_mesh::common::config::{load_config, LocationNodeConfig};
use dftp_mesh::common::logging::init_logger;
use dftp_mesh::{LocationNode, NodeType};

/// Command-line arguments for the location binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the node configuration file (TOML format)
    ///
    /// Example: config/location.toml
    #[arg(short, long)]
    config: String,

    /// Address range to scan, overriding the file and DISCOVERY_SUBNET
    #[arg(short, long)]
    subnet: Option<String>,

    /// Role to register as, overriding the file (ROUTING/PROCESSING/DATA/AUTH)
    #[arg(short, long)]
    role: Option<String>,

    /// Seconds between status reports
    #[arg(long, default_value_t = 5)]
    report_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config: LocationNodeConfig = load_config(&args.config)?;
    if let Some(subnet) = args.subnet {
        config.location.subnet = Some(subnet);
    }
    if let Some(role) = args.role {
        config.location.role = role.parse::<NodeType>()?;
    }

    let node = LocationNode::from_config(config)?;
    node.start().await?;

    let mut report = tokio::time::interval(Duration::from_secs(args.report_interval));
    loop {
        tokio::select! {
            _ = report.tick() => {
                let discovery = node.discovery();
                info!("[DISCOVERY] {:?}", discovery.discovery_nodes().await);
                for role in NodeType::ALL {
                    info!("[{}] {:?}", role, discovery.resolve_role(role).await);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Stopping node '{}'", node.comm().name());
    node.shutdown().await;

    Ok(())
}
