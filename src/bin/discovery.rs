//! # Discovery Binary Entry Point
//!
//! Runs a discovery node until Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin discovery -- --config config/discovery.toml
//! cargo run --bin discovery -- --config config/discovery.toml --subnet 10.0.0.0/24
//! ```
//!
//! Every few seconds the node logs its peer map and the registered nodes.

use clap::Parser;
use log::info;
use std::time::Duration;

use dftp_mesh::common::config::{load_config, DiscoveryNodeConfig};
use dftp_mesh::common::logging::init_logger;
use dftp_mesh::DiscoveryNode;

/// Command-line arguments for the discovery binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the node configuration file (TOML format)
    ///
    /// Example: config/discovery.toml
    #[arg(short, long)]
    config: String,

    /// Address range to scan, overriding the file and DISCOVERY_SUBNET
    #[arg(short, long)]
    subnet: Option<String>,

    /// Seconds between status reports
    #[arg(long, default_value_t = 5)]
    report_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config: DiscoveryNodeConfig = load_config(&args.config)?;
    if let Some(subnet) = args.subnet {
        config.discovery.subnet = Some(subnet);
    }

    let node = DiscoveryNode::from_config(config).await?;
    node.start().await?;

    let mut report = tokio::time::interval(Duration::from_secs(args.report_interval));
    loop {
        tokio::select! {
            _ = report.tick() => {
                info!("[PEERS] {:?}", node.peers().await);
                let registered: Vec<String> = node
                    .register_table()
                    .get_all_nodes()
                    .await
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                info!("[REGISTERED] {:?}", registered);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Stopping discovery node");
    node.shutdown().await;

    Ok(())
}
