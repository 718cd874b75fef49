//! braidnode binary
//!
//! Main entry point for running the local BlockDAG development node.

use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use braidnode::node::{DevNode, NodeConfig};

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("braidnode v{}", env!("CARGO_PKG_VERSION"));
    info!("==================");

    // Load or create configuration
    let config_path = PathBuf::from("braidnode.json");
    let config = if config_path.exists() {
        match NodeConfig::load(&config_path) {
            Ok(cfg) => {
                info!("Loaded configuration from {}", config_path.display());
                cfg
            }
            Err(e) => {
                error!("Failed to load config: {e}");
                std::process::exit(1);
            }
        }
    } else {
        info!("No config file found, using defaults");
        let config = NodeConfig::default();

        // Save defaults for reference
        if let Err(e) = config.save(&config_path) {
            error!("Failed to save default config: {e}");
        } else {
            info!("Saved default configuration to {}", config_path.display());
        }

        config
    };

    info!("Chain ID: {}", config.chain.chain_id);
    info!("Network: {}", config.chain.network_name);
    info!("RPC address: {}", config.rpc.listen_addr);
    info!("WebSocket address: {}", config.rpc.ws_addr);
    info!(
        "Mining: {} blocks / {} ms, up to {} parents",
        config.mining.parallelism, config.mining.block_time_ms, config.mining.max_parents
    );

    let node = match DevNode::new(config) {
        Ok(node) => node,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    info!("Pre-funded accounts:");
    for account in node.dev_accounts() {
        info!("  {account}");
    }

    match node.start().await {
        Ok(()) => {
            info!("Node started successfully");

            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c");

            info!("Received shutdown signal");
            node.stop().await;
        }
        Err(e) => {
            error!("Failed to start node: {e}");
            std::process::exit(1);
        }
    }

    info!("Goodbye!");
}
