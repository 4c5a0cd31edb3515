//! Consensus Node Binary
//!
//! Runs a Halcyon consensus node speaking ABCI to a local CometBFT process.

use chain_core::LedgerChain;
use consensus::{ChainApp, Config, HttpRelay, Result};
use std::sync::Arc;
use tendermint_abci::ServerBuilder;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting Halcyon Consensus Node");

    // Load configuration
    let config = if let Ok(config_path) = std::env::var("CONSENSUS_CONFIG") {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        Config::from_env()?
    };

    info!(
        "Node ID: {}, Chain ID: {}",
        config.node_id, config.chain.chain_id
    );

    // Create chain and relay
    let chain = Arc::new(LedgerChain::new(config.chain.name.clone()));
    let relay = Arc::new(HttpRelay::new(&config.cometbft.rpc_endpoint)?);

    // Create ABCI application
    info!("Creating ABCI application");
    let app = ChainApp::new(chain, relay, &config);

    // Start ABCI server; listen() blocks, so it gets its own thread
    info!("Starting ABCI server on {}", config.cometbft.abci_addr);
    let server = ServerBuilder::default()
        .bind(&config.cometbft.abci_addr, app)
        .map_err(|e| consensus::Error::Abci(format!("failed to bind ABCI server: {}", e)))?;

    let server_handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = server.listen() {
            error!("ABCI server error: {}", e);
        }
    });

    info!("Consensus node running");
    info!("- ABCI: {}", config.cometbft.abci_addr);
    info!("- RPC relay: {}", config.cometbft.rpc_endpoint);
    info!("- Chain: {}", config.chain.chain_id);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // Graceful shutdown
    info!("Shutting down consensus node...");
    server_handle.abort();

    info!("Consensus node stopped");
    Ok(())
}
