// ABOUTME: Stdio server binary: JSON-RPC requests on stdin, responses on stdout.
// ABOUTME: Configured from the environment (and .env); logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use agent_coord::prelude::*;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = CoordConfig::from_env().context("invalid coordination config")?;
    let coordinator =
        Arc::new(Coordinator::from_config(&config).context("cannot build coordinator")?);

    // Serve even if the store is down; calls reconnect on demand.
    if let Err(e) = coordinator.open().await {
        tracing::warn!(error = %e, "coordination store not reachable at startup");
    }
    tracing::info!(
        operations = coordinator.operations().len(),
        prefix = %config.key_prefix,
        "coord-server ready on stdio"
    );

    let server = RpcServer::new(Arc::clone(&coordinator));
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        served = server.serve(stdin, stdout) => {
            served.context("stdio transport failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    coordinator.close();
    Ok(())
}
