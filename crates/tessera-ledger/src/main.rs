//! Grid node binary
//!
//! Hosts one collaborative grid: the ledger commit loop, the HTTP API, the
//! native wire server and the owner admin socket.

use tessera_ledger::{LedgerConfig, LedgerNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grid_node=info,tessera_ledger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting grid node");

    let config = LedgerConfig::from_env()?;

    // Create and run node
    let node = LedgerNode::new(config)?;
    node.run().await?;

    Ok(())
}
