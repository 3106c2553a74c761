//! Ledger Node - the daemon entry point.
//!
//! Architecture:
//! - Single process holding the grid state, RocksDB storage and the owner key
//! - HTTP API + WebSocket event stream for browsers
//! - Native wire server (TCP, JSON lines) for Rust clients
//! - Unix admin socket for owner operations (grid-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::ledger::{Genesis, Ledger};
use crate::storage::Storage;
use crate::wire::WireServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tessera_core::{Color, GridDimensions};

/// Whether painting requires being the owner or on the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Whitelist,
    Open,
}

impl AccessMode {
    pub fn requires_access_checks(self) -> bool {
        self == AccessMode::Whitelist
    }
}

impl FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whitelist" => Ok(AccessMode::Whitelist),
            "open" => Ok(AccessMode::Open),
            other => Err(Error::Config(format!(
                "GRID_ACCESS_POLICY must be 'whitelist' or 'open', got {:?}",
                other
            ))),
        }
    }
}

/// Configuration for a ledger node.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Native wire listen address
    pub wire_addr: SocketAddr,

    /// Admin socket path (for grid-admin CLI)
    pub admin_socket: PathBuf,

    /// Grid size used on first deployment
    pub dimensions: GridDimensions,

    /// Color every cell starts with
    pub default_color: Color,

    /// Access policy used on first deployment
    pub access_mode: AccessMode,

    /// Run column initialization on first deployment
    pub auto_initialize: bool,
}

impl LedgerConfig {
    /// Create config from environment variables.
    ///
    /// `GRID_ACCESS_POLICY` has no default and must be set explicitly.
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(env_or("GRID_DATA_DIR", "./grid-data"));

        let api_addr = parse_env("GRID_API_ADDR", "0.0.0.0:8080")?;
        let wire_addr = parse_env("GRID_WIRE_ADDR", "0.0.0.0:9100")?;

        let admin_socket = std::env::var("GRID_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("admin.sock"));

        let rows = parse_env("GRID_ROWS", "16")?;
        let columns = parse_env("GRID_COLUMNS", "16")?;
        let default_color = env_or("GRID_DEFAULT_COLOR", "#ffffff").parse::<Color>()?;

        let access_mode = std::env::var("GRID_ACCESS_POLICY")
            .map_err(|_| Error::Config("GRID_ACCESS_POLICY is not set".into()))?
            .parse()?;

        let auto_initialize = parse_env("GRID_AUTO_INIT", "true")?;

        Ok(Self {
            data_dir,
            api_addr,
            wire_addr,
            admin_socket,
            dimensions: GridDimensions::new(rows, columns),
            default_color,
            access_mode,
            auto_initialize,
        })
    }

    pub fn genesis(&self) -> Genesis {
        Genesis {
            dimensions: self.dimensions,
            default_color: self.default_color,
            requires_access_checks: self.access_mode.requires_access_checks(),
            auto_initialize: self.auto_initialize,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or(name, default)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {}: {}", name, e)))
}

/// A ledger node instance.
pub struct LedgerNode {
    ledger: Arc<Ledger>,
    config: LedgerConfig,
}

impl LedgerNode {
    /// Open storage and load (or deploy) the grid.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(&config.data_dir)?);
        let ledger = Arc::new(Ledger::open(storage, &config.genesis())?);

        Ok(Self { ledger, config })
    }

    /// Shared ledger handle.
    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&self.ledger)
    }

    /// Run the node (commit loop, admin socket, wire server and HTTP API).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Ledger node starting");
        tracing::info!("  Grid: {}", self.ledger.grid_id().await);
        tracing::info!("  Owner: {}", self.ledger.owner());
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Wire: {}", self.config.wire_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);

        tokio::spawn(Arc::clone(&self.ledger).run());

        let admin_socket = AdminSocket::new(self.ledger(), &self.config.admin_socket);
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let wire = WireServer::bind(self.config.wire_addr, self.ledger()).await?;
        tokio::spawn(async move {
            if let Err(e) = wire.run().await {
                tracing::error!("Wire server error: {}", e);
            }
        });

        let app = api::build_router(self.ledger());

        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mode_parsing() {
        assert_eq!("whitelist".parse::<AccessMode>().unwrap(), AccessMode::Whitelist);
        assert_eq!(" OPEN ".parse::<AccessMode>().unwrap(), AccessMode::Open);
        assert!("sometimes".parse::<AccessMode>().is_err());
        assert!(AccessMode::Whitelist.requires_access_checks());
        assert!(!AccessMode::Open.requires_access_checks());
    }
}
