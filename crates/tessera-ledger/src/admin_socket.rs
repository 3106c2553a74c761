//! Unix socket server for admin commands.
//!
//! The node holds the grid owner's key, so owner operations (column
//! initialization, whitelist management, pause/resume) are issued locally
//! through this socket by the `grid-admin` CLI.

use crate::error::Result;
use crate::ledger::Ledger;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{Color, Identity};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Set every cell of a column to a color
    InitColumn { column: u32, color: Color },
    /// Close the initialization phase
    FinishInit,
    /// Add an identity to the whitelist
    GrantAccess { identity: Identity },
    /// Remove an identity from the whitelist
    RevokeAccess { identity: Identity },
    /// Reject all edits until resumed
    Pause,
    /// Accept edits again
    Resume,
    /// Toggle whitelist enforcement
    SetAccessChecks { enabled: bool },
    /// List whitelisted identities
    ListWhitelist,
    /// Check if an identity is whitelisted
    HasAccess { identity: Identity },
    /// List pending access requests
    ListAccessRequests,
    /// Grid status summary
    Status,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Bool { value: bool },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    ledger: Arc<Ledger>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(ledger: Arc<Ledger>, socket_path: impl AsRef<Path>) -> Self {
        Self {
            ledger,
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let ledger = Arc::clone(&self.ledger);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ledger).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, ledger: Arc<Ledger>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &ledger).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn ok_or_error(result: Result<()>, message: String) -> AdminResponse {
    match result {
        Ok(()) => {
            tracing::info!("{}", message);
            AdminResponse::Ok { message }
        }
        Err(e) => AdminResponse::Error {
            error: e.to_string(),
        },
    }
}

pub(crate) async fn execute_command(cmd: AdminCommand, ledger: &Ledger) -> AdminResponse {
    match cmd {
        AdminCommand::InitColumn { column, color } => ok_or_error(
            ledger.initialize_column(column, color).await,
            format!("Initialized column {} with {}", column, color),
        ),

        AdminCommand::FinishInit => ok_or_error(
            ledger.finish_initialization().await,
            "Initialization finished".to_string(),
        ),

        AdminCommand::GrantAccess { identity } => ok_or_error(
            ledger.grant_access(identity).await,
            format!("Granted access to: {}", identity),
        ),

        AdminCommand::RevokeAccess { identity } => ok_or_error(
            ledger.revoke_access(identity).await,
            format!("Revoked access from: {}", identity),
        ),

        AdminCommand::Pause => ok_or_error(ledger.pause().await, "Grid paused".to_string()),

        AdminCommand::Resume => ok_or_error(ledger.resume().await, "Grid resumed".to_string()),

        AdminCommand::SetAccessChecks { enabled } => ok_or_error(
            ledger.set_requires_access_checks(enabled).await,
            format!("Access checks {}", if enabled { "enabled" } else { "disabled" }),
        ),

        AdminCommand::ListWhitelist => AdminResponse::List {
            items: ledger
                .whitelist()
                .await
                .iter()
                .map(Identity::to_hex)
                .collect(),
        },

        AdminCommand::HasAccess { identity } => AdminResponse::Bool {
            value: ledger.has_access(&identity).await,
        },

        AdminCommand::ListAccessRequests => match ledger.access_requests() {
            Ok(requests) => AdminResponse::List {
                items: requests
                    .iter()
                    .map(|r| format!("{} {:?}", r.identity, r.message))
                    .collect(),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Status => {
            let policy = ledger.policy().await;
            let dimensions = ledger.dimensions().await;
            AdminResponse::List {
                items: vec![
                    format!("grid: {}", policy.grid_id),
                    format!("owner: {}", policy.owner),
                    format!("dimensions: {}", dimensions),
                    format!("sequence: {}", ledger.sequence().await),
                    format!("initialized: {}", policy.initialized),
                    format!("active: {}", policy.active),
                    format!("access checks: {}", policy.requires_access_checks),
                ],
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

/// Default socket path.
pub fn default_socket_path() -> PathBuf {
    let data_dir = std::env::var("GRID_DATA_DIR").unwrap_or_else(|_| "./grid-data".to_string());
    PathBuf::from(data_dir).join("admin.sock")
}
