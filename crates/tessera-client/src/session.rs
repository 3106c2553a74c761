//! One painting session: replica, gateway and engine wired together.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::{AccessRequest, Cell, Color, GridDimensions, GridId};
use tokio::task::JoinHandle;
use tracing::info;

use crate::capability::{Capability, CapabilityProvider};
use crate::config::{ClientConfig, GridSelector};
use crate::engine::{EditHandle, ReconciliationEngine};
use crate::error::{EditError, Result};
use crate::gateway::WriteGateway;
use crate::ledger::LedgerConnection;
use crate::remote::{KeyFileProvider, RemoteLedger};
use crate::replica::ReadReplica;

/// Owns everything one client needs; background tasks stop when it drops.
pub struct ClientSession<L: LedgerConnection, P: CapabilityProvider> {
    ledger: Arc<L>,
    engine: ReconciliationEngine<L, P>,
    tasks: Vec<JoinHandle<()>>,
}

impl<L: LedgerConnection, P: CapabilityProvider> ClientSession<L, P> {
    /// Load the grid and start following it.
    ///
    /// No capability is acquired until the first edit.
    pub async fn start(
        ledger: Arc<L>,
        provider: P,
        selector: &GridSelector,
        resync_interval: Duration,
    ) -> Result<Self> {
        let replica =
            Arc::new(ReadReplica::connect(Arc::clone(&ledger), selector, resync_interval).await?);
        let gateway = Arc::new(WriteGateway::new(provider));
        let engine = ReconciliationEngine::new(Arc::clone(&replica), gateway);

        // Observe before following so no applied event is missed
        let observer = engine.spawn_observer();
        let follower = tokio::spawn(replica.run());

        info!("Session started on grid {}", engine.replica().grid_id());

        Ok(Self {
            ledger,
            engine,
            tasks: vec![observer, follower],
        })
    }

    /// Paint one cell. See [`ReconciliationEngine::request_edit`].
    pub async fn paint(&self, cell: Cell, color: Color) -> std::result::Result<EditHandle, EditError> {
        self.engine.request_edit(cell, color).await
    }

    /// Ask the grid owner to whitelist this session's identity.
    ///
    /// The message is signed with the session capability and delivered to
    /// the ledger's moderation endpoint; nothing comes back.
    pub async fn request_access(&self, message: &str) -> std::result::Result<(), EditError> {
        let capability = self.engine.gateway().acquire().await?;
        let identity = capability
            .identities()
            .first()
            .copied()
            .ok_or(EditError::EnvironmentMissing)?;
        let signature = capability
            .sign_message(message)
            .await
            .map_err(|failure| failure.classify())?;

        self.ledger
            .request_access(AccessRequest {
                identity,
                message: message.to_string(),
                signature,
            })
            .await?;
        info!("Access request sent for {}", identity);
        Ok(())
    }

    pub async fn display_color(&self, cell: Cell) -> Option<Color> {
        self.engine.display_color(cell).await
    }

    pub async fn display_rows(&self) -> Vec<Vec<Color>> {
        self.engine.display_rows().await
    }

    pub fn grid_id(&self) -> GridId {
        self.engine.replica().grid_id()
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.engine.replica().dimensions()
    }

    pub fn engine(&self) -> &ReconciliationEngine<L, P> {
        &self.engine
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }
}

impl<L: LedgerConnection, P: CapabilityProvider> Drop for ClientSession<L, P> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A session against a ledger node, signing with a key file.
pub type RemoteSession = ClientSession<RemoteLedger, KeyFileProvider>;

impl RemoteSession {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let ledger = RemoteLedger::new(config.ledger_addr);
        let provider = KeyFileProvider::new(&config.key_file, ledger.clone());
        Self::start(
            Arc::new(ledger),
            provider,
            &config.grid,
            config.resync_interval,
        )
        .await
    }
}
