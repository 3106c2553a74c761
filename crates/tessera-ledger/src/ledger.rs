//! The ledger service: ordered commits on top of the [`GridStore`].
//!
//! Paint transactions are accepted into a queue (which is when the
//! submitter learns its correlation token) and committed one by one by
//! [`Ledger::run`]. Each commit is persisted before its [`ChangeEvent`] is
//! broadcast, and broadcasting happens under the state lock, so subscribers
//! see events for a cell in commit order and a snapshot taken after
//! subscribing never misses an event.
//!
//! Owner operations (whitelist, pause, initialization) are signed with the
//! node's owner key and applied directly.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use tessera_core::{
    AccessRequest, Cell, ChangeEvent, Color, CorrelationToken, GridDimensions, GridId,
    GridSnapshot, Identity, PolicySnapshot, Receipt, SignedSetColor,
};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::grid_store::{GridStore, LedgerError};
use crate::storage::Storage;

/// Capacity of the pending transaction queue.
const QUEUE_CAPACITY: usize = 1024;

/// Capacity of the change event broadcast channel.
const EVENT_CAPACITY: usize = 1024;

/// Parameters used the first time a grid is deployed into empty storage.
#[derive(Debug, Clone)]
pub struct Genesis {
    pub dimensions: GridDimensions,
    pub default_color: Color,
    pub requires_access_checks: bool,
    /// Initialize every column and finish initialization right away.
    pub auto_initialize: bool,
}

struct QueuedTx {
    tx: SignedSetColor,
    correlation: CorrelationToken,
    reply: oneshot::Sender<std::result::Result<Receipt, LedgerError>>,
}

/// A transaction accepted for processing.
pub struct Submitted {
    pub correlation: CorrelationToken,
    outcome: oneshot::Receiver<std::result::Result<Receipt, LedgerError>>,
}

impl Submitted {
    /// Wait for the transaction to be committed or rejected.
    pub async fn outcome(self) -> std::result::Result<Receipt, LedgerError> {
        self.outcome
            .await
            .unwrap_or_else(|_| Err(LedgerError::Unavailable("commit loop stopped".into())))
    }
}

/// Ledger service shared by the API, wire server and admin socket.
pub struct Ledger {
    state: RwLock<GridStore>,
    storage: Arc<Storage>,
    owner_key: SigningKey,
    events: broadcast::Sender<ChangeEvent>,
    queue: mpsc::Sender<QueuedTx>,
    queue_rx: Mutex<Option<mpsc::Receiver<QueuedTx>>>,
}

impl Ledger {
    /// Load the grid from storage, deploying a new one if none exists.
    pub fn open(storage: Arc<Storage>, genesis: &Genesis) -> Result<Self> {
        let owner_key = storage.get_or_create_owner_key()?;
        let owner = Identity::of(&owner_key);

        let store = match storage.get_grid()? {
            Some(store) => {
                if store.owner() != owner {
                    return Err(Error::Storage("stored grid belongs to another owner".into()));
                }
                if store.requires_access_checks() != genesis.requires_access_checks {
                    warn!(
                        "Configured access policy differs from the deployed grid; keeping requires_access_checks={}",
                        store.requires_access_checks()
                    );
                }
                info!("Loaded grid {} at sequence {}", store.grid_id(), store.sequence());
                store
            }
            None => {
                let nonce = storage.get_or_create_deployment_nonce()?;
                let mut store = GridStore::new(
                    GridId::derive(&owner, nonce),
                    genesis.dimensions,
                    owner,
                    genesis.requires_access_checks,
                );
                if genesis.auto_initialize {
                    deploy(&mut store, &owner, genesis.default_color)?;
                }
                storage.put_grid(&store)?;
                info!("Deployed grid {} ({})", store.grid_id(), genesis.dimensions);
                store
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (queue, queue_rx) = mpsc::channel(QUEUE_CAPACITY);

        Ok(Self {
            state: RwLock::new(store),
            storage,
            owner_key,
            events,
            queue,
            queue_rx: Mutex::new(Some(queue_rx)),
        })
    }

    /// Commit queued transactions for the lifetime of the node.
    pub async fn run(self: Arc<Self>) {
        let Some(mut rx) = self.queue_rx.lock().await.take() else {
            warn!("Commit loop already running");
            return;
        };
        info!("Commit loop started");

        while let Some(queued) = rx.recv().await {
            let result = self.commit(&queued.tx, queued.correlation).await;
            if let Err(e) = &result {
                debug!("Rejected {:?}: {}", queued.correlation, e);
            }
            // Submitter may have gone away
            let _ = queued.reply.send(result);
        }

        info!("Commit loop stopped");
    }

    /// Accept a signed paint transaction into the queue.
    pub async fn submit(&self, tx: SignedSetColor) -> std::result::Result<Submitted, LedgerError> {
        tx.verify().map_err(|_| LedgerError::InvalidSignature)?;
        if tx.payload.grid_id != self.grid_id().await {
            return Err(LedgerError::WrongGrid);
        }

        let correlation = tx.correlation_token();
        let (reply, outcome) = oneshot::channel();
        self.queue
            .send(QueuedTx {
                tx,
                correlation,
                reply,
            })
            .await
            .map_err(|_| LedgerError::Unavailable("commit queue closed".into()))?;

        debug!("Accepted {:?}", correlation);
        Ok(Submitted {
            correlation,
            outcome,
        })
    }

    async fn commit(
        &self,
        tx: &SignedSetColor,
        correlation: CorrelationToken,
    ) -> std::result::Result<Receipt, LedgerError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let event = next.set_color(&tx.signer, tx.payload.cell, tx.payload.color, correlation)?;

        self.storage
            .put_grid(&next)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        *state = next;

        debug!("Committed #{} {} -> {}", event.sequence, event.cell, event.color);
        // No subscribers is fine
        let _ = self.events.send(event.clone());
        Ok(Receipt::from(&event))
    }

    // --- Reads ---

    /// Subscribe to committed change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Subscribe and take a snapshot without a gap in between.
    ///
    /// Events with a sequence at or below the snapshot's are already
    /// reflected in it.
    pub async fn subscribe_with_snapshot(
        &self,
    ) -> std::result::Result<(GridSnapshot, broadcast::Receiver<ChangeEvent>), LedgerError> {
        let state = self.state.read().await;
        let rx = self.events.subscribe();
        Ok((state.snapshot()?, rx))
    }

    pub async fn snapshot(&self) -> std::result::Result<GridSnapshot, LedgerError> {
        self.state.read().await.snapshot()
    }

    pub async fn get_color(&self, cell: Cell) -> std::result::Result<Color, LedgerError> {
        self.state.read().await.get_color(cell)
    }

    pub async fn policy(&self) -> PolicySnapshot {
        self.state.read().await.policy_snapshot()
    }

    pub async fn has_access(&self, identity: &Identity) -> bool {
        self.state.read().await.has_access(identity)
    }

    pub async fn whitelist(&self) -> Vec<Identity> {
        self.state.read().await.whitelist().copied().collect()
    }

    pub async fn grid_id(&self) -> GridId {
        self.state.read().await.grid_id()
    }

    pub async fn dimensions(&self) -> GridDimensions {
        self.state.read().await.dimensions()
    }

    /// Sequence number of the last committed edit.
    pub async fn sequence(&self) -> u64 {
        self.state.read().await.sequence()
    }

    /// Identity of the grid owner (this node).
    pub fn owner(&self) -> Identity {
        Identity::of(&self.owner_key)
    }

    // --- Owner operations ---

    pub async fn initialize_column(&self, index: u32, color: Color) -> Result<()> {
        self.apply_owner(|store, owner| store.initialize_column(owner, index, color))
            .await
    }

    pub async fn finish_initialization(&self) -> Result<()> {
        self.apply_owner(|store, owner| store.finish_initialization(owner))
            .await
    }

    pub async fn grant_access(&self, identity: Identity) -> Result<()> {
        self.apply_owner(|store, owner| store.grant_access(owner, identity))
            .await
    }

    pub async fn revoke_access(&self, identity: Identity) -> Result<()> {
        self.apply_owner(|store, owner| store.revoke_access(owner, &identity))
            .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.apply_owner(|store, owner| store.pause(owner)).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.apply_owner(|store, owner| store.resume(owner)).await
    }

    pub async fn set_requires_access_checks(&self, enabled: bool) -> Result<()> {
        self.apply_owner(|store, owner| store.set_requires_access_checks(owner, enabled))
            .await
    }

    async fn apply_owner<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut GridStore, &Identity) -> std::result::Result<(), LedgerError>,
    {
        let owner = self.owner();
        let mut state = self.state.write().await;
        let mut next = state.clone();
        op(&mut next, &owner)?;
        self.storage.put_grid(&next)?;
        *state = next;
        Ok(())
    }

    // --- Access requests ---

    /// Verify and store a request to be whitelisted.
    pub fn record_access_request(&self, request: &AccessRequest) -> Result<u64> {
        request.verify()?;
        let seq = self.storage.put_access_request(request)?;
        info!("Access request #{} from {}", seq, request.identity);
        Ok(seq)
    }

    pub fn access_requests(&self) -> Result<Vec<AccessRequest>> {
        self.storage.list_access_requests()
    }
}

/// Initialize every column with `default_color` and close initialization.
fn deploy(store: &mut GridStore, owner: &Identity, default_color: Color) -> Result<()> {
    info!("Initializing {} columns", store.num_columns());
    for column in 0..store.num_columns() {
        store.initialize_column(owner, column, default_color)?;
    }
    store.finish_initialization(owner)?;
    info!("Initialization complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use tessera_core::SetColor;

    fn genesis(requires_access_checks: bool) -> Genesis {
        Genesis {
            dimensions: GridDimensions::new(16, 16),
            default_color: Color::WHITE,
            requires_access_checks,
            auto_initialize: true,
        }
    }

    fn open(requires_access_checks: bool) -> (TempDir, Arc<Ledger>) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let ledger = Arc::new(Ledger::open(storage, &genesis(requires_access_checks)).unwrap());
        tokio::spawn(Arc::clone(&ledger).run());
        (dir, ledger)
    }

    async fn paint(ledger: &Ledger, key: &SigningKey, cell: Cell, color: Color, nonce: u64) -> SignedSetColor {
        SignedSetColor::sign(
            SetColor {
                grid_id: ledger.grid_id().await,
                cell,
                color,
                nonce,
            },
            key,
        )
    }

    #[tokio::test]
    async fn deploys_initialized_grid() {
        let (_dir, ledger) = open(true);
        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.colors.len(), 256);
        assert!(snapshot.colors.iter().all(|c| *c == Color::WHITE));
        assert!(ledger.policy().await.initialized);
    }

    #[tokio::test]
    async fn commit_broadcasts_event_with_correlation() {
        let (_dir, ledger) = open(false);
        let mut events = ledger.subscribe();
        let key = SigningKey::from_bytes(&[5; 32]);
        let tx = paint(&ledger, &key, Cell::new(3, 4), Color::BLACK, 1).await;

        let submitted = ledger.submit(tx.clone()).await.unwrap();
        assert_eq!(submitted.correlation, tx.correlation_token());
        let receipt = submitted.outcome().await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.correlation, receipt.correlation);
        assert_eq!(event.cell, Cell::new(3, 4));
        assert_eq!(ledger.get_color(Cell::new(3, 4)).await.unwrap(), Color::BLACK);
    }

    #[tokio::test]
    async fn rejections_are_reported_after_acceptance() {
        let (_dir, ledger) = open(true);
        let stranger = SigningKey::from_bytes(&[6; 32]);
        let tx = paint(&ledger, &stranger, Cell::new(0, 0), Color::BLACK, 1).await;

        let submitted = ledger.submit(tx).await.unwrap();
        assert!(matches!(
            submitted.outcome().await,
            Err(LedgerError::AccessDenied(_))
        ));

        ledger.pause().await.unwrap();
        let tx = paint(&ledger, &stranger, Cell::new(0, 0), Color::BLACK, 2).await;
        assert_eq!(
            ledger.submit(tx).await.unwrap().outcome().await,
            Err(LedgerError::Inactive)
        );
    }

    #[tokio::test]
    async fn invalid_transactions_are_refused_up_front() {
        let (_dir, ledger) = open(false);
        let key = SigningKey::from_bytes(&[5; 32]);

        let mut forged = paint(&ledger, &key, Cell::new(0, 0), Color::BLACK, 1).await;
        forged.payload.color = Color::WHITE;
        assert_eq!(ledger.submit(forged).await.err(), Some(LedgerError::InvalidSignature));

        let other_grid = SignedSetColor::sign(
            SetColor {
                grid_id: GridId::from_bytes([0; 32]),
                cell: Cell::new(0, 0),
                color: Color::BLACK,
                nonce: 1,
            },
            &key,
        );
        assert_eq!(ledger.submit(other_grid).await.err(), Some(LedgerError::WrongGrid));
    }

    #[tokio::test]
    async fn events_follow_commit_order() {
        let (_dir, ledger) = open(false);
        let mut events = ledger.subscribe();
        let key = SigningKey::from_bytes(&[5; 32]);

        let mut pending = Vec::new();
        for nonce in 0..10u64 {
            let color = Color::from_u32(nonce as u32);
            let tx = paint(&ledger, &key, Cell::new(1, 1), color, nonce).await;
            pending.push(ledger.submit(tx).await.unwrap());
        }
        for submitted in pending {
            submitted.outcome().await.unwrap();
        }

        let mut last = 0;
        for nonce in 0..10u32 {
            let event = events.recv().await.unwrap();
            assert!(event.sequence > last);
            assert_eq!(event.color, Color::from_u32(nonce));
            last = event.sequence;
        }
        assert_eq!(ledger.get_color(Cell::new(1, 1)).await.unwrap(), Color::from_u32(9));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let member = Identity::of(&SigningKey::from_bytes(&[8; 32]));
        let grid_id = {
            let storage = Arc::new(Storage::open(dir.path()).unwrap());
            let ledger = Ledger::open(storage, &genesis(true)).unwrap();
            ledger.grant_access(member).await.unwrap();
            ledger.pause().await.unwrap();
            ledger.grid_id().await
        };

        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let ledger = Ledger::open(storage, &genesis(true)).unwrap();
        assert_eq!(ledger.grid_id().await, grid_id);
        assert!(ledger.has_access(&member).await);
        assert!(!ledger.policy().await.active);
    }

    #[tokio::test]
    async fn owner_operations_update_policy() {
        let (_dir, ledger) = open(true);
        let member = Identity::of(&SigningKey::from_bytes(&[8; 32]));

        ledger.grant_access(member).await.unwrap();
        assert!(ledger.has_access(&member).await);
        assert_eq!(ledger.whitelist().await, vec![member]);

        ledger.revoke_access(member).await.unwrap();
        assert!(!ledger.has_access(&member).await);

        assert!(matches!(
            ledger.finish_initialization().await,
            Err(Error::Ledger(LedgerError::AlreadyInitialized))
        ));
    }
}
