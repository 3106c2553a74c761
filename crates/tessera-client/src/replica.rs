//! Local read-only mirror of the ledger's grid.
//!
//! Loaded from a full snapshot, then kept current by applying change events
//! one cell at a time. Delivery of events is best effort, so the mirror is
//! also reloaded from a fresh snapshot every `resync_interval`, and the
//! subscription is reopened whenever it ends.
//!
//! Every value carries the commit sequence it came from; a cell only ever
//! moves forward, so a late event or an old snapshot cannot roll it back.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tessera_core::{Cell, ChangeEvent, Color, GridDimensions, GridId, GridSnapshot};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::GridSelector;
use crate::error::{ClientError, Result};
use crate::ledger::{ChangeStream, LedgerConnection};

/// Capacity of the observed event channel.
const OBSERVED_CAPACITY: usize = 1024;

struct Mirror {
    colors: Vec<Color>,
    /// Commit sequence each cell's color comes from.
    sequences: Vec<u64>,
    /// Highest sequence seen in a snapshot.
    snapshot_sequence: u64,
}

impl Mirror {
    fn from_snapshot(snapshot: GridSnapshot) -> Self {
        let sequences = vec![snapshot.sequence; snapshot.colors.len()];
        Self {
            colors: snapshot.colors,
            sequences,
            snapshot_sequence: snapshot.sequence,
        }
    }
}

/// Read replica of one grid.
pub struct ReadReplica<L> {
    ledger: Arc<L>,
    grid_id: GridId,
    dimensions: GridDimensions,
    resync_interval: Duration,
    mirror: RwLock<Mirror>,
    observed: broadcast::Sender<ChangeEvent>,
    /// Subscription opened at connect time, handed over to `run`.
    initial_events: Mutex<Option<ChangeStream>>,
}

impl<L: LedgerConnection> ReadReplica<L> {
    /// Subscribe, then load the first snapshot.
    ///
    /// Subscribing first means no event committed after the snapshot can be
    /// missed.
    pub async fn connect(
        ledger: Arc<L>,
        selector: &GridSelector,
        resync_interval: Duration,
    ) -> Result<Self> {
        let events = ledger.subscribe().await?;
        let snapshot = ledger.snapshot().await?;
        selector.check(&snapshot.grid_id)?;
        check_shape(&snapshot)?;

        info!(
            "Replica loaded grid {} ({}) at sequence {}",
            snapshot.grid_id, snapshot.dimensions, snapshot.sequence
        );

        let (observed, _) = broadcast::channel(OBSERVED_CAPACITY);

        Ok(Self {
            ledger,
            grid_id: snapshot.grid_id,
            dimensions: snapshot.dimensions,
            resync_interval,
            mirror: RwLock::new(Mirror::from_snapshot(snapshot)),
            observed,
            initial_events: Mutex::new(Some(events)),
        })
    }

    pub fn grid_id(&self) -> GridId {
        self.grid_id
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    /// Canonical color of a cell, `None` outside the grid.
    pub async fn color(&self, cell: Cell) -> Option<Color> {
        let index = self.dimensions.index(cell).ok()?;
        Some(self.mirror.read().await.colors[index])
    }

    /// All canonical colors, row-major.
    pub async fn colors(&self) -> Vec<Color> {
        self.mirror.read().await.colors.clone()
    }

    /// Change events as they are received, whether or not they changed the
    /// mirror.
    pub fn observe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.observed.subscribe()
    }

    /// Apply a confirmed color. Returns whether the mirror changed.
    ///
    /// Applying the same confirmation twice is a no-op.
    pub async fn apply_confirmed(&self, cell: Cell, color: Color, sequence: u64) -> bool {
        let Ok(index) = self.dimensions.index(cell) else {
            warn!("Ignoring confirmation for {} outside the grid", cell);
            return false;
        };

        let mut mirror = self.mirror.write().await;
        if sequence <= mirror.sequences[index] {
            return false;
        }
        mirror.sequences[index] = sequence;
        let changed = mirror.colors[index] != color;
        mirror.colors[index] = color;
        changed
    }

    pub async fn apply_event(&self, event: &ChangeEvent) -> bool {
        self.apply_confirmed(event.cell, event.color, event.sequence)
            .await
    }

    /// Reload the whole mirror from a fresh snapshot.
    pub async fn resync(&self) -> Result<()> {
        let snapshot = self.ledger.snapshot().await?;
        if snapshot.grid_id != self.grid_id {
            return Err(ClientError::WrongGrid {
                expected: self.grid_id.to_hex(),
                actual: snapshot.grid_id.to_hex(),
            });
        }
        check_shape(&snapshot)?;

        let mut mirror = self.mirror.write().await;
        if snapshot.sequence < mirror.snapshot_sequence {
            debug!("Skipping stale snapshot at sequence {}", snapshot.sequence);
            return Ok(());
        }
        mirror.snapshot_sequence = snapshot.sequence;

        let mut updated = 0;
        for (index, color) in snapshot.colors.into_iter().enumerate() {
            if mirror.sequences[index] <= snapshot.sequence {
                if mirror.colors[index] != color {
                    updated += 1;
                }
                mirror.colors[index] = color;
                mirror.sequences[index] = snapshot.sequence;
            }
        }
        if updated > 0 {
            debug!("Resync updated {} cells", updated);
        }
        Ok(())
    }

    /// Follow the ledger until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.initial_events.lock().await.take();

        let mut resync = tokio::time::interval(self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the mirror is already fresh.
        resync.tick().await;

        loop {
            tokio::select! {
                event = next_event(&mut events) => match event {
                    Some(event) => {
                        self.apply_event(&event).await;
                        let _ = self.observed.send(event);
                    }
                    None => {
                        warn!("Change subscription ended, resubscribing on next resync");
                        events = None;
                    }
                },
                _ = resync.tick() => {
                    if events.is_none() {
                        match self.ledger.subscribe().await {
                            Ok(stream) => {
                                info!("Change subscription reopened");
                                events = Some(stream);
                            }
                            Err(e) => warn!("Failed to resubscribe: {}", e),
                        }
                    }
                    if let Err(e) = self.resync().await {
                        warn!("Resync failed: {}", e);
                    }
                }
            }
        }
    }
}

async fn next_event(events: &mut Option<ChangeStream>) -> Option<ChangeEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn check_shape(snapshot: &GridSnapshot) -> Result<()> {
    // Reshaping validates the length against the dimensions
    snapshot.dimensions.reshape(&snapshot.colors)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;
    use tessera_core::{CorrelationToken, Identity};

    const DEFAULT: Color = Color::from_u32(0xfcfcfc);
    const RED: Color = Color::from_u32(0xf83800);
    const BLUE: Color = Color::from_u32(0x0000fc);

    fn event(sequence: u64, cell: Cell, color: Color) -> ChangeEvent {
        ChangeEvent {
            sequence,
            cell,
            color,
            correlation: CorrelationToken::from_bytes([sequence as u8; 32]),
            signer: Identity::from_bytes([0; 32]),
        }
    }

    async fn replica(ledger: &Arc<MockLedger>) -> Arc<ReadReplica<MockLedger>> {
        Arc::new(
            ReadReplica::connect(
                Arc::clone(ledger),
                &GridSelector::Latest,
                Duration::from_secs(3600),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn loads_snapshot() {
        let ledger = Arc::new(MockLedger::new(GridDimensions::new(16, 16), DEFAULT));
        let replica = replica(&ledger).await;

        assert_eq!(replica.dimensions(), GridDimensions::new(16, 16));
        assert_eq!(replica.colors().await.len(), 256);
        assert_eq!(replica.color(Cell::new(15, 15)).await, Some(DEFAULT));
        assert_eq!(replica.color(Cell::new(16, 0)).await, None);
    }

    #[tokio::test]
    async fn fixed_selector_must_match() {
        let ledger = Arc::new(MockLedger::new(GridDimensions::new(2, 2), DEFAULT));
        let wrong = GridSelector::Fixed(GridId::from_bytes([0xee; 32]));

        let result = ReadReplica::connect(ledger, &wrong, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ClientError::WrongGrid { .. })));
    }

    #[tokio::test]
    async fn events_apply_once_and_never_roll_back() {
        let ledger = Arc::new(MockLedger::new(GridDimensions::new(4, 4), DEFAULT));
        let replica = replica(&ledger).await;
        let cell = Cell::new(1, 2);

        assert!(replica.apply_event(&event(2, cell, BLUE)).await);
        assert!(!replica.apply_event(&event(2, cell, BLUE)).await);

        // An older event for the same cell arriving late is ignored
        assert!(!replica.apply_event(&event(1, cell, RED)).await);
        assert_eq!(replica.color(cell).await, Some(BLUE));
    }

    #[tokio::test]
    async fn resync_keeps_newer_cells() {
        let ledger = Arc::new(MockLedger::new(GridDimensions::new(4, 4), DEFAULT));
        let replica = replica(&ledger).await;

        // The ledger commits one edit; the replica learns of a later one first
        ledger.commit(Cell::new(0, 0), RED).await;
        replica.apply_event(&event(5, Cell::new(0, 1), BLUE)).await;

        replica.resync().await.unwrap();
        assert_eq!(replica.color(Cell::new(0, 0)).await, Some(RED));
        assert_eq!(replica.color(Cell::new(0, 1)).await, Some(BLUE));
    }

    #[tokio::test]
    async fn follows_live_events() {
        let ledger = Arc::new(MockLedger::new(GridDimensions::new(4, 4), DEFAULT));
        let replica = replica(&ledger).await;
        let mut observed = replica.observe();
        tokio::spawn(Arc::clone(&replica).run());

        let committed = ledger.commit(Cell::new(3, 3), RED).await;

        let seen = observed.recv().await.unwrap();
        assert_eq!(seen, committed);
        assert_eq!(replica.color(Cell::new(3, 3)).await, Some(RED));
    }
}
