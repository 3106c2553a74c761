//! Optimistic edits reconciled against the ledger.
//!
//! An edit shows up immediately as a pending overlay on its cell. It is
//! settled by whichever arrives first: the capability reporting success, or
//! the replica observing a change event whose correlation token matches the
//! submission. Some environments never report success, and the event stream
//! can outrun the acknowledgement that tells us the correlation token, so
//! events on a cell with an unacknowledged edit are kept until that edit is
//! acknowledged. Events on other cells are never buffered.
//!
//! All bookkeeping lives in one [`Reconciler`] behind one lock; submission
//! signals go through [`Reconciler::apply_signal`] and observed events
//! through [`Reconciler::observe`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::StreamExt;
use tessera_core::{Cell, ChangeEvent, Color, CorrelationToken, Receipt, SetColor};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capability::{
    Capability, CapabilityProvider, RawFailure, SubmissionSignal, SubmissionStream,
};
use crate::error::EditError;
use crate::gateway::WriteGateway;
use crate::ledger::LedgerConnection;
use crate::pending::{LocalToken, PendingEditTracker};
use crate::replica::ReadReplica;

/// Observed events kept per cell while waiting for an acknowledgement.
const UNMATCHED_CAPACITY: usize = 256;

/// A committed edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmed {
    pub cell: Cell,
    pub color: Color,
    pub correlation: CorrelationToken,
    pub sequence: u64,
}

impl From<&Receipt> for Confirmed {
    fn from(receipt: &Receipt) -> Self {
        Self {
            cell: receipt.cell,
            color: receipt.color,
            correlation: receipt.correlation,
            sequence: receipt.sequence,
        }
    }
}

impl From<&ChangeEvent> for Confirmed {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            cell: event.cell,
            color: event.color,
            correlation: event.correlation,
            sequence: event.sequence,
        }
    }
}

/// How an edit settled.
pub type Resolution = Result<Confirmed, EditError>;

/// Handle to one submitted edit.
#[derive(Debug)]
pub struct EditHandle {
    pub cell: Cell,
    pub color: Color,
    pub token: LocalToken,
    resolution: oneshot::Receiver<Resolution>,
}

impl EditHandle {
    /// Wait until the edit is confirmed or rejected.
    ///
    /// There is no timeout; an edit whose confirmation never reaches this
    /// client stays unresolved.
    pub async fn resolution(self) -> Resolution {
        self.resolution
            .await
            .unwrap_or_else(|_| Err(EditError::NetworkOrLedgerFailure("engine stopped".into())))
    }
}

struct InFlight {
    cell: Cell,
    correlation: Option<CorrelationToken>,
    resolve: oneshot::Sender<Resolution>,
}

/// Pending edits and their correlation with ledger events.
#[derive(Default)]
pub struct Reconciler {
    tracker: PendingEditTracker,
    in_flight: HashMap<LocalToken, InFlight>,
    by_correlation: HashMap<CorrelationToken, LocalToken>,
    /// Events seen on cells whose edit is not yet acknowledged.
    unmatched: HashMap<Cell, VecDeque<ChangeEvent>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new edit as pending.
    pub fn begin(&mut self, cell: Cell, color: Color) -> (LocalToken, oneshot::Receiver<Resolution>) {
        let token = self.tracker.set_pending(cell, color);
        let (resolve, resolution) = oneshot::channel();
        self.in_flight.insert(
            token,
            InFlight {
                cell,
                correlation: None,
                resolve,
            },
        );
        (token, resolution)
    }

    /// Advance one submission. Returns whether the signal settled the edit.
    ///
    /// The canonical color of a success is the caller's to apply, before
    /// calling this and whether or not the edit is still in flight.
    pub fn apply_signal(&mut self, local: LocalToken, signal: SubmissionSignal) -> bool {
        match signal {
            SubmissionSignal::Acknowledged(correlation) => {
                let Some(entry) = self.in_flight.get_mut(&local) else {
                    return false;
                };
                entry.correlation = Some(correlation);
                let cell = entry.cell;
                self.by_correlation.insert(correlation, local);
                debug!("Edit {:?} on {} acknowledged as {:?}", local, cell, correlation);

                // The event may have been observed before we knew the token
                let early = self.unmatched.get_mut(&cell).and_then(|events| {
                    let index = events
                        .iter()
                        .position(|event| event.correlation == correlation)?;
                    events.remove(index)
                });
                let settled = match early {
                    Some(event) => {
                        debug!("Edit {:?} matched an event observed earlier", local);
                        self.confirm(local, Confirmed::from(&event))
                    }
                    None => false,
                };
                self.prune_unmatched();
                settled
            }
            SubmissionSignal::Progress(confirmations) => {
                debug!("Edit {:?}: {} confirmations", local, confirmations);
                false
            }
            SubmissionSignal::Succeeded(receipt) => self.confirm(local, Confirmed::from(&receipt)),
            SubmissionSignal::Failed(failure) => self.reject(local, failure.classify()),
        }
    }

    /// Match a change event observed by the replica.
    ///
    /// Events caused by other participants match nothing; the replica has
    /// already applied them to the mirror.
    pub fn observe(&mut self, event: &ChangeEvent) -> bool {
        if let Some(&local) = self.by_correlation.get(&event.correlation) {
            let same_cell = self
                .in_flight
                .get(&local)
                .is_some_and(|entry| entry.cell == event.cell);
            return same_cell && self.confirm(local, Confirmed::from(event));
        }

        if self.awaiting_acknowledgement(event.cell) {
            let events = self.unmatched.entry(event.cell).or_default();
            if events.len() == UNMATCHED_CAPACITY {
                events.pop_front();
            }
            events.push_back(event.clone());
        }
        false
    }

    /// The signal stream of a submission ended.
    ///
    /// An acknowledged edit keeps waiting for its change event. One that was
    /// never acknowledged cannot be matched to anything and fails.
    pub fn stream_ended(&mut self, local: LocalToken) {
        let unacknowledged = self
            .in_flight
            .get(&local)
            .is_some_and(|entry| entry.correlation.is_none());
        if unacknowledged {
            let failure = RawFailure::transport("submission ended without acknowledgement");
            self.reject(local, failure.classify());
        }
    }

    pub fn overlay(&self, cell: Cell) -> Option<Color> {
        self.tracker.overlay(cell)
    }

    pub fn tracker(&self) -> &PendingEditTracker {
        &self.tracker
    }

    /// Edits submitted but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn confirm(&mut self, local: LocalToken, confirmed: Confirmed) -> bool {
        let Some(entry) = self.in_flight.remove(&local) else {
            return false;
        };
        if let Some(correlation) = entry.correlation {
            self.by_correlation.remove(&correlation);
        }
        if !self.tracker.clear_pending(entry.cell, local) {
            debug!("Edit {:?} on {} was superseded", local, entry.cell);
        }
        info!("Edit {:?} confirmed: {} = {}", local, confirmed.cell, confirmed.color);
        let _ = entry.resolve.send(Ok(confirmed));
        self.prune_unmatched();
        true
    }

    fn reject(&mut self, local: LocalToken, error: EditError) -> bool {
        let Some(entry) = self.in_flight.remove(&local) else {
            return false;
        };
        if let Some(correlation) = entry.correlation {
            self.by_correlation.remove(&correlation);
        }
        // Leave a newer edit of the same cell alone
        if self.tracker.current_token(entry.cell) == Some(local) {
            self.tracker.clear_pending_unconditional(entry.cell);
        }
        info!("Edit {:?} on {} failed: {}", local, entry.cell, error);
        let _ = entry.resolve.send(Err(error));
        self.prune_unmatched();
        true
    }

    fn awaiting_acknowledgement(&self, cell: Cell) -> bool {
        self.in_flight
            .values()
            .any(|entry| entry.cell == cell && entry.correlation.is_none())
    }

    /// Forget events on cells that no longer wait for an acknowledgement.
    fn prune_unmatched(&mut self) {
        let in_flight = &self.in_flight;
        self.unmatched.retain(|cell, _| {
            in_flight
                .values()
                .any(|entry| entry.cell == *cell && entry.correlation.is_none())
        });
    }
}

/// Drives edits from request to resolution.
pub struct ReconciliationEngine<L: LedgerConnection, P: CapabilityProvider> {
    replica: Arc<ReadReplica<L>>,
    gateway: Arc<WriteGateway<P>>,
    state: Arc<Mutex<Reconciler>>,
}

impl<L: LedgerConnection, P: CapabilityProvider> Clone for ReconciliationEngine<L, P> {
    fn clone(&self) -> Self {
        Self {
            replica: Arc::clone(&self.replica),
            gateway: Arc::clone(&self.gateway),
            state: Arc::clone(&self.state),
        }
    }
}

impl<L: LedgerConnection, P: CapabilityProvider> ReconciliationEngine<L, P> {
    pub fn new(replica: Arc<ReadReplica<L>>, gateway: Arc<WriteGateway<P>>) -> Self {
        Self {
            replica,
            gateway,
            state: Arc::new(Mutex::new(Reconciler::new())),
        }
    }

    /// Feed change events observed by the replica into the reconciler.
    pub fn spawn_observer(&self) -> JoinHandle<()> {
        let mut events = self.replica.observe();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        state.lock().await.observe(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Reconciler missed {} change events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Request `cell` to be painted `color`.
    ///
    /// Fails right away with [`EditError::NoOp`] when the cell already has
    /// that canonical color, or with the capability error when none can be
    /// acquired. Otherwise the edit is pending and the returned handle
    /// resolves once the ledger settles it.
    pub async fn request_edit(&self, cell: Cell, color: Color) -> Result<EditHandle, EditError> {
        let canonical = self.replica.color(cell).await.ok_or_else(|| {
            EditError::NetworkOrLedgerFailure(format!("cell {} is outside the grid", cell))
        })?;
        if canonical == color {
            debug!("{} already has {}", cell, color);
            return Err(EditError::NoOp);
        }

        let capability = self.gateway.acquire().await?;

        let payload = SetColor {
            grid_id: self.replica.grid_id(),
            cell,
            color,
            nonce: rand::random(),
        };

        let (token, resolution) = self.state.lock().await.begin(cell, color);
        debug!("Edit {:?}: {} -> {}", token, cell, color);

        let signals = capability.submit(payload);
        tokio::spawn(self.clone().drive(token, signals));

        Ok(EditHandle {
            cell,
            color,
            token,
            resolution,
        })
    }

    async fn drive(self, local: LocalToken, mut signals: SubmissionStream) {
        while let Some(signal) = signals.next().await {
            self.apply_signal(local, signal).await;
        }
        self.state.lock().await.stream_ended(local);
    }

    async fn apply_signal(&self, local: LocalToken, signal: SubmissionSignal) {
        let mut state = self.state.lock().await;
        // Canonical color first, so a settled edit never shows the old value
        if let SubmissionSignal::Succeeded(receipt) = &signal {
            self.replica
                .apply_confirmed(receipt.cell, receipt.color, receipt.sequence)
                .await;
        }
        state.apply_signal(local, signal);
    }

    /// Color to show for a cell: the pending overlay, else the canonical color.
    pub async fn display_color(&self, cell: Cell) -> Option<Color> {
        let state = self.state.lock().await;
        if let Some(color) = state.overlay(cell) {
            return Some(color);
        }
        self.replica.color(cell).await
    }

    /// Display colors for the whole grid, one vector per row.
    pub async fn display_rows(&self) -> Vec<Vec<Color>> {
        let state = self.state.lock().await;
        let dimensions = self.replica.dimensions();
        let mut colors = self.replica.colors().await;
        for (cell, pending) in state.tracker().iter() {
            if let Ok(index) = dimensions.index(*cell) {
                colors[index] = pending.color;
            }
        }
        dimensions.reshape(&colors).unwrap_or_default()
    }

    /// Whether a cell has an unconfirmed edit.
    pub async fn is_pending(&self, cell: Cell) -> bool {
        self.state.lock().await.overlay(cell).is_some()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.tracker().len()
    }

    pub fn replica(&self) -> &Arc<ReadReplica<L>> {
        &self.replica
    }

    pub fn gateway(&self) -> &Arc<WriteGateway<P>> {
        &self.gateway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSelector;
    use crate::test_utils::{MockLedger, MockProvider, MockProviderHandle, SubmissionScript};
    use std::time::Duration;
    use tessera_core::{GridDimensions, Identity, RejectCode};
    use tokio::time::timeout;

    const DEFAULT: Color = Color::from_u32(0xfcfcfc);
    const RED: Color = Color::from_u32(0xf83800);
    const BLUE: Color = Color::from_u32(0x0000fc);
    const GREEN: Color = Color::from_u32(0x00b800);

    // --- Reconciler ---

    fn event(sequence: u64, cell: Cell, color: Color, correlation: CorrelationToken) -> ChangeEvent {
        ChangeEvent {
            sequence,
            cell,
            color,
            correlation,
            signer: Identity::from_bytes([0; 32]),
        }
    }

    fn token(byte: u8) -> CorrelationToken {
        CorrelationToken::from_bytes([byte; 32])
    }

    #[test]
    fn late_resolution_keeps_newer_pending_edit() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(0, 0);

        let (r1, mut r1_result) = reconciler.begin(cell, RED);
        let (r2, _r2_result) = reconciler.begin(cell, BLUE);

        // R1 succeeds late and settles, but R2 stays pending
        let receipt = Receipt {
            correlation: token(1),
            sequence: 1,
            cell,
            color: RED,
        };
        assert!(reconciler.apply_signal(r1, SubmissionSignal::Succeeded(receipt)));
        assert_eq!(r1_result.try_recv().unwrap().unwrap().color, RED);
        assert_eq!(reconciler.overlay(cell), Some(BLUE));
        assert_eq!(reconciler.tracker().current_token(cell), Some(r2));
    }

    #[test]
    fn late_failure_keeps_newer_pending_edit() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(0, 0);

        let (r1, mut r1_result) = reconciler.begin(cell, RED);
        let (_r2, _) = reconciler.begin(cell, BLUE);

        let failure = RawFailure::ledger(RejectCode::AccessDenied, "not whitelisted");
        assert!(reconciler.apply_signal(r1, SubmissionSignal::Failed(failure)));
        assert_eq!(r1_result.try_recv().unwrap(), Err(EditError::AccessDenied));
        assert_eq!(reconciler.overlay(cell), Some(BLUE));
    }

    #[test]
    fn failure_clears_own_pending_edit() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(3, 1);
        let (r1, mut result) = reconciler.begin(cell, RED);

        reconciler.apply_signal(r1, SubmissionSignal::Failed(RawFailure::opaque("denied")));
        assert_eq!(
            result.try_recv().unwrap(),
            Err(EditError::UserRejectedSubmission)
        );
        assert_eq!(reconciler.overlay(cell), None);
        assert_eq!(reconciler.in_flight(), 0);
    }

    #[test]
    fn event_then_acknowledgement_still_confirms() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(2, 2);
        let (r1, mut result) = reconciler.begin(cell, GREEN);

        // The event stream outruns the submission handle
        assert!(!reconciler.observe(&event(4, cell, GREEN, token(7))));
        assert!(result.try_recv().is_err());
        assert_eq!(reconciler.overlay(cell), Some(GREEN));

        assert!(reconciler.apply_signal(r1, SubmissionSignal::Acknowledged(token(7))));
        let confirmed = result.try_recv().unwrap().unwrap();
        assert_eq!(confirmed.sequence, 4);
        assert_eq!(reconciler.overlay(cell), None);
        assert_eq!(reconciler.in_flight(), 0);
    }

    #[test]
    fn acknowledgement_then_event_confirms() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(2, 2);
        let (r1, mut result) = reconciler.begin(cell, GREEN);

        reconciler.apply_signal(r1, SubmissionSignal::Acknowledged(token(7)));
        reconciler.observe(&event(4, cell, GREEN, token(7)));

        assert!(result.try_recv().unwrap().is_ok());
        assert_eq!(reconciler.overlay(cell), None);
    }

    #[test]
    fn same_event_twice_settles_once() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(1, 0);
        let (r1, mut result) = reconciler.begin(cell, RED);
        reconciler.apply_signal(r1, SubmissionSignal::Acknowledged(token(3)));

        let confirmation = event(9, cell, RED, token(3));
        assert!(reconciler.observe(&confirmation));
        assert!(result.try_recv().unwrap().is_ok());

        // A newer edit on the same cell is not touched by the duplicate
        let (r2, _) = reconciler.begin(cell, BLUE);
        assert!(!reconciler.observe(&confirmation));
        assert_eq!(reconciler.tracker().current_token(cell), Some(r2));

        // Explicit success after the event is harmless too
        let receipt = Receipt::from(&confirmation);
        assert!(!reconciler.apply_signal(r1, SubmissionSignal::Succeeded(receipt)));
        assert_eq!(reconciler.overlay(cell), Some(BLUE));
    }

    #[test]
    fn event_for_other_cell_does_not_confirm() {
        let mut reconciler = Reconciler::new();
        let (r1, mut result) = reconciler.begin(Cell::new(0, 0), RED);
        reconciler.apply_signal(r1, SubmissionSignal::Acknowledged(token(1)));

        reconciler.observe(&event(2, Cell::new(0, 1), RED, token(1)));
        assert!(result.try_recv().is_err());
        assert_eq!(reconciler.in_flight(), 1);
    }

    #[test]
    fn busy_cells_do_not_evict_an_early_confirmation() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(2, 2);
        let (r1, mut result) = reconciler.begin(cell, GREEN);

        reconciler.observe(&event(1, cell, GREEN, token(7)));
        // Other painters keep editing elsewhere before the acknowledgement
        let busy = Cell::new(9, 9);
        for sequence in 2..(UNMATCHED_CAPACITY as u64 + 10) {
            let correlation = CorrelationToken::digest(&sequence.to_be_bytes());
            assert!(!reconciler.observe(&event(sequence, busy, BLUE, correlation)));
        }

        assert!(reconciler.apply_signal(r1, SubmissionSignal::Acknowledged(token(7))));
        reconciler.stream_ended(r1);
        assert_eq!(result.try_recv().unwrap().unwrap().sequence, 1);
        assert_eq!(reconciler.overlay(cell), None);
        assert_eq!(reconciler.in_flight(), 0);
    }

    #[test]
    fn only_cells_awaiting_acknowledgement_are_buffered() {
        let mut reconciler = Reconciler::new();
        reconciler.observe(&event(1, Cell::new(0, 0), RED, token(1)));
        assert!(reconciler.unmatched.is_empty());

        let (r1, _) = reconciler.begin(Cell::new(5, 5), RED);
        reconciler.observe(&event(2, Cell::new(0, 0), BLUE, token(2)));
        assert!(reconciler.unmatched.is_empty());

        reconciler.observe(&event(3, Cell::new(5, 5), BLUE, token(3)));
        assert_eq!(reconciler.unmatched[&Cell::new(5, 5)].len(), 1);

        // Once the edit is acknowledged its buffer is dropped
        reconciler.apply_signal(r1, SubmissionSignal::Acknowledged(token(9)));
        assert!(reconciler.unmatched.is_empty());
    }

    #[test]
    fn unacknowledged_stream_end_fails() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(0, 0);
        let (r1, mut result) = reconciler.begin(cell, RED);

        reconciler.stream_ended(r1);
        assert!(matches!(
            result.try_recv().unwrap(),
            Err(EditError::NetworkOrLedgerFailure(_))
        ));
        assert_eq!(reconciler.overlay(cell), None);
    }

    #[test]
    fn acknowledged_stream_end_keeps_waiting() {
        let mut reconciler = Reconciler::new();
        let cell = Cell::new(0, 0);
        let (r1, mut result) = reconciler.begin(cell, RED);
        reconciler.apply_signal(r1, SubmissionSignal::Acknowledged(token(1)));

        reconciler.stream_ended(r1);
        assert!(result.try_recv().is_err());
        assert_eq!(reconciler.overlay(cell), Some(RED));
    }

    // --- Engine ---

    struct Fixture {
        ledger: Arc<MockLedger>,
        provider: MockProviderHandle,
        engine: ReconciliationEngine<MockLedger, MockProvider>,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(MockLedger::new(GridDimensions::new(16, 16), DEFAULT));
        let replica = Arc::new(
            ReadReplica::connect(
                Arc::clone(&ledger),
                &GridSelector::Latest,
                Duration::from_secs(3600),
            )
            .await
            .unwrap(),
        );
        tokio::spawn(Arc::clone(&replica).run());

        let (provider, handle) = MockProvider::new(Arc::clone(&ledger), [1; 32]);
        let engine = ReconciliationEngine::new(replica, Arc::new(WriteGateway::new(provider)));
        engine.spawn_observer();

        Fixture {
            ledger,
            provider: handle,
            engine,
        }
    }

    async fn settle(edit: EditHandle) -> Resolution {
        timeout(Duration::from_secs(5), edit.resolution())
            .await
            .expect("edit did not resolve")
    }

    #[tokio::test]
    async fn no_op_never_acquires_or_submits() {
        let f = fixture().await;

        let result = f.engine.request_edit(Cell::new(0, 0), DEFAULT).await;
        assert_eq!(result.err(), Some(EditError::NoOp));
        assert_eq!(f.provider.connect_count(), 0);
        assert_eq!(f.provider.submission_count(), 0);
        assert_eq!(f.engine.pending_count().await, 0);
    }

    #[tokio::test]
    async fn explicit_success() {
        let f = fixture().await;
        let cell = Cell::new(4, 4);

        let edit = f.engine.request_edit(cell, RED).await.unwrap();
        assert_eq!(f.engine.display_color(cell).await, Some(RED));

        let confirmed = settle(edit).await.unwrap();
        assert_eq!(confirmed.color, RED);
        assert!(!f.engine.is_pending(cell).await);
        assert_eq!(f.engine.replica().color(cell).await, Some(RED));
    }

    #[tokio::test]
    async fn success_through_observed_event_only() {
        let f = fixture().await;
        f.provider.set_script(SubmissionScript::CommitSilently);
        let cell = Cell::new(0, 15);

        let edit = f.engine.request_edit(cell, BLUE).await.unwrap();
        settle(edit).await.unwrap();

        assert!(!f.engine.is_pending(cell).await);
        assert_eq!(f.engine.display_color(cell).await, Some(BLUE));
    }

    #[tokio::test]
    async fn event_before_acknowledgement() {
        let f = fixture().await;
        f.provider.set_script(SubmissionScript::Manual);
        let cell = Cell::new(7, 3);

        let edit = f.engine.request_edit(cell, GREEN).await.unwrap();
        let submission = f.provider.next_submission().await;

        // Committed and observed before the acknowledgement is reported
        let mut observed = f.engine.replica().observe();
        submission.commit(&f.ledger).await;
        observed.recv().await.unwrap();
        assert_eq!(f.engine.replica().color(cell).await, Some(GREEN));

        submission.acknowledge();
        submission.finish();

        settle(edit).await.unwrap();
        assert!(!f.engine.is_pending(cell).await);
    }

    #[tokio::test]
    async fn ledger_rejection_is_classified() {
        let f = fixture().await;
        f.provider.set_script(SubmissionScript::Fail(RawFailure::ledger(
            RejectCode::Inactive,
            "grid is paused",
        )));
        let cell = Cell::new(1, 1);

        let edit = f.engine.request_edit(cell, RED).await.unwrap();
        assert_eq!(settle(edit).await, Err(EditError::Inactive));
        assert!(!f.engine.is_pending(cell).await);
        assert_eq!(f.engine.display_color(cell).await, Some(DEFAULT));
    }

    #[tokio::test]
    async fn superseded_edit_resolution() {
        let f = fixture().await;
        f.provider.set_script(SubmissionScript::Manual);
        let cell = Cell::new(0, 0);

        let first = f.engine.request_edit(cell, RED).await.unwrap();
        let s1 = f.provider.next_submission().await;
        let second = f.engine.request_edit(cell, BLUE).await.unwrap();
        let s2 = f.provider.next_submission().await;
        assert_eq!(f.engine.display_color(cell).await, Some(BLUE));

        // The first edit lands late: canonical moves, overlay stays
        s1.acknowledge();
        let receipt = s1.commit(&f.ledger).await;
        s1.succeed(receipt);
        settle(first).await.unwrap();
        assert_eq!(f.engine.replica().color(cell).await, Some(RED));
        assert_eq!(f.engine.display_color(cell).await, Some(BLUE));
        assert!(f.engine.is_pending(cell).await);

        // Only the second edit's own resolution clears it
        s2.acknowledge();
        let receipt = s2.commit(&f.ledger).await;
        s2.succeed(receipt);
        settle(second).await.unwrap();
        assert!(!f.engine.is_pending(cell).await);
        assert_eq!(f.engine.display_color(cell).await, Some(BLUE));
    }

    #[tokio::test]
    async fn foreign_edits_update_the_mirror() {
        let f = fixture().await;
        let mine = Cell::new(2, 2);
        let theirs = Cell::new(9, 9);

        f.provider.set_script(SubmissionScript::Manual);
        let _edit = f.engine.request_edit(mine, RED).await.unwrap();
        let _submission = f.provider.next_submission().await;

        let mut observed = f.engine.replica().observe();
        f.ledger.commit(theirs, GREEN).await;
        observed.recv().await.unwrap();

        assert_eq!(f.engine.display_color(theirs).await, Some(GREEN));
        assert!(!f.engine.is_pending(theirs).await);
        assert_eq!(f.engine.display_color(mine).await, Some(RED));
        assert_eq!(f.engine.pending_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_edits_share_one_capability() {
        let f = fixture().await;
        f.provider.hold_connect();

        let a = tokio::spawn({
            let engine = f.engine.clone();
            async move { engine.request_edit(Cell::new(0, 1), RED).await }
        });
        let b = tokio::spawn({
            let engine = f.engine.clone();
            async move { engine.request_edit(Cell::new(0, 2), BLUE).await }
        });

        f.provider.wait_for_connects(1).await;
        tokio::task::yield_now().await;
        f.provider.release_connect();

        settle(a.await.unwrap().unwrap()).await.unwrap();
        settle(b.await.unwrap().unwrap()).await.unwrap();
        assert_eq!(f.provider.connect_count(), 1);

        let rows = f.engine.display_rows().await;
        assert_eq!(rows.len(), 16);
        assert_eq!(rows[0][1], RED);
        assert_eq!(rows[0][2], BLUE);
    }

    #[tokio::test]
    async fn denied_capability_leaves_no_pending_edit() {
        let f = fixture().await;
        f.provider.fail_connect(EditError::CapabilityDenied);

        let result = f.engine.request_edit(Cell::new(3, 3), RED).await;
        assert_eq!(result.err(), Some(EditError::CapabilityDenied));
        assert_eq!(f.engine.pending_count().await, 0);
        assert_eq!(f.provider.submission_count(), 0);
    }
}
