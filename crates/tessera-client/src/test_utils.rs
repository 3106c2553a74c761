//! Test utilities for mocking the ledger and the capability provider.
//!
//! [`MockLedger`] is an in-memory grid with a change broadcast. Commits made
//! through it reach every subscription, the same way a ledger node's
//! committed transactions do. [`MockProvider`] hands out capabilities backed
//! by a fixed signing key; its [`MockProviderHandle`] controls how
//! connection attempts and submissions behave.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::future::ready;
use futures::StreamExt;
use tessera_core::{
    AccessRequest, Cell, ChangeEvent, Color, CorrelationToken, GridDimensions, GridId,
    GridSnapshot, Identity, Receipt, SetColor, Signature, SignedSetColor,
};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_stream::wrappers::BroadcastStream;

use crate::capability::{
    Capability, CapabilityProvider, RawFailure, SubmissionSignal, SubmissionStream,
};
use crate::error::{EditError, Result};
use crate::ledger::{ChangeStream, LedgerConnection};

/// Grid id every mock ledger reports.
pub const MOCK_GRID_ID: GridId = GridId::from_bytes([0x11; 32]);

#[derive(Debug)]
struct MockGrid {
    dimensions: GridDimensions,
    colors: Vec<Color>,
    sequence: u64,
}

/// In-memory ledger.
#[derive(Debug)]
pub struct MockLedger {
    grid: Mutex<MockGrid>,
    events: broadcast::Sender<ChangeEvent>,
    access_requests: Mutex<Vec<AccessRequest>>,
}

impl MockLedger {
    pub fn new(dimensions: GridDimensions, default_color: Color) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            grid: Mutex::new(MockGrid {
                dimensions,
                colors: vec![default_color; dimensions.len()],
                sequence: 0,
            }),
            events,
            access_requests: Mutex::new(Vec::new()),
        }
    }

    /// Commit an edit made by someone else.
    pub async fn commit(&self, cell: Cell, color: Color) -> ChangeEvent {
        let sequence = self.grid.lock().await.sequence + 1;
        let correlation = CorrelationToken::digest(&sequence.to_be_bytes());
        self.commit_with(cell, color, correlation, Identity::from_bytes([0xab; 32]))
            .await
    }

    /// Commit an edit with a given correlation token and signer.
    pub async fn commit_with(
        &self,
        cell: Cell,
        color: Color,
        correlation: CorrelationToken,
        signer: Identity,
    ) -> ChangeEvent {
        let mut grid = self.grid.lock().await;
        let index = grid
            .dimensions
            .index(cell)
            .expect("mock commit outside the grid");
        grid.sequence += 1;
        grid.colors[index] = color;

        let event = ChangeEvent {
            sequence: grid.sequence,
            cell,
            color,
            correlation,
            signer,
        };
        // Broadcast under the lock, in commit order
        let _ = self.events.send(event.clone());
        event
    }

    pub async fn access_requests(&self) -> Vec<AccessRequest> {
        self.access_requests.lock().await.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl LedgerConnection for MockLedger {
    async fn snapshot(&self) -> Result<GridSnapshot> {
        let grid = self.grid.lock().await;
        Ok(GridSnapshot {
            grid_id: MOCK_GRID_ID,
            dimensions: grid.dimensions,
            colors: grid.colors.clone(),
            sequence: grid.sequence,
        })
    }

    async fn subscribe(&self) -> Result<ChangeStream> {
        // A lagged or closed channel ends the stream
        let stream = BroadcastStream::new(self.events.subscribe())
            .take_while(|event| ready(event.is_ok()))
            .filter_map(|event| ready(event.ok()));
        Ok(stream.boxed())
    }

    async fn request_access(&self, request: AccessRequest) -> Result<()> {
        self.access_requests.lock().await.push(request);
        Ok(())
    }
}

/// How mock capabilities answer submissions.
#[derive(Debug, Clone)]
pub enum SubmissionScript {
    /// Acknowledge, commit to the mock ledger, report success.
    Commit,
    /// Acknowledge and commit, but never report success.
    CommitSilently,
    /// Report this failure without committing.
    Fail(RawFailure),
    /// Hand every submission to the test through
    /// [`MockProviderHandle::next_submission`].
    Manual,
}

/// A submission driven by the test.
pub struct ManualSubmission {
    pub tx: SignedSetColor,
    signals: UnboundedSender<SubmissionSignal>,
}

impl ManualSubmission {
    pub fn correlation(&self) -> CorrelationToken {
        self.tx.correlation_token()
    }

    pub fn send(&self, signal: SubmissionSignal) {
        let _ = self.signals.unbounded_send(signal);
    }

    pub fn acknowledge(&self) {
        self.send(SubmissionSignal::Acknowledged(self.correlation()));
    }

    /// Commit the transaction to `ledger` without signalling anything.
    pub async fn commit(&self, ledger: &MockLedger) -> Receipt {
        let event = ledger
            .commit_with(
                self.tx.payload.cell,
                self.tx.payload.color,
                self.correlation(),
                self.tx.signer,
            )
            .await;
        Receipt::from(&event)
    }

    pub fn succeed(&self, receipt: Receipt) {
        self.send(SubmissionSignal::Succeeded(receipt));
    }

    pub fn fail(&self, failure: RawFailure) {
        self.send(SubmissionSignal::Failed(failure));
    }

    /// End the signal stream.
    pub fn finish(&self) {
        self.signals.close_channel();
    }
}

struct ProviderControl {
    ledger: Arc<MockLedger>,
    key: SigningKey,
    held: watch::Sender<bool>,
    connects: watch::Sender<usize>,
    connect_failure: watch::Sender<Option<EditError>>,
    script: watch::Sender<SubmissionScript>,
    submissions: watch::Sender<usize>,
    manual_tx: mpsc::UnboundedSender<ManualSubmission>,
}

/// Provider whose capabilities sign with a fixed key.
pub struct MockProvider {
    control: Arc<ProviderControl>,
}

/// Test-side controls of a [`MockProvider`].
pub struct MockProviderHandle {
    control: Arc<ProviderControl>,
    manual_rx: Mutex<mpsc::UnboundedReceiver<ManualSubmission>>,
}

impl MockProvider {
    pub fn new(ledger: Arc<MockLedger>, secret: [u8; 32]) -> (Self, MockProviderHandle) {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        let control = Arc::new(ProviderControl {
            ledger,
            key: SigningKey::from_bytes(&secret),
            held: watch::Sender::new(false),
            connects: watch::Sender::new(0),
            connect_failure: watch::Sender::new(None),
            script: watch::Sender::new(SubmissionScript::Commit),
            submissions: watch::Sender::new(0),
            manual_tx,
        });

        let handle = MockProviderHandle {
            control: Arc::clone(&control),
            manual_rx: Mutex::new(manual_rx),
        };

        (Self { control }, handle)
    }
}

impl MockProviderHandle {
    /// Make connection attempts wait until [`release_connect`](Self::release_connect).
    pub fn hold_connect(&self) {
        self.control.held.send_replace(true);
    }

    pub fn release_connect(&self) {
        self.control.held.send_replace(false);
    }

    /// Make connection attempts fail with `error`.
    pub fn fail_connect(&self, error: EditError) {
        self.control.connect_failure.send_replace(Some(error));
    }

    pub fn allow_connect(&self) {
        self.control.connect_failure.send_replace(None);
    }

    pub fn connect_count(&self) -> usize {
        *self.control.connects.borrow()
    }

    /// Wait until `count` connection attempts have started.
    pub async fn wait_for_connects(&self, count: usize) {
        let mut connects = self.control.connects.subscribe();
        let _ = connects.wait_for(|started| *started >= count).await;
    }

    pub fn set_script(&self, script: SubmissionScript) {
        self.control.script.send_replace(script);
    }

    pub fn submission_count(&self) -> usize {
        *self.control.submissions.borrow()
    }

    /// Next submission made while the script is [`SubmissionScript::Manual`].
    pub async fn next_submission(&self) -> ManualSubmission {
        self.manual_rx
            .lock()
            .await
            .recv()
            .await
            .expect("mock provider dropped")
    }

    pub fn identity(&self) -> Identity {
        Identity::of(&self.control.key)
    }
}

impl CapabilityProvider for MockProvider {
    type Capability = MockCapability;

    async fn connect(&self) -> std::result::Result<MockCapability, EditError> {
        self.control.connects.send_modify(|count| *count += 1);

        let mut held = self.control.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        if let Some(error) = self.control.connect_failure.borrow().clone() {
            return Err(error);
        }
        Ok(MockCapability {
            control: Arc::clone(&self.control),
        })
    }
}

/// Capability handed out by [`MockProvider`].
pub struct MockCapability {
    control: Arc<ProviderControl>,
}

impl Capability for MockCapability {
    fn identities(&self) -> Vec<Identity> {
        vec![Identity::of(&self.control.key)]
    }

    async fn sign_message(&self, message: &str) -> std::result::Result<Signature, RawFailure> {
        let bytes = tessera_core::message_signing_bytes(message.as_bytes());
        Ok(Signature::sign(&self.control.key, &bytes))
    }

    fn submit(&self, payload: SetColor) -> SubmissionStream {
        self.control.submissions.send_modify(|count| *count += 1);

        let tx = SignedSetColor::sign(payload, &self.control.key);
        let (signals, stream) = unbounded();
        let script = self.control.script.borrow().clone();

        match script {
            SubmissionScript::Manual => {
                let _ = self.control.manual_tx.send(ManualSubmission { tx, signals });
            }
            SubmissionScript::Fail(failure) => {
                let _ = signals.unbounded_send(SubmissionSignal::Failed(failure));
            }
            SubmissionScript::Commit | SubmissionScript::CommitSilently => {
                let ledger = Arc::clone(&self.control.ledger);
                let report_success = matches!(script, SubmissionScript::Commit);
                tokio::spawn(async move {
                    let submission = ManualSubmission { tx, signals };
                    submission.acknowledge();
                    let receipt = submission.commit(&ledger).await;
                    if report_success {
                        submission.succeed(receipt);
                    }
                });
            }
        }

        stream.boxed()
    }
}
