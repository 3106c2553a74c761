//! Tessera painting client.
//!
//! Edits to a grid take seconds to commit, so the client paints them
//! optimistically: the cell shows the requested color right away and is
//! reconciled with the ledger once the edit settles.
//!
//! # Architecture
//!
//! ```text
//!  paint ──▶ ReconciliationEngine ──▶ WriteGateway ──▶ Capability::submit
//!                │         ▲                                 │
//!         overlay│         │change events          submission signals
//!                ▼         │                                 │
//!    PendingEditTracker   ReadReplica ◀── ledger ◀───────────┘
//! ```
//!
//! - [`ReadReplica`] mirrors the canonical grid from a snapshot plus change
//!   events, with a periodic full resync.
//! - [`PendingEditTracker`] holds at most one optimistic color per cell.
//! - [`WriteGateway`] acquires a signing capability once per session.
//! - [`ReconciliationEngine`] drives each edit to a single outcome.
//!
//! [`ClientSession`] wires all of it together; [`RemoteSession`] does so for
//! a ledger node reached over the native wire.
//!
//! # Example
//!
//! ```no_run
//! use tessera_client::{ClientConfig, RemoteSession};
//! use tessera_core::{Cell, Color};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let session = RemoteSession::connect(&config).await?;
//!
//! let edit = session.paint(Cell::new(3, 7), Color::BLACK).await?;
//! let confirmed = edit.resolution().await?;
//! println!("committed at sequence {}", confirmed.sequence);
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod pending;
pub mod remote;
pub mod replica;
pub mod session;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use capability::{
    Capability, CapabilityProvider, FailureCode, RawFailure, SubmissionSignal, SubmissionStream,
};
pub use config::{ClientConfig, GridSelector};
pub use engine::{Confirmed, EditHandle, Reconciler, ReconciliationEngine, Resolution};
pub use error::{ClientError, EditError, Result};
pub use gateway::WriteGateway;
pub use ledger::{ChangeStream, LedgerConnection};
pub use pending::{LocalToken, PendingEdit, PendingEditTracker};
pub use remote::{
    generate_key_file, read_key_file_identity, KeyCapability, KeyFileProvider, RemoteLedger,
};
pub use replica::ReadReplica;
pub use session::{ClientSession, RemoteSession};
