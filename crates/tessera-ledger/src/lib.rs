//! Tessera Ledger - the authoritative grid store.
//!
//! A single node owns one grid of colored cells and commits signed paint
//! transactions against it in order.
//!
//! # Architecture
//!
//! - **GridStore**: the state machine (initialization, access policy, pause)
//! - **Ledger**: commit loop, change event broadcast, owner operations
//! - **Storage**: RocksDB-backed persistence of the grid and access requests
//! - **Wire**: TCP JSON-lines protocol used by Rust clients
//! - **API**: HTTP endpoints and WebSocket event stream for browsers
//! - **Admin Socket**: Unix socket for owner commands (grid-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use tessera_ledger::{LedgerConfig, LedgerNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LedgerConfig::from_env()?;
//!     let node = LedgerNode::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod grid_store;
pub mod ledger;
pub mod node;
pub mod storage;
pub mod wire;
pub mod ws;

pub use error::{Error, Result};
pub use grid_store::{AccessPolicy, GridStore, LedgerError, Phase};
pub use ledger::{Genesis, Ledger, Submitted};
pub use node::{AccessMode, LedgerConfig, LedgerNode};
pub use storage::Storage;
pub use wire::WireServer;
