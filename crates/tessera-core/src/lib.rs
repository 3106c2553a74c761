//! Tessera core types.
//!
//! Shared vocabulary of the collaborative canvas: the grid geometry, 24-bit
//! colors and the default palette, ed25519 identities, signed `SetColor`
//! transactions, the change events a ledger emits when it commits them, and
//! the native wire protocol spoken between ledger nodes and clients.
//!
//! Nothing in here does I/O.

pub mod color;
pub mod error;
pub mod grid;
pub mod identity;
pub mod palette;
pub mod transaction;
pub mod wire;

pub use color::Color;
pub use error::{CoreError, Result};
pub use grid::{Cell, GridDimensions};
pub use identity::{CorrelationToken, GridId, Identity, Signature};
pub use palette::PALETTE;
pub use transaction::{
    message_signing_bytes, AccessRequest, ChangeEvent, Receipt, SetColor, SignedSetColor,
};
pub use wire::{GridSnapshot, PolicySnapshot, RejectCode, WireRequest, WireResponse};
