//! Error types for tessera-core.

use thiserror::Error;

use crate::grid::{Cell, GridDimensions};

/// Result type for tessera-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing, validating or verifying core values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Text could not be parsed as a 24-bit RGB color.
    #[error("invalid color {0:?}: expected #rrggbb")]
    InvalidColor(String),

    /// Hex text had the wrong length or alphabet.
    #[error("invalid {what}: {reason}")]
    InvalidHex { what: &'static str, reason: String },

    /// A cell lies outside the grid.
    #[error("cell {cell} is outside the {dimensions} grid")]
    OutOfBounds {
        cell: Cell,
        dimensions: GridDimensions,
    },

    /// A flat color list does not match the grid dimensions.
    #[error("expected {expected} colors, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Bytes are not a valid ed25519 public key.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Signature verification failed.
    #[error("signature does not match signer")]
    InvalidSignature,

    /// Wire message could not be encoded or decoded.
    #[error("wire encoding error: {0}")]
    Wire(#[from] serde_json::Error),
}
