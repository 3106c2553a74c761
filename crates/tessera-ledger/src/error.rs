//! Error types for the ledger node.

use thiserror::Error;

use crate::grid_store::LedgerError;

/// Result type for ledger node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a ledger node.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State machine rejection
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Invalid core value (color, identity, signature)
    #[error("Invalid input: {0}")]
    Core(#[from] tessera_core::CoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
