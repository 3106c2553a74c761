//! Error types for the client.

use tessera_core::{CoreError, RejectCode};
use thiserror::Error;

/// Result type for client transport and configuration.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Outcome of an edit that did not end in a confirmed write.
///
/// Every failure is reduced to one of these at the capability boundary,
/// before any reconciliation logic looks at it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// No capability provider is present.
    #[error("no capability provider available")]
    EnvironmentMissing,

    /// The user declined to connect a capability.
    #[error("capability request was declined")]
    CapabilityDenied,

    /// The ledger refused the signer (not owner and not whitelisted).
    #[error("not allowed to paint on this grid")]
    AccessDenied,

    /// The grid is paused.
    #[error("the grid is paused")]
    Inactive,

    /// The user declined to sign the submission.
    #[error("submission was not signed")]
    UserRejectedSubmission,

    /// Transport or ledger failure.
    #[error("network or ledger failure: {0}")]
    NetworkOrLedgerFailure(String),

    /// The cell already has the requested color.
    #[error("cell already has that color")]
    NoOp,
}

/// Errors talking to a ledger node or loading client configuration.
#[derive(Debug, Error)]
pub enum ClientError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid core value or wire encoding
    #[error("Invalid data: {0}")]
    Core(#[from] CoreError),

    /// Unexpected or missing response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The ledger rejected the request
    #[error("Rejected ({code}): {reason}")]
    Rejected { code: RejectCode, reason: String },

    /// The ledger serves a different grid than configured
    #[error("Expected grid {expected}, ledger serves {actual}")]
    WrongGrid { expected: String, actual: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ClientError> for EditError {
    fn from(e: ClientError) -> Self {
        EditError::NetworkOrLedgerFailure(e.to_string())
    }
}
