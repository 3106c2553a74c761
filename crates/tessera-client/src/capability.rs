//! What a connected signer can do, and how its failures are classified.
//!
//! A [`CapabilityProvider`] stands for the environment that may or may not
//! hold a signing key (and may ask the user before handing one out). Once
//! connected, a [`Capability`] submits `SetColor` transactions; every
//! submission is a single stream of [`SubmissionSignal`]s.

use std::future::Future;

use futures::stream::BoxStream;
use tessera_core::{CorrelationToken, Identity, Receipt, RejectCode, SetColor, Signature};

use crate::error::EditError;

/// Provider code for "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// Machine-readable part of a failure, when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCode {
    /// Numeric code reported by the signing environment.
    Provider(i64),
    /// Reason code reported by the ledger.
    Ledger(RejectCode),
    /// The connection to the ledger failed.
    Transport,
}

/// A failure as reported by the environment, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFailure {
    pub code: Option<FailureCode>,
    pub message: String,
}

impl RawFailure {
    /// A failure with nothing but diagnostic text.
    pub fn opaque(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn provider(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(FailureCode::Provider(code)),
            message: message.into(),
        }
    }

    pub fn ledger(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(FailureCode::Ledger(code)),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: Some(FailureCode::Transport),
            message: message.into(),
        }
    }

    /// Reduce to the closed error set.
    ///
    /// Failures with neither a code nor a recognizable ledger marker count
    /// as a declined signature, because some environments only report
    /// that as free text.
    pub fn classify(&self) -> EditError {
        match self.code {
            Some(FailureCode::Provider(USER_REJECTED_CODE)) => {
                return EditError::UserRejectedSubmission
            }
            Some(FailureCode::Ledger(RejectCode::AccessDenied)) => return EditError::AccessDenied,
            Some(FailureCode::Ledger(RejectCode::Inactive)) => return EditError::Inactive,
            _ => {}
        }

        let text = self.message.to_ascii_lowercase();
        if text.contains(RejectCode::AccessDenied.as_str()) || text.contains("access denied") {
            EditError::AccessDenied
        } else if text.contains(RejectCode::Inactive.as_str()) || text.contains("paused") {
            EditError::Inactive
        } else if self.code.is_some() {
            EditError::NetworkOrLedgerFailure(self.message.clone())
        } else {
            EditError::UserRejectedSubmission
        }
    }
}

/// One step in the life of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionSignal {
    /// The ledger accepted the transaction for processing.
    Acknowledged(CorrelationToken),
    /// Confirmation progress, where the environment reports it.
    Progress(u32),
    /// The transaction was committed.
    Succeeded(Receipt),
    Failed(RawFailure),
}

/// Signals of one submission, in the order the environment reports them.
///
/// Any subset may be missing; the stream may end without a terminal signal.
pub type SubmissionStream = BoxStream<'static, SubmissionSignal>;

/// An identity-bound connection allowed to submit writes.
pub trait Capability: Send + Sync + 'static {
    /// Identities this capability can sign for; the first one is used.
    fn identities(&self) -> Vec<Identity>;

    /// Sign a free-form message (used for access requests).
    fn sign_message(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<Signature, RawFailure>> + Send;

    /// Sign and submit a paint transaction.
    fn submit(&self, payload: SetColor) -> SubmissionStream;
}

/// Source of capabilities. Connecting may prompt the user.
pub trait CapabilityProvider: Send + Sync + 'static {
    type Capability: Capability;

    /// Fails with [`EditError::EnvironmentMissing`] or
    /// [`EditError::CapabilityDenied`].
    fn connect(&self) -> impl Future<Output = Result<Self::Capability, EditError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_rejection_code() {
        let failure = RawFailure::provider(4001, "User denied transaction signature");
        assert_eq!(failure.classify(), EditError::UserRejectedSubmission);
    }

    #[test]
    fn ledger_codes() {
        let denied = RawFailure::ledger(RejectCode::AccessDenied, "nope");
        assert_eq!(denied.classify(), EditError::AccessDenied);

        let paused = RawFailure::ledger(RejectCode::Inactive, "grid is paused");
        assert_eq!(paused.classify(), EditError::Inactive);

        let other = RawFailure::ledger(RejectCode::NotInitialized, "not ready");
        assert_eq!(
            other.classify(),
            EditError::NetworkOrLedgerFailure("not ready".into())
        );
    }

    #[test]
    fn markers_in_text() {
        let failure = RawFailure::opaque("execution reverted: access_denied");
        assert_eq!(failure.classify(), EditError::AccessDenied);

        let failure = RawFailure::provider(-32603, "Internal error: inactive");
        assert_eq!(failure.classify(), EditError::Inactive);
    }

    #[test]
    fn opaque_text_defaults_to_user_rejection() {
        let failure = RawFailure::opaque("Error: something went sideways");
        assert_eq!(failure.classify(), EditError::UserRejectedSubmission);
    }

    #[test]
    fn transport_failures_are_network() {
        let failure = RawFailure::transport("connection refused");
        assert!(matches!(
            failure.classify(),
            EditError::NetworkOrLedgerFailure(_)
        ));
    }
}
