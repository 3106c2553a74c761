//! Signed ledger transactions and the events they produce.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::Result;
use crate::grid::Cell;
use crate::identity::{CorrelationToken, GridId, Identity, Signature};

const SET_COLOR_DOMAIN: &[u8] = b"tessera/set-color/v1";
const MESSAGE_DOMAIN: &[u8] = b"tessera/message/v1";

/// Request to paint one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetColor {
    pub grid_id: GridId,
    pub cell: Cell,
    pub color: Color,
    /// Distinguishes otherwise identical requests.
    pub nonce: u64,
}

impl SetColor {
    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SET_COLOR_DOMAIN.len() + 32 + 4 + 4 + 3 + 8);
        bytes.extend_from_slice(SET_COLOR_DOMAIN);
        bytes.extend_from_slice(self.grid_id.as_bytes());
        bytes.extend_from_slice(&self.cell.row.to_be_bytes());
        bytes.extend_from_slice(&self.cell.column.to_be_bytes());
        bytes.extend_from_slice(&self.color.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes
    }
}

/// A [`SetColor`] signed by the submitting identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSetColor {
    pub payload: SetColor,
    pub signer: Identity,
    pub signature: Signature,
}

impl SignedSetColor {
    pub fn sign(payload: SetColor, key: &SigningKey) -> Self {
        let signature = Signature::sign(key, &payload.signing_bytes());
        Self {
            payload,
            signer: Identity::of(key),
            signature,
        }
    }

    pub fn verify(&self) -> Result<()> {
        self.signer
            .verify(&self.payload.signing_bytes(), &self.signature)
    }

    /// The transaction id the ledger reports for this submission.
    pub fn correlation_token(&self) -> CorrelationToken {
        let mut bytes = self.payload.signing_bytes();
        bytes.extend_from_slice(self.signer.as_bytes());
        bytes.extend_from_slice(self.signature.as_bytes());
        CorrelationToken::digest(&bytes)
    }
}

/// A committed cell change, pushed to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Commit sequence number, strictly increasing per ledger.
    pub sequence: u64,
    pub cell: Cell,
    pub color: Color,
    pub correlation: CorrelationToken,
    pub signer: Identity,
}

/// Confirmation returned to the submitter once a transaction is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub correlation: CorrelationToken,
    pub sequence: u64,
    pub cell: Cell,
    pub color: Color,
}

impl From<&ChangeEvent> for Receipt {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            correlation: event.correlation,
            sequence: event.sequence,
            cell: event.cell,
            color: event.color,
        }
    }
}

/// Bytes actually signed for a free-form message.
pub fn message_signing_bytes(message: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MESSAGE_DOMAIN.len() + 1 + message.len());
    bytes.extend_from_slice(MESSAGE_DOMAIN);
    bytes.push(b':');
    bytes.extend_from_slice(message);
    bytes
}

/// A signed request asking the owner to whitelist an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub identity: Identity,
    pub message: String,
    pub signature: Signature,
}

impl AccessRequest {
    pub fn verify(&self) -> Result<()> {
        self.identity
            .verify(&message_signing_bytes(self.message.as_bytes()), &self.signature)
    }
}
