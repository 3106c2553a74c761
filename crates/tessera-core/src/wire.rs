//! Native wire protocol between ledger nodes and clients.
//!
//! One JSON object per line over TCP. A connection carries either a single
//! request/response exchange (`snapshot`, `policy`, `has_access`,
//! `request_access`), a submission lifecycle (`submit`: acknowledged, then
//! confirmed or rejected), or a live event subscription (`subscribe`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::Result;
use crate::grid::GridDimensions;
use crate::identity::{CorrelationToken, GridId, Identity};
use crate::transaction::{AccessRequest, ChangeEvent, Receipt, SignedSetColor};

/// Request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireRequest {
    Snapshot,
    Subscribe,
    Submit { tx: SignedSetColor },
    RequestAccess { request: AccessRequest },
    Policy,
    HasAccess { identity: Identity },
}

/// Machine-readable reason a transaction was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    AccessDenied,
    Inactive,
    NotInitialized,
    AlreadyInitialized,
    OutOfBounds,
    InvalidSignature,
    WrongGrid,
    Unavailable,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::Inactive => "inactive",
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::OutOfBounds => "out_of_bounds",
            Self::InvalidSignature => "invalid_signature",
            Self::WrongGrid => "wrong_grid",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full copy of the grid at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub grid_id: GridId,
    pub dimensions: GridDimensions,
    /// Row-major, `dimensions.len()` entries.
    pub colors: Vec<Color>,
    /// Sequence of the last commit included.
    pub sequence: u64,
}

/// Public view of the access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub grid_id: GridId,
    pub owner: Identity,
    pub requires_access_checks: bool,
    pub active: bool,
    pub initialized: bool,
}

/// Message sent by a ledger node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireResponse {
    Snapshot { snapshot: GridSnapshot },
    Subscribed,
    Event { event: ChangeEvent },
    Acknowledged { correlation: CorrelationToken },
    Confirmed { receipt: Receipt },
    Rejected { code: RejectCode, reason: String },
    Policy { policy: PolicySnapshot },
    Bool { value: bool },
    Accepted,
    Error { error: String },
}

/// Encode a message as one newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    Ok(serde_json::from_str(line.trim_end())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tagging() {
        let line = encode_line(&WireRequest::Snapshot).unwrap();
        assert_eq!(line, "{\"op\":\"snapshot\"}\n");
        let parsed: WireRequest = decode_line(&line).unwrap();
        assert_eq!(parsed, WireRequest::Snapshot);
    }

    #[test]
    fn rejection_carries_code() {
        let msg = WireResponse::Rejected {
            code: RejectCode::AccessDenied,
            reason: "not whitelisted".into(),
        };
        let line = encode_line(&msg).unwrap();
        assert!(line.contains("\"code\":\"access_denied\""));
        assert_eq!(decode_line::<WireResponse>(&line).unwrap(), msg);
    }

    #[test]
    fn initialization_codes_are_distinct() {
        let json = serde_json::to_string(&RejectCode::AlreadyInitialized).unwrap();
        assert_eq!(json, "\"already_initialized\"");
        assert_eq!(RejectCode::AlreadyInitialized.as_str(), "already_initialized");
        assert_ne!(RejectCode::AlreadyInitialized, RejectCode::NotInitialized);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_line::<WireRequest>("{\"op\":\"explode\"}").is_err());
        assert!(decode_line::<WireResponse>("not json").is_err());
    }
}
