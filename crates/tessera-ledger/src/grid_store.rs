//! The grid state machine.
//!
//! ```text
//! Uninitialized ──initialize_column──► Initializing ──finish_initialization──► Finished
//!                                                                                │
//!                                                             pause ⇄ resume (Active ⇄ Paused)
//! ```
//!
//! Writes are accepted only in `Finished ∧ Active`, and only from an
//! authorized identity. The owner is always authorized; with access checks
//! enabled everybody else needs to be on the whitelist.
//!
//! This module is pure: no I/O, no clocks. The [`Ledger`](crate::ledger::Ledger)
//! wraps it with ordering, persistence and event fan-out.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tessera_core::{
    Cell, ChangeEvent, Color, CorrelationToken, GridDimensions, GridId, GridSnapshot, Identity,
    PolicySnapshot, RejectCode,
};
use thiserror::Error;

/// Rejections produced by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("grid initialization has already finished")]
    AlreadyInitialized,

    #[error("grid initialization has not finished")]
    NotInitialized,

    #[error("grid is paused")]
    Inactive,

    #[error("identity {0} may not paint on this grid")]
    AccessDenied(Identity),

    #[error("identity {0} is not the grid owner")]
    NotOwner(Identity),

    #[error("cell {0} is outside the grid")]
    OutOfBounds(Cell),

    #[error("column {0} is outside the grid")]
    ColumnOutOfBounds(u32),

    #[error("transaction signature is invalid")]
    InvalidSignature,

    #[error("transaction targets another grid")]
    WrongGrid,

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Machine-readable code sent to clients.
    pub fn reject_code(&self) -> RejectCode {
        match self {
            Self::AccessDenied(_) | Self::NotOwner(_) => RejectCode::AccessDenied,
            Self::Inactive => RejectCode::Inactive,
            Self::NotInitialized => RejectCode::NotInitialized,
            Self::AlreadyInitialized => RejectCode::AlreadyInitialized,
            Self::OutOfBounds(_) | Self::ColumnOutOfBounds(_) => RejectCode::OutOfBounds,
            Self::InvalidSignature => RejectCode::InvalidSignature,
            Self::WrongGrid => RejectCode::WrongGrid,
            Self::Unavailable(_) => RejectCode::Unavailable,
        }
    }
}

/// Lifecycle of grid initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Initializing,
    Finished,
}

/// Who may paint, and whether anybody may paint right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub owner: Identity,
    pub whitelist: BTreeSet<Identity>,
    pub requires_access_checks: bool,
    pub active: bool,
}

impl AccessPolicy {
    pub fn new(owner: Identity, requires_access_checks: bool) -> Self {
        Self {
            owner,
            whitelist: BTreeSet::new(),
            requires_access_checks,
            active: true,
        }
    }

    /// Owner or whitelisted, independent of whether checks are enabled.
    pub fn has_access(&self, identity: &Identity) -> bool {
        *identity == self.owner || self.whitelist.contains(identity)
    }

    /// Whether `identity` passes the access check for writes.
    pub fn may_write(&self, identity: &Identity) -> bool {
        !self.requires_access_checks || self.has_access(identity)
    }
}

/// Authoritative grid contents plus access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridStore {
    grid_id: GridId,
    dimensions: GridDimensions,
    /// Row-major; always `dimensions.len()` entries.
    colors: Vec<Color>,
    phase: Phase,
    policy: AccessPolicy,
    /// Sequence of the last committed change.
    sequence: u64,
}

impl GridStore {
    /// A freshly deployed, uninitialized grid. Every cell starts as black.
    pub fn new(
        grid_id: GridId,
        dimensions: GridDimensions,
        owner: Identity,
        requires_access_checks: bool,
    ) -> Self {
        Self {
            grid_id,
            dimensions,
            colors: vec![Color::default(); dimensions.len()],
            phase: Phase::Uninitialized,
            policy: AccessPolicy::new(owner, requires_access_checks),
            sequence: 0,
        }
    }

    // --- Initialization ---

    /// Paint every cell of column `index` with `default_color`.
    pub fn initialize_column(
        &mut self,
        signer: &Identity,
        index: u32,
        default_color: Color,
    ) -> Result<(), LedgerError> {
        if self.phase == Phase::Finished {
            return Err(LedgerError::AlreadyInitialized);
        }
        self.require_owner(signer)?;
        if index >= self.dimensions.columns {
            return Err(LedgerError::ColumnOutOfBounds(index));
        }

        for row in 0..self.dimensions.rows {
            let i = self.cell_index(Cell::new(row, index))?;
            self.colors[i] = default_color;
        }
        self.phase = Phase::Initializing;
        Ok(())
    }

    /// Close the initialization phase. Only succeeds once.
    pub fn finish_initialization(&mut self, signer: &Identity) -> Result<(), LedgerError> {
        if self.phase == Phase::Finished {
            return Err(LedgerError::AlreadyInitialized);
        }
        self.require_owner(signer)?;
        self.phase = Phase::Finished;
        Ok(())
    }

    // --- Reads ---

    pub fn get_color(&self, cell: Cell) -> Result<Color, LedgerError> {
        self.require_finished()?;
        Ok(self.colors[self.cell_index(cell)?])
    }

    /// Row-major copy of every cell.
    pub fn get_all_colors(&self) -> Result<Vec<Color>, LedgerError> {
        self.require_finished()?;
        Ok(self.colors.clone())
    }

    pub fn snapshot(&self) -> Result<GridSnapshot, LedgerError> {
        Ok(GridSnapshot {
            grid_id: self.grid_id,
            dimensions: self.dimensions,
            colors: self.get_all_colors()?,
            sequence: self.sequence,
        })
    }

    pub fn policy_snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            grid_id: self.grid_id,
            owner: self.policy.owner,
            requires_access_checks: self.policy.requires_access_checks,
            active: self.policy.active,
            initialized: self.is_initialized(),
        }
    }

    pub fn has_access(&self, identity: &Identity) -> bool {
        self.policy.has_access(identity)
    }

    pub fn requires_access_checks(&self) -> bool {
        self.policy.requires_access_checks
    }

    pub fn is_active(&self) -> bool {
        self.policy.active
    }

    pub fn is_initialized(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn num_columns(&self) -> u32 {
        self.dimensions.columns
    }

    pub fn num_rows(&self) -> u32 {
        self.dimensions.rows
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn grid_id(&self) -> GridId {
        self.grid_id
    }

    pub fn owner(&self) -> Identity {
        self.policy.owner
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Explicitly whitelisted identities (the owner is implicit).
    pub fn whitelist(&self) -> impl Iterator<Item = &Identity> {
        self.policy.whitelist.iter()
    }

    // --- Writes ---

    /// Paint one cell and return the event describing the change.
    pub fn set_color(
        &mut self,
        signer: &Identity,
        cell: Cell,
        color: Color,
        correlation: CorrelationToken,
    ) -> Result<ChangeEvent, LedgerError> {
        self.require_finished()?;
        if !self.policy.active {
            return Err(LedgerError::Inactive);
        }
        if !self.policy.may_write(signer) {
            return Err(LedgerError::AccessDenied(*signer));
        }
        let index = self.cell_index(cell)?;

        self.colors[index] = color;
        self.sequence += 1;

        Ok(ChangeEvent {
            sequence: self.sequence,
            cell,
            color,
            correlation,
            signer: *signer,
        })
    }

    // --- Owner operations ---

    pub fn grant_access(&mut self, signer: &Identity, identity: Identity) -> Result<(), LedgerError> {
        self.require_owner(signer)?;
        self.policy.whitelist.insert(identity);
        Ok(())
    }

    /// Remove `identity` from the whitelist. Unknown identities are a no-op,
    /// and the owner stays authorized regardless.
    pub fn revoke_access(&mut self, signer: &Identity, identity: &Identity) -> Result<(), LedgerError> {
        self.require_owner(signer)?;
        self.policy.whitelist.remove(identity);
        Ok(())
    }

    /// Stop accepting writes. Pausing a paused grid is a no-op.
    pub fn pause(&mut self, signer: &Identity) -> Result<(), LedgerError> {
        self.require_owner(signer)?;
        self.require_finished()?;
        self.policy.active = false;
        Ok(())
    }

    /// Accept writes again. Resuming an active grid is a no-op.
    pub fn resume(&mut self, signer: &Identity) -> Result<(), LedgerError> {
        self.require_owner(signer)?;
        self.require_finished()?;
        self.policy.active = true;
        Ok(())
    }

    pub fn set_requires_access_checks(
        &mut self,
        signer: &Identity,
        enabled: bool,
    ) -> Result<(), LedgerError> {
        self.require_owner(signer)?;
        self.policy.requires_access_checks = enabled;
        Ok(())
    }

    fn require_owner(&self, signer: &Identity) -> Result<(), LedgerError> {
        if *signer != self.policy.owner {
            return Err(LedgerError::NotOwner(*signer));
        }
        Ok(())
    }

    fn require_finished(&self) -> Result<(), LedgerError> {
        if self.phase != Phase::Finished {
            return Err(LedgerError::NotInitialized);
        }
        Ok(())
    }

    fn cell_index(&self, cell: Cell) -> Result<usize, LedgerError> {
        self.dimensions
            .index(cell)
            .map_err(|_| LedgerError::OutOfBounds(cell))
    }
}
