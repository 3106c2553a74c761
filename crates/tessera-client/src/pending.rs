//! Per-cell table of in-flight local edits.

use std::collections::HashMap;

use tessera_core::{Cell, Color};

/// Locally generated identifier of one submission attempt.
///
/// Strictly increasing within a tracker and compared by value. Unrelated to
/// the ledger's correlation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalToken(u64);

impl LocalToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A desired color not yet confirmed by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEdit {
    pub color: Color,
    pub token: LocalToken,
}

/// At most one pending edit per cell; the latest request wins.
#[derive(Debug, Default)]
pub struct PendingEditTracker {
    entries: HashMap<Cell, PendingEdit>,
    next_token: u64,
}

impl PendingEditTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new desired color, replacing whatever was pending for `cell`.
    pub fn set_pending(&mut self, cell: Cell, color: Color) -> LocalToken {
        self.next_token += 1;
        let token = LocalToken(self.next_token);
        self.entries.insert(cell, PendingEdit { color, token });
        token
    }

    /// Remove the entry for `cell` only if it still carries `token`.
    pub fn clear_pending(&mut self, cell: Cell, token: LocalToken) -> bool {
        match self.entries.get(&cell) {
            Some(entry) if entry.token == token => {
                self.entries.remove(&cell);
                true
            }
            _ => false,
        }
    }

    /// Remove the entry for `cell` whatever its token.
    ///
    /// Only for definitive failures where nothing newer needs protecting;
    /// prefer [`clear_pending`](Self::clear_pending).
    pub fn clear_pending_unconditional(&mut self, cell: Cell) -> Option<PendingEdit> {
        self.entries.remove(&cell)
    }

    /// Desired color to display over the canonical one.
    pub fn overlay(&self, cell: Cell) -> Option<Color> {
        self.entries.get(&cell).map(|entry| entry.color)
    }

    pub fn current_token(&self, cell: Cell) -> Option<LocalToken> {
        self.entries.get(&cell).map(|entry| entry.token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cell, &PendingEdit)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::from_u32(0xf83800);
    const BLUE: Color = Color::from_u32(0x0000fc);

    #[test]
    fn latest_edit_replaces_previous() {
        let mut tracker = PendingEditTracker::new();
        let cell = Cell::new(2, 3);

        let first = tracker.set_pending(cell, RED);
        let second = tracker.set_pending(cell, BLUE);

        assert!(second > first);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.overlay(cell), Some(BLUE));
        assert_eq!(tracker.current_token(cell), Some(second));
    }

    #[test]
    fn stale_token_does_not_clear_newer_edit() {
        let mut tracker = PendingEditTracker::new();
        let cell = Cell::new(0, 0);

        let r1 = tracker.set_pending(cell, RED);
        let r2 = tracker.set_pending(cell, BLUE);

        assert!(!tracker.clear_pending(cell, r1));
        assert_eq!(tracker.overlay(cell), Some(BLUE));

        assert!(tracker.clear_pending(cell, r2));
        assert_eq!(tracker.overlay(cell), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn clearing_twice_is_harmless() {
        let mut tracker = PendingEditTracker::new();
        let cell = Cell::new(1, 1);
        let token = tracker.set_pending(cell, RED);

        assert!(tracker.clear_pending(cell, token));
        assert!(!tracker.clear_pending(cell, token));
        assert_eq!(tracker.clear_pending_unconditional(cell), None);
    }

    #[test]
    fn cells_are_independent() {
        let mut tracker = PendingEditTracker::new();
        let a = tracker.set_pending(Cell::new(0, 0), RED);
        let b = tracker.set_pending(Cell::new(0, 1), BLUE);
        assert_ne!(a, b);

        assert!(tracker.clear_pending(Cell::new(0, 0), a));
        assert_eq!(tracker.overlay(Cell::new(0, 1)), Some(BLUE));
        assert_eq!(tracker.iter().count(), 1);
    }
}
