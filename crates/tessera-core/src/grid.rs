//! Grid geometry: cells, dimensions and row-major layout.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{CoreError, Result};

/// A (row, column) position on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub row: u32,
    pub column: u32,
}

impl Cell {
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Fixed grid size, established once when the ledger is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDimensions {
    pub rows: u32,
    pub columns: u32,
}

impl GridDimensions {
    pub const fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.rows && cell.column < self.columns
    }

    /// Row-major index of `cell`.
    pub fn index(&self, cell: Cell) -> Result<usize> {
        if !self.contains(cell) {
            return Err(CoreError::OutOfBounds {
                cell,
                dimensions: *self,
            });
        }
        Ok(cell.row as usize * self.columns as usize + cell.column as usize)
    }

    /// Cell at a row-major index.
    pub fn cell_at(&self, index: usize) -> Option<Cell> {
        if index >= self.len() {
            return None;
        }
        let columns = self.columns as usize;
        Some(Cell::new((index / columns) as u32, (index % columns) as u32))
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.columns).map(move |column| Cell::new(row, column)))
    }

    /// Split a flat row-major color list into rows.
    pub fn reshape(&self, colors: &[Color]) -> Result<Vec<Vec<Color>>> {
        if colors.len() != self.len() {
            return Err(CoreError::ShapeMismatch {
                expected: self.len(),
                actual: colors.len(),
            });
        }
        if self.columns == 0 {
            return Ok(Vec::new());
        }
        Ok(colors
            .chunks(self.columns as usize)
            .map(|row| row.to_vec())
            .collect())
    }
}

impl fmt::Display for GridDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.columns)
    }
}
