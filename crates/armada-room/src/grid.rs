//! The play grid: a fixed matrix of cells tracking ship occupancy and
//! hit/miss status for one game session.

use std::collections::HashMap;

use armada_protocol::ClientId;

use crate::RoomError;

/// What has happened to a cell. Once a cell leaves `Untouched` it never
/// changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellStatus {
    #[default]
    Untouched,
    Hit,
    Miss,
}

/// One cell of the grid.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    status: CellStatus,
    /// Ship count per owning client. Drained when the cell is hit.
    ships: HashMap<ClientId, u32>,
}

impl Cell {
    pub fn status(&self) -> CellStatus {
        self.status
    }

    /// Total ships currently in the cell, across all owners.
    pub fn ship_count(&self) -> u32 {
        self.ships.values().sum()
    }
}

/// The result of attacking a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    /// The cell held ships; all of them are destroyed.
    Hit { ships_destroyed: u32 },
    /// The cell was empty.
    Miss,
    /// The cell had already been attacked. Nothing changes.
    AlreadyStruck,
}

/// A rows x cols matrix of [`Cell`]s, created fresh per session.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: u32,
    cols: u32,
    cells: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: u32, cols: u32) -> Self {
        let cells = (0..rows)
            .map(|_| (0..cols).map(|_| Cell::default()).collect())
            .collect();
        Self { rows, cols, cells }
    }

    pub fn is_valid(&self, row: u32, col: u32) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
    }

    /// Adds one ship owned by `owner` to the cell.
    pub fn place_ship(&mut self, row: u32, col: u32, owner: ClientId) -> Result<(), RoomError> {
        if !self.is_valid(row, col) {
            return Err(RoomError::InvalidCoordinate(row, col));
        }
        let cell = &mut self.cells[row as usize][col as usize];
        *cell.ships.entry(owner).or_insert(0) += 1;
        Ok(())
    }

    /// Attacks the cell.
    ///
    /// An untouched occupied cell becomes `Hit` and its ships are
    /// consumed; an untouched empty cell becomes `Miss`. A cell that has
    /// already been attacked is left exactly as it was.
    pub fn attack(&mut self, row: u32, col: u32) -> Result<AttackOutcome, RoomError> {
        if !self.is_valid(row, col) {
            return Err(RoomError::InvalidCoordinate(row, col));
        }
        let cell = &mut self.cells[row as usize][col as usize];
        if cell.status != CellStatus::Untouched {
            return Ok(AttackOutcome::AlreadyStruck);
        }
        let ships_destroyed = cell.ship_count();
        if ships_destroyed > 0 {
            cell.status = CellStatus::Hit;
            cell.ships.clear();
            Ok(AttackOutcome::Hit { ships_destroyed })
        } else {
            cell.status = CellStatus::Miss;
            Ok(AttackOutcome::Miss)
        }
    }
}
