//! Local mirror of the server's board, rendered as text

use crate::input::row_label;
use shared::{TileView, BOARD_HEIGHT, BOARD_WIDTH, MINE_COUNT};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Hidden,
    Flagged,
    Revealed(u8),
    Mine,
}

impl Cell {
    fn symbol(self) -> char {
        match self {
            Cell::Hidden => ' ',
            Cell::Flagged => '+',
            Cell::Mine => '*',
            Cell::Revealed(n) => char::from_digit(u32::from(n), 10).unwrap_or('?'),
        }
    }
}

/// What the player knows about the board, built from tile deltas.
#[derive(Debug, Clone)]
pub struct ClientBoard {
    /// Indexed `[y][x]` so rows render in order.
    cells: [[Cell; BOARD_WIDTH]; BOARD_HEIGHT],
    remaining_mines: usize,
}

impl Default for ClientBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBoard {
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Hidden; BOARD_WIDTH]; BOARD_HEIGHT],
            remaining_mines: MINE_COUNT,
        }
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<Cell> {
        self.cells.get(y).and_then(|row| row.get(x)).copied()
    }

    pub fn remaining_mines(&self) -> usize {
        self.remaining_mines
    }

    /// Applies tile deltas. A flag that lands on a mine lowers the remaining
    /// mine counter. Tiles outside the board are ignored.
    ///
    /// Returns the `(x, y)` of every flag the server reported as missing a
    /// mine, so the caller can warn the player.
    pub fn apply(&mut self, tiles: &[TileView]) -> Vec<(usize, usize)> {
        let mut missed = Vec::new();
        for tile in tiles {
            let Some(cell) = self.cells.get_mut(tile.y).and_then(|row| row.get_mut(tile.x)) else {
                continue;
            };

            let next = match (tile.adjacent_mines, tile.flagged, tile.mine) {
                (None, true, mine) => {
                    if !mine {
                        missed.push((tile.x, tile.y));
                    } else if *cell != Cell::Flagged {
                        self.remaining_mines = self.remaining_mines.saturating_sub(1);
                    }
                    Cell::Flagged
                }
                (_, true, true) => Cell::Flagged,
                (_, _, true) => Cell::Mine,
                (Some(n), _, false) => Cell::Revealed(n),
                (None, false, false) => Cell::Hidden,
            };
            *cell = next;
        }
        missed
    }
}

impl fmt::Display for ClientBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Remaining mines: {}\n", self.remaining_mines)?;

        write!(f, "    ")?;
        for x in 0..BOARD_WIDTH {
            write!(f, "{} ", x + 1)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", "-".repeat(4 + BOARD_WIDTH * 2))?;

        for (y, row) in self.cells.iter().enumerate() {
            write!(f, "{} | ", row_label(y))?;
            for cell in row {
                write!(f, "{} ", cell.symbol())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
