//! Minesweeper rules for a single game session
//!
//! A [`GameState`] is owned by exactly one connection handler, so nothing in
//! here is synchronised except the random source used for mine placement,
//! which every session shares through [`MineRng`].
//!
//! Coordinates are assumed valid. The protocol layer rejects anything outside
//! the board before it reaches the engine, so an out-of-range position here is
//! a programming error and panics on the array index.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{TileView, BOARD_HEIGHT, BOARD_WIDTH, MINE_COUNT};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// In-bounds orthogonal and diagonal neighbours.
    pub fn neighbors(self) -> impl Iterator<Item = Position> {
        let xs = self.x.saturating_sub(1)..=(self.x + 1).min(BOARD_WIDTH - 1);
        xs.flat_map(move |x| {
            let ys = self.y.saturating_sub(1)..=(self.y + 1).min(BOARD_HEIGHT - 1);
            ys.map(move |y| Position::new(x, y))
        })
        .filter(move |&pos| pos != self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tile {
    pub adjacent_mines: u8,
    pub revealed: bool,
    pub mine: bool,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    MineHit,
    AlreadyRevealed,
    /// Every tile this call moved from hidden to revealed.
    Revealed(BTreeSet<Position>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    AlreadyHandled,
    Flagged,
    /// The flag was placed, but not on a mine.
    FlaggedNoMine,
    /// The last mine was flagged.
    Won,
}

/// Random source shared by every session for mine placement.
///
/// Clones share one generator behind a dedicated lock, held for the whole
/// placement of a board.
#[derive(Debug, Clone)]
pub struct MineRng {
    inner: Arc<Mutex<StdRng>>,
}

impl MineRng {
    pub fn from_entropy() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic placement: two generators with the same seed lay out the
    /// same sequence of boards.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// Draws `MINE_COUNT` distinct positions by rejection sampling.
    fn draw_mines(&self) -> Vec<Position> {
        let mut rng = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut mines: Vec<Position> = Vec::with_capacity(MINE_COUNT);

        while mines.len() < MINE_COUNT {
            let candidate = Position::new(
                rng.gen_range(0..BOARD_WIDTH),
                rng.gen_range(0..BOARD_HEIGHT),
            );
            if !mines.contains(&candidate) {
                mines.push(candidate);
            }
        }

        mines
    }
}

impl Default for MineRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    tiles: [[Tile; BOARD_HEIGHT]; BOARD_WIDTH],
    remaining_mine_flags: usize,
    over: bool,
    won: bool,
    started_at: Instant,
    ended_at: Option<Instant>,
}

impl GameState {
    /// Starts a game with freshly placed random mines.
    pub fn new(rng: &MineRng) -> Self {
        Self::with_mines(&rng.draw_mines())
    }

    /// Starts a game with mines at exactly the given positions.
    ///
    /// Duplicate positions count once.
    pub fn with_mines(mines: &[Position]) -> Self {
        let mut game = Self {
            tiles: [[Tile::default(); BOARD_HEIGHT]; BOARD_WIDTH],
            remaining_mine_flags: 0,
            over: false,
            won: false,
            started_at: Instant::now(),
            ended_at: None,
        };

        for &pos in mines {
            if game.tile(pos).mine {
                continue;
            }
            game.tile_mut(pos).mine = true;
            game.remaining_mine_flags += 1;
            for neighbor in pos.neighbors() {
                game.tile_mut(neighbor).adjacent_mines += 1;
            }
        }

        debug!("Placed {} mines", game.remaining_mine_flags);
        game
    }

    pub fn tile(&self, pos: Position) -> &Tile {
        &self.tiles[pos.x][pos.y]
    }

    fn tile_mut(&mut self, pos: Position) -> &mut Tile {
        &mut self.tiles[pos.x][pos.y]
    }

    pub fn remaining_mine_flags(&self) -> usize {
        self.remaining_mine_flags
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn is_won(&self) -> bool {
        self.won
    }

    /// Whole seconds from the start of the game to its end, or to now while it
    /// is still running.
    pub fn elapsed_secs(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Instant::now);
        end.duration_since(self.started_at).as_secs()
    }

    pub fn mine_positions(&self) -> Vec<Position> {
        self.positions().filter(|&pos| self.tile(pos).mine).collect()
    }

    /// Reveals a tile, flooding outwards through tiles with no adjacent mines.
    pub fn reveal(&mut self, pos: Position) -> RevealOutcome {
        if self.tile(pos).mine {
            self.finish(false);
            return RevealOutcome::MineHit;
        }
        if self.tile(pos).revealed {
            return RevealOutcome::AlreadyRevealed;
        }

        let mut revealed = BTreeSet::new();
        let mut to_visit = vec![pos];

        while let Some(current) = to_visit.pop() {
            let tile = self.tile_mut(current);
            // The flood only expands from zero tiles, so it never reaches a mine.
            if tile.revealed {
                continue;
            }
            tile.revealed = true;
            revealed.insert(current);

            if tile.adjacent_mines == 0 {
                to_visit.extend(
                    current
                        .neighbors()
                        .filter(|&neighbor| !self.tile(neighbor).revealed),
                );
            }
        }

        RevealOutcome::Revealed(revealed)
    }

    pub fn flag(&mut self, pos: Position) -> FlagOutcome {
        let tile = self.tile_mut(pos);
        if tile.revealed || tile.flagged {
            return FlagOutcome::AlreadyHandled;
        }
        tile.flagged = true;

        if !tile.mine {
            return FlagOutcome::FlaggedNoMine;
        }

        self.remaining_mine_flags -= 1;
        if self.remaining_mine_flags == 0 {
            self.finish(true);
            FlagOutcome::Won
        } else {
            FlagOutcome::Flagged
        }
    }

    /// Ends the game without a result.
    pub fn abandon(&mut self) {
        self.finish(false);
    }

    /// Tile as reported after a reveal or in the end-of-game dump.
    pub fn view(&self, pos: Position) -> TileView {
        let tile = self.tile(pos);
        TileView {
            x: pos.x,
            y: pos.y,
            adjacent_mines: Some(tile.adjacent_mines),
            flagged: tile.flagged,
            mine: tile.mine,
        }
    }

    /// Tile as reported right after it was flagged; its count stays hidden.
    pub fn flag_view(&self, pos: Position) -> TileView {
        TileView {
            adjacent_mines: None,
            ..self.view(pos)
        }
    }

    /// Snapshot of the whole board, column by column.
    pub fn all_tiles(&self) -> Vec<TileView> {
        self.positions().map(|pos| self.view(pos)).collect()
    }

    fn positions(&self) -> impl Iterator<Item = Position> {
        (0..BOARD_WIDTH).flat_map(|x| (0..BOARD_HEIGHT).map(move |y| Position::new(x, y)))
    }

    fn finish(&mut self, won: bool) {
        self.over = true;
        self.won = won;
        self.ended_at = Some(Instant::now());
    }
}
