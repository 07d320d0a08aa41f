//! Types and wire format shared by the minesweeper server and client.
//!
//! The protocol is plain comma-separated text. Each message travels as one
//! NUL-terminated frame (see [`framing`]), and the message grammar lives in
//! [`protocol`]. Board dimensions are fixed.

pub mod framing;
pub mod protocol;

use std::cmp::Ordering;
use std::fmt;

pub use framing::{encode_frame, FrameBuffer, FrameError};
pub use protocol::{
    ClientMessage, Credentials, GameCommand, MenuCommand, ProtocolError, ServerMessage,
};

pub const BOARD_WIDTH: usize = 9;
pub const BOARD_HEIGHT: usize = 9;
pub const MINE_COUNT: usize = 10;

/// Largest frame a peer will accept, terminator included.
pub const MAX_RX_SIZE: usize = 1000;
/// Largest frame a peer will send, terminator included.
pub const MAX_TX_SIZE: usize = 1000;

pub const DEFAULT_PORT: u16 = 12345;

/// Reply sent for protocol errors and rejected game moves.
pub const ERROR_REPLY: &str = "error";
/// Client acknowledgement of a lost game, answered with the full board.
pub const ACK_MESSAGE: &str = "ok";

/// One tile as reported to a client.
///
/// `adjacent_mines` is `None` for tiles whose count is not disclosed, which is
/// how a freshly flagged (unrevealed) tile is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileView {
    pub x: usize,
    pub y: usize,
    pub adjacent_mines: Option<u8>,
    pub flagged: bool,
    pub mine: bool,
}

impl fmt::Display for TileView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let adjacent = self.adjacent_mines.map_or(-1, i16::from);
        write!(
            f,
            "t,{},{},{},{},{}",
            self.x,
            self.y,
            adjacent,
            u8::from(self.flagged),
            u8::from(self.mine)
        )
    }
}

/// One leaderboard line: a single win of a single user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub seconds: u64,
    pub wins: u32,
    pub plays: u32,
}

impl fmt::Display for LeaderboardEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "l,{},{},{},{}",
            self.name, self.seconds, self.wins, self.plays
        )
    }
}

/// Orders entries for display, best time last.
///
/// Slower times come first. Equal times put the player with more wins later,
/// and any remaining tie is broken alphabetically.
pub fn sort_leaderboard(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(display_order);
}

fn display_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.seconds
        .cmp(&a.seconds)
        .then(a.wins.cmp(&b.wins))
        .then_with(|| a.name.cmp(&b.name))
}
