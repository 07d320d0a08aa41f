//! # Minesweeper Client Library
//!
//! Client-side pieces for talking to the minesweeper server from a terminal:
//! an async protocol client, a local copy of the board, and parsing for what
//! the player types.
//!
//! ## Architecture Overview
//!
//! The server owns every game. The client never decides whether a move is
//! legal or whether a game is won; it sends the player's command, waits for
//! the reply, and folds any tile deltas into its [`board::ClientBoard`].
//! Exactly one request is outstanding at a time, so replies never need to be
//! matched to requests.
//!
//! ## Module Organization
//!
//! ### Board Module (`board`)
//! - Mirror of the tiles the server has disclosed
//! - Remaining-mine counter driven by correct flags
//! - Text rendering with row letters and column digits
//!
//! ### Input Module (`input`)
//! - Menu choices (`1` play, `2` leaderboard, `3` exit)
//! - Game commands (`R B7` reveal, `P B7` flag, `Q` quit)
//! - Translation from `B7` style tiles to 0-based wire coordinates
//!
//! ### Network Module (`network`)
//! - NUL-framed messages over any `AsyncRead + AsyncWrite` stream
//! - One method per protocol request, returning the typed reply
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::board::ClientBoard;
//! use client::network::{Client, MoveResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:12345").await?;
//!     client.login("Maolin", "111111").await?;
//!     client.play().await?;
//!
//!     let mut board = ClientBoard::new();
//!     if let MoveResult::Tiles(tiles) = client.reveal(4, 4).await? {
//!         board.apply(&tiles);
//!     }
//!     println!("{}", board);
//!
//!     client.quit().await?;
//!     client.exit().await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod input;
pub mod network;
