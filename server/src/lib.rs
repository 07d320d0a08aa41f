//! # Minesweeper Server Library
//!
//! This library implements a multi-user minesweeper server. Clients connect
//! over TCP, authenticate against a credential file, and then play any number
//! of private 9x9 games. Every finished game is recorded on a leaderboard
//! shared by all connections.
//!
//! ## Core Responsibilities
//!
//! ### Connection Handling
//! Each accepted connection becomes one task on a fixed-size worker pool. A
//! worker runs the connection's whole session before taking the next task, so
//! the pool size bounds how many clients are served at once. Connections that
//! arrive while every worker is busy wait in the pool's queue.
//!
//! ### Game Logic
//! Every session owns its own board. Mines are placed from a random source
//! shared by all sessions; revealing a zero tile floods outward through its
//! zero-valued region, and flagging the last mine wins the game.
//!
//! ### Shared Leaderboard
//! Wins and plays are counted per user. The leaderboard admits many readers
//! at once but gives writers exclusive access, so a reply is always built
//! from a consistent snapshot.
//!
//! ## Architecture Design
//!
//! ### Blocking Threads
//! The server is built from plain OS threads and blocking sockets: one
//! acceptor thread and one thread per worker. Sessions never share mutable
//! state except through the [`leaderboard::Leaderboard`] API.
//!
//! ### Text Protocol
//! Messages are comma-separated text, each followed by a NUL byte so that
//! messages split or merged by TCP can be told apart again. The message
//! grammar lives in the `shared` crate.
//!
//! ## Module Organization
//!
//! ### Authentication (`auth`)
//! The [`auth::Authenticator`] trait and the file-backed credential store.
//!
//! ### Client Manager (`client_manager`)
//! Registry of live connections, used to force sockets closed on shutdown.
//!
//! ### Game (`game`)
//! Board generation, reveal with flood fill, flagging and win detection.
//!
//! ### Leaderboard (`leaderboard`)
//! Per-user statistics behind a readers-writer protocol.
//!
//! ### Network (`network`)
//! TCP acceptor, framed transport and shutdown coordination.
//!
//! ### Pool (`pool`)
//! Fixed-size worker threads fed by a FIFO task queue.
//!
//! ### Session (`session`)
//! The per-connection protocol state machine.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::CredentialStore;
//! use server::network::{Server, ServerConfig};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = CredentialStore::load("Authentication.txt")?;
//!     let server = Server::bind(&ServerConfig::default(), Arc::new(credentials))?;
//!
//!     // Another thread can stop the server through this handle.
//!     let _shutdown = server.shutdown_handle();
//!
//!     // Blocks until shutdown, then closes every connection and joins the
//!     // workers.
//!     server.run();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client_manager;
pub mod game;
pub mod leaderboard;
pub mod network;
pub mod pool;
pub mod session;
