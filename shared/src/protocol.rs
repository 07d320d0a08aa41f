//! Text message grammar for client/server communication
//!
//! Messages are comma-separated with no escaping. What a client message means
//! depends on the session state, so the server parses with the type for its
//! current state: [`Credentials`] while authenticating, [`MenuCommand`] at the
//! menu and [`GameCommand`] during a game. Coordinates are 0-based on the wire,
//! `x` being the column and `y` the row.

use crate::{LeaderboardEntry, TileView, ACK_MESSAGE, BOARD_HEIGHT, BOARD_WIDTH, ERROR_REPLY};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("malformed message `{0}`")]
    Malformed(String),
    #[error("`{0}` is not a valid number")]
    InvalidNumber(String),
    #[error("coordinate ({x}, {y}) is outside the board")]
    OutOfBounds { x: usize, y: usize },
}

/// `username,password` sent once after the server's `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl FromStr for Credentials {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(',') {
            Some((username, password)) if !username.is_empty() && !password.is_empty() => {
                Ok(Self {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            _ => Err(ProtocolError::Malformed(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Play,
    Leaderboard,
    Exit,
}

impl FromStr for MenuCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "play" => Ok(Self::Play),
            "lb" => Ok(Self::Leaderboard),
            "exit" => Ok(Self::Exit),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for MenuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Play => "play",
            Self::Leaderboard => "lb",
            Self::Exit => "exit",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameCommand {
    Reveal { x: usize, y: usize },
    Flag { x: usize, y: usize },
    Quit,
}

impl FromStr for GameCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "quit" {
            return Ok(Self::Quit);
        }

        let fields: Vec<&str> = s.split(',').collect();
        let [kind, x, y] = fields.as_slice() else {
            return Err(ProtocolError::Malformed(s.to_string()));
        };

        let x: usize = parse_number(x)?;
        let y: usize = parse_number(y)?;
        if x >= BOARD_WIDTH || y >= BOARD_HEIGHT {
            return Err(ProtocolError::OutOfBounds { x, y });
        }

        match *kind {
            "r" => Ok(Self::Reveal { x, y }),
            "f" => Ok(Self::Flag { x, y }),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for GameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reveal { x, y } => write!(f, "r,{},{}", x, y),
            Self::Flag { x, y } => write!(f, "f,{},{}", x, y),
            Self::Quit => f.write_str("quit"),
        }
    }
}

/// Anything a client may put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Login(Credentials),
    Menu(MenuCommand),
    Game(GameCommand),
    /// Acknowledges a lost game so the server sends the full board.
    Ack,
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login(credentials) => {
                write!(f, "{},{}", credentials.username, credentials.password)
            }
            Self::Menu(command) => fmt::Display::fmt(command, f),
            Self::Game(command) => fmt::Display::fmt(command, f),
            Self::Ack => f.write_str(ACK_MESSAGE),
        }
    }
}

/// Anything the server may put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Connection accepted, credentials expected.
    Connect,
    /// Login or play request accepted.
    Accept,
    Error,
    Tiles(Vec<TileView>),
    GameOver { won: bool, seconds: u64 },
    Leaderboard(Vec<LeaderboardEntry>),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Accept => f.write_str("accept"),
            Self::Error => f.write_str(ERROR_REPLY),
            Self::Tiles(tiles) => write_joined(f, tiles),
            Self::GameOver { won, seconds } => write!(f, "over,{},{}", u8::from(*won), seconds),
            Self::Leaderboard(entries) => write_joined(f, entries),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "connect" => return Ok(Self::Connect),
            "accept" => return Ok(Self::Accept),
            ERROR_REPLY => return Ok(Self::Error),
            _ => {}
        }

        let fields: Vec<&str> = s.split(',').collect();
        match fields.first().copied() {
            Some("over") => parse_game_over(s, &fields),
            Some("t") => parse_tiles(s, &fields).map(Self::Tiles),
            Some("l") => parse_leaderboard(s, &fields).map(Self::Leaderboard),
            _ => Err(ProtocolError::UnknownCommand(s.to_string())),
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        item.fmt(f)?;
    }
    Ok(())
}

fn parse_number<T: FromStr>(field: &str) -> Result<T, ProtocolError> {
    field
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(field.to_string()))
}

fn parse_bit(field: &str) -> Result<bool, ProtocolError> {
    match field {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ProtocolError::InvalidNumber(other.to_string())),
    }
}

fn parse_game_over(raw: &str, fields: &[&str]) -> Result<ServerMessage, ProtocolError> {
    let [_, won, seconds] = fields else {
        return Err(ProtocolError::Malformed(raw.to_string()));
    };
    Ok(ServerMessage::GameOver {
        won: parse_bit(won)?,
        seconds: parse_number(seconds)?,
    })
}

fn parse_tiles(raw: &str, fields: &[&str]) -> Result<Vec<TileView>, ProtocolError> {
    if fields.len() % 6 != 0 {
        return Err(ProtocolError::Malformed(raw.to_string()));
    }

    fields
        .chunks(6)
        .map(|chunk| {
            if chunk[0] != "t" {
                return Err(ProtocolError::Malformed(raw.to_string()));
            }
            let adjacent: i16 = parse_number(chunk[3])?;
            let adjacent_mines = match adjacent {
                -1 => None,
                0..=8 => Some(adjacent as u8),
                _ => return Err(ProtocolError::InvalidNumber(chunk[3].to_string())),
            };
            Ok(TileView {
                x: parse_number(chunk[1])?,
                y: parse_number(chunk[2])?,
                adjacent_mines,
                flagged: parse_bit(chunk[4])?,
                mine: parse_bit(chunk[5])?,
            })
        })
        .collect()
}

fn parse_leaderboard(raw: &str, fields: &[&str]) -> Result<Vec<LeaderboardEntry>, ProtocolError> {
    if fields.len() % 5 != 0 {
        return Err(ProtocolError::Malformed(raw.to_string()));
    }

    fields
        .chunks(5)
        .map(|chunk| {
            if chunk[0] != "l" {
                return Err(ProtocolError::Malformed(raw.to_string()));
            }
            Ok(LeaderboardEntry {
                name: chunk[1].to_string(),
                seconds: parse_number(chunk[2])?,
                wins: parse_number(chunk[3])?,
                plays: parse_number(chunk[4])?,
            })
        })
        .collect()
}
