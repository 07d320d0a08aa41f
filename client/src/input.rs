//! User command parsing for the terminal client
//!
//! Players name tiles by row letter and column digit (`B7` is row B, column
//! 7). The wire uses 0-based `x,y` with `x` as the column, so `B7` becomes
//! `x = 6, y = 1`.

use shared::{GameCommand, MenuCommand, BOARD_HEIGHT, BOARD_WIDTH};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("no command entered")]
    Empty,
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("`{0}` is not a tile, use a row letter and a column digit like B7")]
    BadCoordinate(String),
}

/// Letter shown for row `y`.
pub fn row_label(y: usize) -> char {
    u8::try_from(y)
        .ok()
        .and_then(|y| b'A'.checked_add(y))
        .map_or('?', char::from)
}

/// Parses `<row letter><column digit>` into wire coordinates `(x, y)`.
pub fn parse_coordinate(input: &str) -> Result<(usize, usize), InputError> {
    let bad = || InputError::BadCoordinate(input.trim().to_string());

    let mut chars = input.trim().chars();
    let (Some(row), Some(column), None) = (chars.next(), chars.next(), chars.next()) else {
        return Err(bad());
    };

    let row = row.to_ascii_uppercase();
    let y = (row as usize).checked_sub('A' as usize).ok_or_else(bad)?;
    let x = column
        .to_digit(10)
        .and_then(|digit| (digit as usize).checked_sub(1))
        .ok_or_else(bad)?;

    if !row.is_ascii_uppercase() || x >= BOARD_WIDTH || y >= BOARD_HEIGHT {
        return Err(bad());
    }
    Ok((x, y))
}

/// Main menu: `1` play, `2` leaderboard, `3` exit.
pub fn parse_menu_choice(input: &str) -> Result<MenuCommand, InputError> {
    match input.trim() {
        "1" => Ok(MenuCommand::Play),
        "2" => Ok(MenuCommand::Leaderboard),
        "3" => Ok(MenuCommand::Exit),
        "" => Err(InputError::Empty),
        other => Err(InputError::UnknownOption(other.to_string())),
    }
}

/// In-game input: `R <tile>` reveals, `P <tile>` places a flag, `Q` quits.
pub fn parse_game_input(input: &str) -> Result<GameCommand, InputError> {
    let mut parts = input.split_whitespace();
    let Some(option) = parts.next() else {
        return Err(InputError::Empty);
    };

    match option.to_ascii_uppercase().as_str() {
        "Q" => Ok(GameCommand::Quit),
        "R" | "P" => {
            let tile = parts.next().unwrap_or_default();
            let (x, y) = parse_coordinate(tile)?;
            if option.eq_ignore_ascii_case("r") {
                Ok(GameCommand::Reveal { x, y })
            } else {
                Ok(GameCommand::Flag { x, y })
            }
        }
        _ => Err(InputError::UnknownOption(option.to_string())),
    }
}
