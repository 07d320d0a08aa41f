//! Per-connection protocol state machine
//!
//! A [`Session`] drives one client from the `connect` greeting through
//! authentication, the menu and any number of games until the client exits
//! or the connection fails:
//!
//! ```text
//! Connected -> Authenticating -> MenuIdle <-> InGame
//!                    |              |           |
//!                    +--------------+-----------+--> Disconnected
//! ```
//!
//! Malformed input is answered with `error` and leaves the state unchanged.
//! Any I/O failure ends the session immediately. The session owns its game
//! outright and touches shared state only through the [`Leaderboard`] API.

use crate::auth::Authenticator;
use crate::game::{FlagOutcome, GameState, MineRng, Position, RevealOutcome};
use crate::leaderboard::Leaderboard;
use log::{debug, error, info, warn};
use shared::{
    sort_leaderboard, Credentials, GameCommand, LeaderboardEntry, MenuCommand, ServerMessage,
    TileView, ACK_MESSAGE, MAX_TX_SIZE,
};
use std::io;
use std::sync::Arc;

/// Message-level connection to one client.
pub trait Transport {
    /// Blocks until the next complete message arrives.
    fn recv(&mut self) -> io::Result<String>;
    fn send(&mut self, message: &str) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticating,
    MenuIdle,
    InGame,
    Disconnected,
}

/// Process-wide services a session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub leaderboard: Arc<Leaderboard>,
    pub authenticator: Arc<dyn Authenticator>,
    pub rng: MineRng,
}

pub struct Session<T> {
    transport: T,
    context: SessionContext,
    state: SessionState,
    username: Option<String>,
    game: Option<GameState>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, context: SessionContext) -> Self {
        Self {
            transport,
            context,
            state: SessionState::Connected,
            username: None,
            game: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs the session until it disconnects.
    pub fn run(&mut self) {
        while self.state != SessionState::Disconnected {
            if let Err(e) = self.step() {
                info!(
                    "Connection for {} closed: {}",
                    self.username().unwrap_or("unauthenticated client"),
                    e
                );
            }
        }
        debug!("Session for {:?} finished", self.username);
    }

    /// Handles one protocol exchange and moves to the next state. An I/O
    /// error leaves the session disconnected and abandons any running game.
    pub fn step(&mut self) -> io::Result<()> {
        let next = match self.state {
            SessionState::Connected => self.greet(),
            SessionState::Authenticating => self.authenticate(),
            SessionState::MenuIdle => self.handle_menu(),
            SessionState::InGame => self.handle_game(),
            SessionState::Disconnected => Ok(SessionState::Disconnected),
        };

        match next {
            Ok(state) => {
                self.state = state;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                self.game = None;
                Err(e)
            }
        }
    }

    fn greet(&mut self) -> io::Result<SessionState> {
        self.send(&ServerMessage::Connect)?;
        Ok(SessionState::Authenticating)
    }

    fn authenticate(&mut self) -> io::Result<SessionState> {
        let message = self.transport.recv()?;

        match message.parse::<Credentials>() {
            Ok(credentials)
                if self
                    .context
                    .authenticator
                    .authenticate(&credentials.username, &credentials.password) =>
            {
                info!("User {} authenticated", credentials.username);
                self.send(&ServerMessage::Accept)?;
                self.username = Some(credentials.username);
                Ok(SessionState::MenuIdle)
            }
            Ok(credentials) => {
                warn!("User {} failed to authenticate", credentials.username);
                Ok(SessionState::Disconnected)
            }
            Err(e) => {
                warn!("Rejected credentials message: {}", e);
                Ok(SessionState::Disconnected)
            }
        }
    }

    fn handle_menu(&mut self) -> io::Result<SessionState> {
        let message = self.transport.recv()?;

        match message.parse::<MenuCommand>() {
            Ok(MenuCommand::Play) => {
                self.send(&ServerMessage::Accept)?;
                self.game = Some(GameState::new(&self.context.rng));
                info!("{} started a game", self.display_name());
                Ok(SessionState::InGame)
            }
            Ok(MenuCommand::Leaderboard) => {
                self.send_leaderboard()?;
                Ok(SessionState::MenuIdle)
            }
            Ok(MenuCommand::Exit) => {
                info!("{} exited", self.display_name());
                Ok(SessionState::Disconnected)
            }
            Err(e) => {
                warn!("Invalid menu option from {}: {}", self.display_name(), e);
                self.send(&ServerMessage::Error)?;
                Ok(SessionState::MenuIdle)
            }
        }
    }

    fn handle_game(&mut self) -> io::Result<SessionState> {
        let message = self.transport.recv()?;

        let command = match message.parse::<GameCommand>() {
            Ok(command) => command,
            Err(e) => {
                warn!("Invalid game command from {}: {}", self.display_name(), e);
                self.send(&ServerMessage::Error)?;
                return Ok(SessionState::InGame);
            }
        };

        match command {
            GameCommand::Reveal { x, y } => self.reveal(Position::new(x, y)),
            GameCommand::Flag { x, y } => self.flag(Position::new(x, y)),
            GameCommand::Quit => {
                if let Some(mut game) = self.game.take() {
                    game.abandon();
                }
                info!("{} quit their game", self.display_name());
                Ok(SessionState::MenuIdle)
            }
        }
    }

    fn reveal(&mut self, pos: Position) -> io::Result<SessionState> {
        let Some(game) = self.game.as_mut() else {
            return Ok(SessionState::MenuIdle);
        };

        match game.reveal(pos) {
            RevealOutcome::MineHit => {
                let seconds = game.elapsed_secs();
                let board = game.all_tiles();
                self.game = None;
                self.finish_lost(seconds, board)
            }
            RevealOutcome::AlreadyRevealed => {
                self.send(&ServerMessage::Error)?;
                Ok(SessionState::InGame)
            }
            RevealOutcome::Revealed(positions) => {
                let tiles = positions.iter().map(|&p| game.view(p)).collect();
                self.send(&ServerMessage::Tiles(tiles))?;
                Ok(SessionState::InGame)
            }
        }
    }

    fn flag(&mut self, pos: Position) -> io::Result<SessionState> {
        let Some(game) = self.game.as_mut() else {
            return Ok(SessionState::MenuIdle);
        };

        match game.flag(pos) {
            FlagOutcome::Won => {
                let seconds = game.elapsed_secs();
                self.game = None;
                info!("{} won in {}s", self.display_name(), seconds);
                self.record(true, seconds);
                self.send(&ServerMessage::GameOver { won: true, seconds })?;
                Ok(SessionState::MenuIdle)
            }
            FlagOutcome::AlreadyHandled => {
                self.send(&ServerMessage::Error)?;
                Ok(SessionState::InGame)
            }
            outcome @ (FlagOutcome::Flagged | FlagOutcome::FlaggedNoMine) => {
                let tile = game.flag_view(pos);
                if outcome == FlagOutcome::FlaggedNoMine {
                    debug!("{} flagged a tile without a mine", self.display_name());
                }
                self.send(&ServerMessage::Tiles(vec![tile]))?;
                Ok(SessionState::InGame)
            }
        }
    }

    /// Reports the loss, then waits for the client's acknowledgement before
    /// revealing the whole board.
    fn finish_lost(&mut self, seconds: u64, board: Vec<TileView>) -> io::Result<SessionState> {
        info!("{} hit a mine after {}s", self.display_name(), seconds);
        self.record(false, seconds);
        self.send(&ServerMessage::GameOver { won: false, seconds })?;

        let ack = self.transport.recv()?;
        if ack.trim() != ACK_MESSAGE {
            warn!("Expected `{}` after a loss, got `{}`", ACK_MESSAGE, ack);
        }

        self.send(&ServerMessage::Tiles(board))?;
        Ok(SessionState::MenuIdle)
    }

    fn send_leaderboard(&mut self) -> io::Result<()> {
        let mut entries = self.context.leaderboard.snapshot();
        sort_leaderboard(&mut entries);

        let entries = keep_best_within(entries, MAX_TX_SIZE - 1);
        if entries.is_empty() {
            return self.send(&ServerMessage::Error);
        }
        self.send(&ServerMessage::Leaderboard(entries))
    }

    fn record(&self, won: bool, seconds: u64) {
        let Some(name) = self.username.as_deref() else {
            return;
        };
        if let Err(e) = self.context.leaderboard.record_result(name, won, seconds) {
            error!("Failed to record result: {}", e);
        }
    }

    fn send(&mut self, message: &ServerMessage) -> io::Result<()> {
        self.transport.send(&message.to_string())
    }

    fn display_name(&self) -> &str {
        self.username().unwrap_or("unauthenticated client")
    }
}

/// Drops entries from the front of a display-ordered leaderboard until the
/// serialized reply fits in `budget` bytes. The best times sit at the end, so
/// they are the ones kept.
fn keep_best_within(entries: Vec<LeaderboardEntry>, budget: usize) -> Vec<LeaderboardEntry> {
    let mut used = 0;
    let mut kept = 0;
    for entry in entries.iter().rev() {
        let cost = entry.to_string().len() + usize::from(kept > 0);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept += 1;
    }

    let dropped = entries.len() - kept;
    if dropped > 0 {
        debug!("Leaderboard reply truncated, {} entries left out", dropped);
    }
    entries.into_iter().skip(dropped).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;
    use shared::{BOARD_HEIGHT, BOARD_WIDTH};
    use std::collections::VecDeque;

    const SEED: u64 = 1234;

    #[derive(Default)]
    struct ScriptedTransport {
        incoming: VecDeque<String>,
        sent: Vec<String>,
    }

    impl ScriptedTransport {
        fn new(incoming: &[&str]) -> Self {
            Self {
                incoming: incoming.iter().map(|m| m.to_string()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn recv(&mut self) -> io::Result<String> {
            self.incoming
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed"))
        }

        fn send(&mut self, message: &str) -> io::Result<()> {
            self.sent.push(message.to_string());
            Ok(())
        }
    }

    fn context() -> SessionContext {
        SessionContext {
            leaderboard: Arc::new(Leaderboard::new()),
            authenticator: Arc::new(CredentialStore::from_pairs([("Maolin", "111111")])),
            rng: MineRng::seeded(SEED),
        }
    }

    /// Mines of the first board a session seeded with `SEED` will deal.
    fn first_board_mines() -> Vec<Position> {
        GameState::new(&MineRng::seeded(SEED)).mine_positions()
    }

    fn first_safe_tile(mines: &[Position]) -> Position {
        (0..BOARD_WIDTH)
            .flat_map(|x| (0..BOARD_HEIGHT).map(move |y| Position::new(x, y)))
            .find(|pos| !mines.contains(pos))
            .unwrap()
    }

    fn run_script(incoming: &[&str]) -> (Vec<String>, SessionContext) {
        let context = context();
        let mut session = Session::new(ScriptedTransport::new(incoming), context.clone());
        session.run();
        assert_eq!(session.state(), SessionState::Disconnected);
        (session.transport().sent.clone(), context)
    }

    #[test]
    fn test_login_then_invalid_menu_option_stays_in_menu() {
        let mut session = Session::new(
            ScriptedTransport::new(&["Maolin,111111", "xyz", "exit"]),
            context(),
        );

        session.step().unwrap();
        assert_eq!(session.state(), SessionState::Authenticating);
        session.step().unwrap();
        assert_eq!(session.state(), SessionState::MenuIdle);
        assert_eq!(session.username(), Some("Maolin"));

        session.step().unwrap();
        assert_eq!(session.state(), SessionState::MenuIdle);

        session.step().unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.transport().sent, vec!["connect", "accept", "error"]);
    }

    #[test]
    fn test_rejected_credentials_disconnect_silently() {
        let (sent, _) = run_script(&["Maolin,wrong"]);
        assert_eq!(sent, vec!["connect"]);

        let (sent, _) = run_script(&["garbage"]);
        assert_eq!(sent, vec!["connect"]);
    }

    #[test]
    fn test_empty_leaderboard_replies_error() {
        let (sent, _) = run_script(&["Maolin,111111", "lb", "exit"]);
        assert_eq!(sent, vec!["connect", "accept", "error"]);
    }

    #[test]
    fn test_winning_game_is_recorded() {
        let mines = first_board_mines();
        let flags: Vec<String> = mines.iter().map(|p| format!("f,{},{}", p.x, p.y)).collect();

        let mut script = vec!["Maolin,111111", "play"];
        script.extend(flags.iter().map(String::as_str));
        script.extend(["lb", "exit"]);

        let (sent, context) = run_script(&script);

        assert_eq!(&sent[..3], &["connect", "accept", "accept"]);
        for (reply, mine) in sent[3..12].iter().zip(&mines) {
            assert_eq!(reply, &format!("t,{},{},-1,1,1", mine.x, mine.y));
        }
        assert!(sent[12].starts_with("over,1,"));

        let ServerMessage::Leaderboard(entries) = sent[13].parse::<ServerMessage>().unwrap() else {
            panic!("expected leaderboard, got {}", sent[13]);
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Maolin");
        assert_eq!((entries[0].wins, entries[0].plays), (1, 1));

        let user = context.leaderboard.user("Maolin").unwrap();
        assert_eq!(user.wins, 1);
    }

    #[test]
    fn test_mine_hit_waits_for_ack_then_dumps_board() {
        let mine = first_board_mines()[0];
        let reveal = format!("r,{},{}", mine.x, mine.y);

        let mut session = Session::new(
            ScriptedTransport::new(&["Maolin,111111", "play", &reveal, "ok", "lb"]),
            context(),
        );
        for _ in 0..4 {
            session.step().unwrap();
        }
        assert_eq!(session.state(), SessionState::InGame);

        session.step().unwrap();
        assert_eq!(session.state(), SessionState::MenuIdle);
        assert!(session.game().is_none());

        let sent = &session.transport().sent;
        assert!(sent[3].starts_with("over,0,"));
        let ServerMessage::Tiles(board) = sent[4].parse::<ServerMessage>().unwrap() else {
            panic!("expected board dump");
        };
        assert_eq!(board.len(), BOARD_WIDTH * BOARD_HEIGHT);

        // A loss counts as a play but never appears on the leaderboard.
        session.step().unwrap();
        assert_eq!(session.transport().sent[5], "error");
        let user = session.context.leaderboard.user("Maolin").unwrap();
        assert_eq!((user.wins, user.plays), (0, 1));
    }

    #[test]
    fn test_reveal_twice_replies_error() {
        let safe = first_safe_tile(&first_board_mines());
        let reveal = format!("r,{},{}", safe.x, safe.y);

        let mut session = Session::new(
            ScriptedTransport::new(&["Maolin,111111", "play", &reveal, &reveal]),
            context(),
        );
        for _ in 0..5 {
            session.step().unwrap();
        }

        let sent = &session.transport().sent;
        let ServerMessage::Tiles(tiles) = sent[3].parse::<ServerMessage>().unwrap() else {
            panic!("expected tiles");
        };
        assert!(tiles.iter().any(|t| (t.x, t.y) == (safe.x, safe.y)));
        assert!(tiles.iter().all(|t| !t.mine));
        assert_eq!(sent[4], "error");
        assert_eq!(session.state(), SessionState::InGame);
    }

    #[test]
    fn test_invalid_game_input_stays_in_game() {
        let mut session = Session::new(
            ScriptedTransport::new(&["Maolin,111111", "play", "r,9,9", "hello", "f,1"]),
            context(),
        );
        for _ in 0..6 {
            session.step().unwrap();
            assert_ne!(session.state(), SessionState::Disconnected);
        }

        assert_eq!(session.state(), SessionState::InGame);
        assert_eq!(&session.transport().sent[3..], &["error", "error", "error"]);
    }

    #[test]
    fn test_flag_without_mine_reports_tile() {
        let safe = first_safe_tile(&first_board_mines());
        let flag = format!("f,{},{}", safe.x, safe.y);

        let (sent, _) = run_script(&["Maolin,111111", "play", &flag, &flag]);
        assert_eq!(sent[3], format!("t,{},{},-1,1,0", safe.x, safe.y));
        assert_eq!(sent[4], "error");
    }

    #[test]
    fn test_quit_returns_to_menu_without_record() {
        let mut session = Session::new(
            ScriptedTransport::new(&["Maolin,111111", "play", "quit"]),
            context(),
        );
        for _ in 0..4 {
            session.step().unwrap();
        }

        assert_eq!(session.state(), SessionState::MenuIdle);
        assert!(session.game().is_none());
        assert!(session.context.leaderboard.user("Maolin").is_none());
    }

    #[test]
    fn test_disconnect_mid_game_records_nothing() {
        let (sent, context) = run_script(&["Maolin,111111", "play"]);
        assert_eq!(sent, vec!["connect", "accept", "accept"]);
        assert!(context.leaderboard.user("Maolin").is_none());
    }

    #[test]
    fn test_step_error_disconnects() {
        let mut session = Session::new(ScriptedTransport::new(&[]), context());
        session.step().unwrap();

        let err = session.step().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_keep_best_within_drops_slowest() {
        let mut entries: Vec<LeaderboardEntry> = (0..200)
            .map(|i| LeaderboardEntry {
                name: format!("player{}", i),
                seconds: 1000 - i,
                wins: 1,
                plays: 2,
            })
            .collect();
        sort_leaderboard(&mut entries);
        let best = entries.last().cloned().unwrap();

        let kept = keep_best_within(entries, MAX_TX_SIZE - 1);
        let reply = ServerMessage::Leaderboard(kept.clone()).to_string();

        assert!(reply.len() <= MAX_TX_SIZE - 1);
        assert!(kept.len() < 200);
        assert_eq!(kept.last(), Some(&best));
    }

    #[test]
    fn test_keep_best_within_keeps_everything_that_fits() {
        let entries = vec![LeaderboardEntry {
            name: "a".to_string(),
            seconds: 5,
            wins: 1,
            plays: 1,
        }];
        assert_eq!(keep_best_within(entries.clone(), 100), entries);
    }
}
