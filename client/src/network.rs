//! Async protocol client for the minesweeper server

use log::{debug, info, warn};
use shared::{
    encode_frame, ClientMessage, Credentials, FrameBuffer, FrameError, GameCommand,
    LeaderboardEntry, MenuCommand, ProtocolError, ServerMessage, TileView, MAX_RX_SIZE,
};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("bad frame from server: {0}")]
    Frame(#[from] FrameError),
    #[error("bad message from server: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("unexpected reply `{0}`")]
    Unexpected(String),
    #[error("login rejected")]
    Rejected,
    #[error("server closed the connection")]
    Closed,
}

/// Server's answer to a reveal or flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    /// Tiles that changed.
    Tiles(Vec<TileView>),
    /// The move was rejected; the game continues.
    Invalid,
    GameOver { won: bool, seconds: u64 },
}

/// One connection to the server, generic over the byte stream so it can run
/// on a socket or a scripted stream.
pub struct Client<S> {
    stream: S,
    frames: FrameBuffer,
    buffer: Vec<u8>,
}

impl Client<TcpStream> {
    /// Connects and waits for the server's greeting. The greeting only comes
    /// once a worker picks the connection up.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        info!("Connected to {}", stream.peer_addr()?);

        let mut client = Self::new(stream);
        client.handshake().await?;
        Ok(client)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(),
            buffer: vec![0; MAX_RX_SIZE],
        }
    }

    /// Reads the `connect` greeting.
    pub async fn handshake(&mut self) -> Result<(), ClientError> {
        match self.recv().await? {
            ServerMessage::Connect => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Sends credentials. The server closes the connection on a bad login.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        self.send(&ClientMessage::Login(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }))
        .await?;

        match self.recv().await {
            Ok(ServerMessage::Accept) => {
                info!("Logged in as {}", username);
                Ok(())
            }
            Ok(other) => Err(unexpected(other)),
            Err(ClientError::Closed) => Err(ClientError::Rejected),
            Err(e) => Err(e),
        }
    }

    pub async fn play(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Menu(MenuCommand::Play)).await?;
        match self.recv().await? {
            ServerMessage::Accept => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Fetches the leaderboard. An empty board comes back as `error`.
    pub async fn leaderboard(&mut self) -> Result<Vec<LeaderboardEntry>, ClientError> {
        self.send(&ClientMessage::Menu(MenuCommand::Leaderboard))
            .await?;
        match self.recv().await? {
            ServerMessage::Leaderboard(entries) => Ok(entries),
            ServerMessage::Error => Ok(Vec::new()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn exit(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Menu(MenuCommand::Exit)).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    pub async fn reveal(&mut self, x: usize, y: usize) -> Result<MoveResult, ClientError> {
        self.game_move(GameCommand::Reveal { x, y }).await
    }

    pub async fn flag(&mut self, x: usize, y: usize) -> Result<MoveResult, ClientError> {
        self.game_move(GameCommand::Flag { x, y }).await
    }

    /// Acknowledges a lost game and returns the full board.
    pub async fn acknowledge(&mut self) -> Result<Vec<TileView>, ClientError> {
        self.send(&ClientMessage::Ack).await?;
        match self.recv().await? {
            ServerMessage::Tiles(tiles) => Ok(tiles),
            other => Err(unexpected(other)),
        }
    }

    /// Abandons the current game. The server does not reply.
    pub async fn quit(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Game(GameCommand::Quit)).await
    }

    async fn game_move(&mut self, command: GameCommand) -> Result<MoveResult, ClientError> {
        self.send(&ClientMessage::Game(command)).await?;
        match self.recv().await? {
            ServerMessage::Tiles(tiles) => Ok(MoveResult::Tiles(tiles)),
            ServerMessage::Error => {
                warn!("Server rejected `{}`", command);
                Ok(MoveResult::Invalid)
            }
            ServerMessage::GameOver { won, seconds } => Ok(MoveResult::GameOver { won, seconds }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        debug!("Sending {}", message);
        self.stream
            .write_all(&encode_frame(&message.to_string()))
            .await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        loop {
            if let Some(frame) = self.frames.next_frame()? {
                debug!("Received {}", frame);
                return Ok(frame.parse()?);
            }

            let read = self.stream.read(&mut self.buffer).await?;
            if read == 0 {
                if self.frames.buffered_len() > 0 {
                    debug!(
                        "Server closed with {} bytes of an unfinished message",
                        self.frames.buffered_len()
                    );
                }
                return Err(ClientError::Closed);
            }
            self.frames.push(&self.buffer[..read]);
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

fn unexpected(message: ServerMessage) -> ClientError {
    ClientError::Unexpected(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_handshake_and_login() {
        let stream = Builder::new()
            .read(b"connect\0")
            .write(b"Maolin,111111\0")
            .read(b"accept\0")
            .build();

        let mut client = Client::new(stream);
        client.handshake().await.unwrap();
        client.login("Maolin", "111111").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_login_reports_rejection() {
        let stream = Builder::new()
            .read(b"connect\0")
            .write(b"Maolin,bad\0")
            .build();

        let mut client = Client::new(stream);
        client.handshake().await.unwrap();
        let err = client.login("Maolin", "bad").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected));
    }

    #[tokio::test]
    async fn test_handshake_rejects_other_greeting() {
        let stream = Builder::new().read(b"accept\0").build();

        let mut client = Client::new(stream);
        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, ClientError::Unexpected(reply) if reply == "accept"));
    }

    #[tokio::test]
    async fn test_reveal_parses_tiles_across_reads() {
        let stream = Builder::new()
            .write(b"r,0,0\0")
            .read(b"t,0,0,0,0,0,")
            .read(b"t,1,0,1,0,0\0")
            .build();

        let mut client = Client::new(stream);
        let MoveResult::Tiles(tiles) = client.reveal(0, 0).await.unwrap() else {
            panic!("expected tiles");
        };
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].adjacent_mines, Some(1));
    }

    #[tokio::test]
    async fn test_invalid_move_and_game_over() {
        let stream = Builder::new()
            .write(b"r,4,4\0")
            .read(b"error\0")
            .write(b"f,2,3\0")
            .read(b"over,1,42\0")
            .build();

        let mut client = Client::new(stream);
        assert_eq!(client.reveal(4, 4).await.unwrap(), MoveResult::Invalid);
        assert_eq!(
            client.flag(2, 3).await.unwrap(),
            MoveResult::GameOver {
                won: true,
                seconds: 42
            }
        );
    }

    #[tokio::test]
    async fn test_acknowledge_returns_board() {
        let stream = Builder::new()
            .write(b"ok\0")
            .read(b"t,0,0,1,0,1,t,0,1,2,0,0\0")
            .build();

        let mut client = Client::new(stream);
        let board = client.acknowledge().await.unwrap();
        assert_eq!(board.len(), 2);
        assert!(board[0].mine);
    }

    #[tokio::test]
    async fn test_leaderboard_entries_and_empty_board() {
        let stream = Builder::new()
            .write(b"lb\0")
            .read(b"l,Jason,30,1,2,l,Maolin,12,2,3\0")
            .write(b"lb\0")
            .read(b"error\0")
            .build();

        let mut client = Client::new(stream);
        let entries = client.leaderboard().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "Maolin");
        assert!(client.leaderboard().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let stream = Builder::new().write(b"play\0").build();

        let mut client = Client::new(stream);
        assert!(matches!(client.play().await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_quit_expects_no_reply() {
        let stream = Builder::new().write(b"quit\0").build();

        let mut client = Client::new(stream);
        client.quit().await.unwrap();
    }
}
