//! Server network layer: TCP acceptor, framed transport and shutdown

use crate::auth::Authenticator;
use crate::client_manager::ClientManager;
use crate::game::MineRng;
use crate::leaderboard::Leaderboard;
use crate::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::session::{Session, SessionContext, Transport};
use log::{debug, info, warn};
use shared::{encode_frame, FrameBuffer, DEFAULT_PORT, MAX_RX_SIZE, MAX_TX_SIZE};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Settings the server binary passes into the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub workers: usize,
    /// Fixed seed for mine placement. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            workers: DEFAULT_WORKERS,
            seed: None,
        }
    }
}

/// NUL-framed messages over a blocking TCP stream.
pub struct TcpTransport {
    stream: TcpStream,
    frames: FrameBuffer,
    buffer: [u8; MAX_RX_SIZE],
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            frames: FrameBuffer::with_limit(MAX_RX_SIZE),
            buffer: [0; MAX_RX_SIZE],
        }
    }
}

impl Transport for TcpTransport {
    fn recv(&mut self) -> io::Result<String> {
        loop {
            if let Some(frame) = self
                .frames
                .next_frame()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                return Ok(frame);
            }

            let read = self.stream.read(&mut self.buffer)?;
            if read == 0 {
                if self.frames.buffered_len() > 0 {
                    debug!(
                        "Peer closed with {} bytes of an unfinished message",
                        self.frames.buffered_len()
                    );
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
            self.frames.push(&self.buffer[..read]);
        }
    }

    fn send(&mut self, message: &str) -> io::Result<()> {
        let frame = encode_frame(message);
        if frame.len() > MAX_TX_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "message of {} bytes exceeds the {} byte limit",
                    frame.len(),
                    MAX_TX_SIZE
                ),
            ));
        }
        self.stream.write_all(&frame)
    }
}

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutdown requested");

        // accept() only returns on a new connection.
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, Duration::from_secs(1)) {
            warn!("Failed to wake the acceptor: {}", e);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Accepts connections and runs one session per connection on the worker
/// pool.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    pool: WorkerPool,
    clients: Arc<Mutex<ClientManager>>,
    context: SessionContext,
    stop: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(
        config: &ServerConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.bind_addr)?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let rng = match config.seed {
            Some(seed) => {
                info!("Mine placement seeded with {}", seed);
                MineRng::seeded(seed)
            }
            None => MineRng::from_entropy(),
        };

        Ok(Self {
            listener,
            local_addr,
            pool: WorkerPool::new(config.workers)?,
            clients: Arc::new(Mutex::new(ClientManager::new())),
            context: SessionContext {
                leaderboard: Arc::new(Leaderboard::new()),
                authenticator,
                rng,
            },
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn leaderboard(&self) -> Arc<Leaderboard> {
        Arc::clone(&self.context.leaderboard)
    }

    pub fn connected_clients(&self) -> usize {
        lock(&self.clients).len()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };

        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            wake_addr: SocketAddr::new(ip, self.local_addr.port()),
        }
    }

    /// Accepts connections until a [`ShutdownHandle`] fires, then tears the
    /// server down.
    pub fn run(mut self) {
        info!("Server started successfully");

        for incoming in self.listener.incoming() {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            match incoming {
                Ok(stream) => self.dispatch(stream),
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }

        self.teardown();
    }

    fn dispatch(&self, stream: TcpStream) {
        let addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Dropping connection without a peer address: {}", e);
                return;
            }
        };

        let tracked = match stream.try_clone() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Cannot track connection from {}: {}", addr, e);
                None
            }
        };
        let client_id = lock(&self.clients).add_client(addr, tracked);

        let clients = Arc::clone(&self.clients);
        let context = self.context.clone();
        let task = move || {
            let mut session = Session::new(TcpTransport::new(stream), context);
            session.run();
            lock(&clients).remove_client(client_id);
        };

        if let Err(e) = self.pool.submit(task) {
            warn!("Dropping connection from {}: {}", addr, e);
            lock(&self.clients).remove_client(client_id);
        } else {
            debug!("Queued client {} ({} waiting)", client_id, self.pool.pending());
        }
    }

    fn teardown(&mut self) {
        info!(
            "Server shutting down with {} connected clients",
            self.connected_clients()
        );

        self.pool.close();
        for (id, addr) in lock(&self.clients).get_client_addrs() {
            debug!("Disconnecting client {} at {}", id, addr);
        }
        lock(&self.clients).disconnect_all();
        self.pool.shutdown();
        self.context.leaderboard.shutdown();

        info!("Server stopped");
    }
}

fn lock(clients: &Mutex<ClientManager>) -> MutexGuard<'_, ClientManager> {
    clients.lock().unwrap_or_else(PoisonError::into_inner)
}
