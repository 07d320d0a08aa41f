//! Registry of live client connections
//!
//! The acceptor registers every connection before queueing it on the worker
//! pool and the owning session unregisters it when it ends. On shutdown the
//! server uses [`ClientManager::disconnect_all`] to close every socket, which
//! unblocks sessions parked in a read so the workers can be joined.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// A connection known to the server.
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Handle used to force the socket closed. `None` for untracked sockets.
    stream: Option<TcpStream>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, stream: Option<TcpStream>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            stream,
        }
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    fn disconnect(&self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Client {} socket already closed: {}", self.id, e);
            }
        }
    }
}

#[derive(Debug)]
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    next_client_id: u32,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    /// Client IDs start from 1 and increase with every connection.
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Registers a connection and returns its ID. The stream is a clone of
    /// the session's socket; it is only used to shut the socket down.
    pub fn add_client(&mut self, addr: SocketAddr, stream: Option<TcpStream>) -> u32 {
        let client_id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, stream));
        client_id
    }

    /// Returns true if the client was found and removed.
    pub fn remove_client(&mut self, client_id: u32) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!(
                "Client {} disconnected after {:.1}s",
                client.id,
                client.connected_for().as_secs_f64()
            );
            true
        } else {
            false
        }
    }

    /// Shuts down every registered socket and forgets the clients.
    pub fn disconnect_all(&mut self) -> usize {
        let count = self.clients.len();
        for (_, client) in self.clients.drain() {
            client.disconnect();
        }
        if count > 0 {
            warn!("Forced {} client connections closed", count);
        }
        count
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
