//! Client connection management for the multiplayer server
//!
//! This module tracks which network addresses belong to which players:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Forwarding of decoded input packets into each player's input channel
//! - Connection health monitoring and automatic cleanup
//!
//! Ordering and duplicate rejection of inputs happen on the coordinator side
//! of the channel. The manager only moves packets from the socket to the
//! right sender.

use crate::coordinator::PlayerLink;
use log::{info, warn};
use shared::{InputPacket, PlayerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default time without any packet before a client is dropped
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a connected client
///
/// Each client keeps its connection metadata and the sending half of its
/// input channel. Packets that do not fit in the channel are counted and
/// dropped rather than awaited.
#[derive(Debug)]
pub struct Client {
    /// Player identifier assigned by the server
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    inputs: mpsc::Sender<InputPacket>,
    /// Packets handed to the input channel
    pub forwarded: u64,
    /// Packets lost to a full or closed channel
    pub dropped: u64,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr, inputs: mpsc::Sender<InputPacket>) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            inputs,
            forwarded: 0,
            dropped: 0,
        }
    }

    /// Marks the client as alive.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Passes a packet to the coordinator without waiting.
    ///
    /// Returns false when the channel is full or the coordinator dropped its
    /// end, in which case the packet is lost. The client stops replaying
    /// inputs that stay unacknowledged past its pending timeout.
    pub fn forward_input(&mut self, packet: InputPacket) -> bool {
        self.touch();
        match self.inputs.try_send(packet) {
            Ok(()) => {
                self.forwarded += 1;
                true
            }
            Err(TrySendError::Full(packet)) => {
                self.dropped += 1;
                warn!(
                    "Input channel for player {} full, dropped sequence {}",
                    self.id, packet.sequence
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The ClientManager enforces the server's capacity limit and hands out
/// player identifiers. Identifiers are never reused within a server run so a
/// late packet from a departed player cannot land on a newcomer.
pub struct ClientManager {
    /// Connected clients indexed by their player ID
    clients: HashMap<PlayerId, Client>,
    /// Next available player ID for new connections
    next_client_id: PlayerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Player IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, CLIENT_TIMEOUT)
    }

    pub fn with_timeout(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// `register` receives the new player ID and must return the player's
    /// channel ends, normally from the coordinator. Returns None without
    /// calling it if the server is at capacity.
    pub fn add_client<F>(&mut self, addr: SocketAddr, register: F) -> Option<PlayerLink>
    where
        F: FnOnce(PlayerId) -> PlayerLink,
    {
        // Enforce server capacity limits
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let link = register(client_id);
        let client = Client::new(client_id, addr, link.inputs.clone());
        info!("Client {} connected from {}", client_id, addr);

        self.clients.insert(client_id, client);
        Some(link)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone. This handles both explicit disconnections and timeout
    /// cleanup.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected ({} inputs forwarded, {} dropped)",
                client.id, client.forwarded, client.dropped
            );
            true
        } else {
            false
        }
    }

    /// Finds a player ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Forwards an input packet to the client's channel
    ///
    /// Returns false if the ID is unknown or the packet could not be queued.
    pub fn forward_input(&mut self, client_id: PlayerId, packet: InputPacket) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => client.forward_input(packet),
            None => false,
        }
    }

    pub fn touch(&mut self, client_id: PlayerId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed player IDs so the coordinator and the session
    /// record can drop them too.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.timeout;
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all player IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
