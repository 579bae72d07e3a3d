//! Server network layer handling UDP communications and the coordinator loop

use crate::client_manager::ClientManager;
use crate::coordinator::{Coordinator, SnapshotReceiver};
use crate::session::SessionHandle;
use log::{debug, error, info, warn};
use shared::{unix_millis, FrameOutcome, Packet, PlayerId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Receive buffer size. A full snapshot with hints stays well below it.
const RECV_BUFFER: usize = 8192;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
    Shutdown,
}

/// Main server: socket tasks around one coordinator
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    coordinator: Coordinator,
    session: SessionHandle,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        coordinator: Coordinator,
        session: SessionHandle,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            coordinator,
            session,
            tick_duration,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping a running server from another task.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if server_tx
                        .send(ServerMessage::ClientTimeout { client_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    /// Spawns the task that pushes one player's snapshots to its address.
    ///
    /// Snapshots published while a send is in progress collapse into the
    /// latest one. The task ends when the coordinator drops the player.
    fn spawn_snapshot_sender(&self, player: PlayerId, addr: SocketAddr, mut snapshots: SnapshotReceiver) {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let latest = snapshots.borrow_and_update().clone();
                let Some(snapshot) = latest else { continue };

                let packet = Packet::Snapshot(snapshot.as_ref().clone());
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    warn!("Failed to send snapshot to player {}: {}", player, e);
                }
            }
            debug!("Snapshot sender for player {} stopped", player);
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = Self::send_packet_impl(&self.socket, packet, addr).await {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!("Client connecting from {} (version: {})", addr, client_version);

                if client_version != PROTOCOL_VERSION {
                    let response = Packet::Disconnected {
                        reason: format!(
                            "Protocol version {} not supported, server runs {}",
                            client_version, PROTOCOL_VERSION
                        ),
                    };
                    self.send_packet(&response, addr).await;
                    return;
                }

                // Reconnect from the same address replaces the old player
                let existing = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(existing_id) = existing {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_player(existing_id).await;
                }

                let coordinator = &mut self.coordinator;
                let link = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr, |id| coordinator.register_player(id))
                };

                let Some(link) = link else {
                    let response = Packet::Disconnected {
                        reason: "Server full".to_string(),
                    };
                    self.send_packet(&response, addr).await;
                    return;
                };

                let now = unix_millis();
                self.session.join(link.player).await;
                let owner = self.session.elect(now).await;
                self.coordinator.set_session_owner(owner);

                let response = Packet::Connected {
                    player_id: link.player,
                    team: link.team,
                    coordinator: owner,
                };
                self.send_packet(&response, addr).await;
                self.spawn_snapshot_sender(link.player, addr, link.snapshots);
            }

            Packet::Input(input) => {
                let forwarded = {
                    let mut clients = self.clients.write().await;
                    clients
                        .find_client_by_addr(addr)
                        .map(|id| (id, clients.forward_input(id, input)))
                };

                match forwarded {
                    Some((id, _)) => {
                        if self.coordinator.session_owner() == Some(id) {
                            self.session.heartbeat(id, unix_millis()).await;
                        }
                    }
                    None => debug!("Input from unknown address {}", addr),
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    self.drop_player(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Removes a player everywhere and moves the coordinator role if needed.
    async fn drop_player(&mut self, client_id: PlayerId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.coordinator.remove_player(client_id);

        if self.session.leave(client_id).await {
            let owner = self.session.elect(unix_millis()).await;
            info!("Coordinator role moved to {:?}", owner);
            self.coordinator.set_session_owner(owner);
        }
    }

    /// Replaces a silent coordinator with the next participant.
    async fn check_session(&mut self, now: u64) {
        if self.coordinator.session_owner().is_none() && self.coordinator.player_count() == 0 {
            return;
        }
        if !self.session.is_coordinator_alive(now).await {
            let owner = self.session.elect(now).await;
            if owner != self.coordinator.session_owner() {
                info!("Coordinator role moved to {:?}", owner);
                self.coordinator.set_session_owner(owner);
            }
        }
    }

    fn tick(&mut self, now: u64) {
        match self.coordinator.update(now) {
            Ok(FrameOutcome::GameOver) => {
                let score = self.coordinator.state().fields.score;
                info!("Game over, final score {}-{}. Starting a new match", score[0], score[1]);
                self.coordinator.start_match();
            }
            Ok(FrameOutcome::Halftime) => info!("Halftime"),
            Ok(FrameOutcome::Violation) => debug!("Violation called"),
            Ok(FrameOutcome::Continue) => {}
            Err(e) => error!("Coordinator update failed: {}", e),
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_timeout_checker();

        if !self.coordinator.state().is_started() {
            self.coordinator.start_match();
        }

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut session_interval = interval(Duration::from_secs(1));

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.drop_player(client_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick(unix_millis());

                    let frame = self.coordinator.frame();
                    if frame % 600 == 0 && self.coordinator.player_count() > 0 {
                        debug!("Frame {}: {} players", frame, self.coordinator.player_count());
                    }
                },

                _ = session_interval.tick() => {
                    self.check_session(unix_millis()).await;
                },
            }
        }

        Ok(())
    }
}
