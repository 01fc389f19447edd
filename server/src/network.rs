//! Server network layer handling UDP communications and the deadline loop

use crate::client_manager::{Client, ClientManager, Membership};
use crate::error::GameError;
use crate::fanout::Notification;
use crate::game::GameStateMachine;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, RejectKind, SessionId, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client: Client,
    },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Deliver to every client bound to the session
    BroadcastToSession {
        session_id: SessionId,
        packet: Packet,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// How often guessing deadlines are polled
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(100),
            max_clients: 256,
            client_timeout: Duration::from_secs(30),
        }
    }
}

/// Main server coordinating networking and game sessions
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: GameStateMachine,
    options: ServerOptions,
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        options: ServerOptions,
        game: GameStateMachine,
        notifications: mpsc::UnboundedReceiver<Notification>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(options.max_clients))),
            game,
            options,
            notifications: Some(notifications),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that stops `run` when given `ServerMessage::Shutdown`
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastToSession { session_id, packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.session_addrs(session_id)
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that turns published session events into broadcasts
    async fn spawn_notification_relay(&mut self) {
        let Some(mut notifications) = self.notifications.take() else {
            warn!("Notification relay already running");
            return;
        };
        let game_tx = self.game_tx.clone();
        let ctx = Arc::clone(self.game.context());

        tokio::spawn(async move {
            while let Some(Notification { session_id, event }) = notifications.recv().await {
                let packet = event.into_packet(ctx.now_ms());
                if let Err(e) = game_tx.send(GameMessage::BroadcastToSession { session_id, packet })
                {
                    error!("Failed to queue session broadcast: {}", e);
                    break;
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.options.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn reject(&self, err: &GameError, addr: SocketAddr) {
        warn!("Rejected request from {}: {}", addr, err);
        let packet = Packet::Rejected {
            kind: err.reject_kind(),
            reason: err.to_string(),
        };
        self.send_packet(packet, addr).await;
    }

    /// Sends the full session state to one client
    async fn send_snapshot(&self, session_id: SessionId, addr: SocketAddr) {
        let snapshot = match self.game.snapshot(session_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.reject(&e, addr).await;
                return;
            }
        };

        let server_time = self.game.context().now_ms();
        self.send_packet(
            Packet::SessionState {
                server_time,
                session: snapshot.session,
                challenge: snapshot.challenge,
            },
            addr,
        )
        .await;
        self.send_packet(
            Packet::Participants {
                participants: snapshot.participants,
            },
            addr,
        )
        .await;
        if let Some(results) = snapshot.results {
            self.send_packet(Packet::RoundResults { results }, addr).await;
        }
    }

    /// Registers `addr` as a fresh connection, dropping any earlier one
    async fn connect(&mut self, addr: SocketAddr) -> Option<u32> {
        let existing = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        if let Some(existing_id) = existing {
            info!("Removing existing client {} from {}", existing_id, addr);
            let removed = self.clients.write().await.remove_client(&existing_id);
            if let Some(client) = removed {
                self.release_session(client).await;
            }
        }

        let client_id = self.clients.write().await.add_client(addr);
        if client_id.is_none() {
            let response = Packet::Disconnected {
                reason: "Server full".to_string(),
            };
            self.send_packet(response, addr).await;
        }
        client_id
    }

    /// Discards a finished session once its last client is gone
    async fn release_session(&self, client: Client) {
        let Some(membership) = client.membership else {
            return;
        };
        let still_connected = {
            let clients = self.clients.read().await;
            clients.has_session_clients(membership.session_id)
        };
        if still_connected {
            return;
        }

        match self.game.discard_session(membership.session_id).await {
            Ok(true) => debug!("Session {} had no clients left", membership.session_id),
            Ok(false) | Err(GameError::InvalidTransition { .. }) => {}
            Err(e) => warn!("Failed to discard session {}: {}", membership.session_id, e),
        }
    }

    fn version_ok(client_version: u32) -> bool {
        client_version == PROTOCOL_VERSION
    }

    async fn reject_version(&self, client_version: u32, addr: SocketAddr) {
        warn!(
            "Client at {} speaks protocol {} (server {})",
            addr, client_version, PROTOCOL_VERSION
        );
        let packet = Packet::Rejected {
            kind: RejectKind::VersionMismatch,
            reason: format!(
                "protocol version {} is not supported, expected {}",
                client_version, PROTOCOL_VERSION
            ),
        };
        self.send_packet(packet, addr).await;
    }

    /// Processes incoming packets and applies them to the game
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::CreateSession {
                client_version,
                host_name,
                config,
            } => {
                if !Self::version_ok(client_version) {
                    self.reject_version(client_version, addr).await;
                    return;
                }
                let Some(client_id) = self.connect(addr).await else {
                    return;
                };

                match self.game.create_session(config, &host_name).await {
                    Ok((session, host)) => {
                        self.clients.write().await.set_membership(
                            client_id,
                            Membership {
                                session_id: session.id,
                                participant_id: host.id,
                            },
                        );
                        let response = Packet::SessionCreated {
                            session_id: session.id,
                            participant_id: host.id,
                            code: session.code.clone(),
                        };
                        self.send_packet(response, addr).await;
                        self.send_snapshot(session.id, addr).await;
                    }
                    Err(e) => self.reject(&e, addr).await,
                }
            }

            Packet::Join {
                client_version,
                code,
                name,
            } => {
                if !Self::version_ok(client_version) {
                    self.reject_version(client_version, addr).await;
                    return;
                }
                let Some(client_id) = self.connect(addr).await else {
                    return;
                };

                match self.game.join(&code, &name).await {
                    Ok((session, participant)) => {
                        self.clients.write().await.set_membership(
                            client_id,
                            Membership {
                                session_id: session.id,
                                participant_id: participant.id,
                            },
                        );
                        let response = Packet::Joined {
                            session_id: session.id,
                            participant_id: participant.id,
                            code: session.code.clone(),
                        };
                        self.send_packet(response, addr).await;
                        self.send_snapshot(session.id, addr).await;
                    }
                    Err(e) => self.reject(&e, addr).await,
                }
            }

            Packet::Heartbeat { .. } => {
                self.clients.write().await.touch(addr);
            }

            Packet::Leave => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let removed = self.clients.write().await.remove_client(&client_id);
                    if let Some(client) = removed {
                        self.release_session(client).await;
                    }
                }
            }

            Packet::StartGame
            | Packet::BeginGuessing
            | Packet::AdvanceRound
            | Packet::EndGame
            | Packet::SubmitGuess { .. }
            | Packet::ChangeColor { .. }
            | Packet::RequestState => {
                let membership = self.clients.write().await.touch(addr).flatten();
                match membership {
                    Some(membership) => self.handle_session_command(packet, membership, addr).await,
                    None => {
                        let response = Packet::Rejected {
                            kind: RejectKind::NotInSession,
                            reason: "create or join a session first".to_string(),
                        };
                        self.send_packet(response, addr).await;
                    }
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Runs a command on behalf of the participant bound to `addr`.
    /// State changes reach every client through the notification relay.
    async fn handle_session_command(
        &mut self,
        packet: Packet,
        membership: Membership,
        addr: SocketAddr,
    ) {
        let Membership {
            session_id,
            participant_id,
        } = membership;

        let result = match packet {
            Packet::StartGame => self
                .game
                .start_game(session_id, participant_id)
                .await
                .map(|_| None),
            Packet::BeginGuessing => self
                .game
                .begin_guessing(session_id, participant_id)
                .await
                .map(|_| None),
            Packet::AdvanceRound => self
                .game
                .advance_round(session_id, participant_id)
                .await
                .map(|_| None),
            Packet::EndGame => self
                .game
                .end_game(session_id, participant_id)
                .await
                .map(|_| None),
            Packet::SubmitGuess { round, coordinate } => self
                .game
                .submit_guess(session_id, participant_id, round, coordinate)
                .await
                .map(|guess| {
                    Some(Packet::GuessAccepted {
                        round: guess.round,
                        distance_km: guess.distance_km,
                    })
                }),
            Packet::ChangeColor { color } => self
                .game
                .change_color(session_id, participant_id, color)
                .await
                .map(|_| None),
            Packet::RequestState => {
                self.send_snapshot(session_id, addr).await;
                return;
            }
            _ => return,
        };

        match result {
            Ok(Some(reply)) => self.send_packet(reply, addr).await,
            Ok(None) => {}
            Err(e) => self.reject(&e, addr).await,
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_notification_relay().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.options.tick_duration);
        let mut ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client }) => {
                            self.release_session(client).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Settle rounds whose guessing window closed
                _ = tick_interval.tick() => {
                    let settled = self.game.poll_deadlines().await;
                    if !settled.is_empty() {
                        debug!("Settled {} rounds on deadline", settled.len());
                    }

                    ticks += 1;
                    if ticks % 600 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!("Tick {}: {} clients connected", ticks, client_count);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::clock::SystemClock;
    use crate::context::GameContext;
    use crate::fanout::ChannelFanout;
    use crate::store::InMemoryStore;
    use shared::{ParticipantId, SessionConfig};
    use std::net::{IpAddr, Ipv4Addr};

    async fn test_server() -> Server {
        let (fanout, notifications) = ChannelFanout::new();
        let ctx = GameContext::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCatalog::new()),
            Arc::new(fanout),
            Arc::new(SystemClock),
        )
        .with_seed(1);
        let game = GameStateMachine::new(Arc::new(ctx));

        Server::new("127.0.0.1:0", ServerOptions::default(), game, notifications)
            .await
            .unwrap()
    }

    async fn send(socket: &UdpSocket, packet: &Packet, to: SocketAddr) {
        socket.send_to(&serialize(packet).unwrap(), to).await.unwrap();
    }

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = socket.recv_from(&mut buffer).await.unwrap();
        deserialize(&buffer[..len]).unwrap()
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::RequestState;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                assert!(matches!(p, Packet::RequestState));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_game_message_broadcast() {
        let session_id = SessionId::new();
        let msg = GameMessage::BroadcastToSession {
            session_id,
            packet: Packet::GuessInserted {
                participant_id: ParticipantId::new(),
                round: 3,
            },
        };

        match msg {
            GameMessage::BroadcastToSession {
                session_id: s,
                packet,
            } => {
                assert_eq!(s, session_id);
                assert!(matches!(packet, Packet::GuessInserted { round: 3, .. }));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_default_options() {
        let options = ServerOptions::default();
        assert_eq!(options.tick_duration, Duration::from_millis(100));
        assert!(options.client_timeout > options.tick_duration);
    }

    #[test]
    fn test_client_version_compatibility() {
        assert!(Server::version_ok(PROTOCOL_VERSION));
        assert!(!Server::version_ok(PROTOCOL_VERSION + 1));
        assert!(!Server::version_ok(0));
    }

    #[tokio::test]
    async fn test_create_and_join_over_udp() {
        let mut server = test_server().await;
        let server_addr = server.local_addr().unwrap();
        let host = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let guest = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let exchange = async {
            send(
                &host,
                &Packet::CreateSession {
                    client_version: PROTOCOL_VERSION,
                    host_name: "Host".to_string(),
                    config: SessionConfig::default(),
                },
                server_addr,
            )
            .await;

            let code = match recv(&host).await {
                Packet::SessionCreated { code, .. } => code,
                other => panic!("Expected SessionCreated, got {:?}", other),
            };
            assert!(matches!(recv(&host).await, Packet::SessionState { .. }));
            assert!(matches!(recv(&host).await, Packet::Participants { .. }));

            send(
                &guest,
                &Packet::Join {
                    client_version: PROTOCOL_VERSION,
                    code: code.clone(),
                    name: "Guest".to_string(),
                },
                server_addr,
            )
            .await;
            // the lobby broadcast may overtake the direct reply
            loop {
                match recv(&guest).await {
                    Packet::Joined { code: joined, .. } => {
                        assert_eq!(joined, code);
                        break;
                    }
                    Packet::Participants { .. } => continue,
                    other => panic!("Expected Joined, got {:?}", other),
                }
            }

            // a guest is not the host
            send(&guest, &Packet::StartGame, server_addr).await;
            loop {
                if let Packet::Rejected { kind, .. } = recv(&guest).await {
                    assert_eq!(kind, RejectKind::Unauthorized);
                    break;
                }
            }
        };

        tokio::select! {
            result = server.run() => panic!("Server stopped early: {:?}", result.err().map(|e| e.to_string())),
            outcome = tokio::time::timeout(Duration::from_secs(5), exchange) => {
                assert!(outcome.is_ok(), "UDP exchange timed out");
            }
        }
    }

    #[tokio::test]
    async fn test_commands_require_membership() {
        let mut server = test_server().await;
        let server_addr = server.local_addr().unwrap();
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let exchange = async {
            send(&stranger, &Packet::AdvanceRound, server_addr).await;
            match recv(&stranger).await {
                Packet::Rejected { kind, .. } => assert_eq!(kind, RejectKind::NotInSession),
                other => panic!("Expected Rejected, got {:?}", other),
            }

            send(
                &stranger,
                &Packet::Join {
                    client_version: PROTOCOL_VERSION + 1,
                    code: "AAAAAA".to_string(),
                    name: "Old".to_string(),
                },
                server_addr,
            )
            .await;
            match recv(&stranger).await {
                Packet::Rejected { kind, .. } => assert_eq!(kind, RejectKind::VersionMismatch),
                other => panic!("Expected Rejected, got {:?}", other),
            }
        };

        tokio::select! {
            result = server.run() => panic!("Server stopped early: {:?}", result.err().map(|e| e.to_string())),
            outcome = tokio::time::timeout(Duration::from_secs(5), exchange) => {
                assert!(outcome.is_ok(), "UDP exchange timed out");
            }
        }
    }
}
