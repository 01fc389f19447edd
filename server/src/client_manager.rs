//! Connection tracking for the UDP server
//!
//! This module maps network addresses to connected clients and records which
//! session, and which participant within it, each connection speaks for:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Session membership used to authorize host commands and route events
//! - Connection health monitoring and automatic cleanup
//! - Client capacity management
//!
//! A connection's identity comes from the address it sends from, never from
//! ids carried inside packets.

use log::info;
use shared::{ParticipantId, SessionId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// The session seat a connection has claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
}

/// A connected client
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Set once the client created or joined a session
    pub membership: Option<Membership>,
}

impl Client {
    /// Creates a new client with the given ID and network address
    ///
    /// The client starts outside any session and is marked as recently active.
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            membership: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients and their session membership
///
/// The ClientManager enforces server capacity limits and answers the two
/// questions the network layer keeps asking: who sent this packet, and who
/// should receive this session's events.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        // Enforce server capacity limits
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr);
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns the removed client so the caller can clean up whatever session
    /// it belonged to, or None if it was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes the activity timestamp of the client at `addr`
    ///
    /// Returns the client's membership, if any. Packets from unknown
    /// addresses return None.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<Option<Membership>> {
        let client = self.clients.values_mut().find(|c| c.addr == addr)?;
        client.touch();
        Some(client.membership)
    }

    /// Binds a client to a session seat. Returns false for an unknown client.
    pub fn set_membership(&mut self, client_id: u32, membership: Membership) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.membership = Some(membership);
                true
            }
            None => false,
        }
    }

    pub fn membership_by_addr(&self, addr: SocketAddr) -> Option<Membership> {
        self.clients
            .values()
            .find(|c| c.addr == addr)
            .and_then(|c| c.membership)
    }

    /// Addresses of every client bound to `session_id`
    pub fn session_addrs(&self, session_id: SessionId) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .filter(|(_, c)| c.membership.map(|m| m.session_id) == Some(session_id))
            .map(|(id, c)| (*id, c.addr))
            .collect()
    }

    pub fn has_session_clients(&self, session_id: SessionId) -> bool {
        self.clients
            .values()
            .any(|c| c.membership.map(|m| m.session_id) == Some(session_id))
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed clients so their sessions can be cleaned up.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
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
