//! Registry of connected clients for the race server
//!
//! This module tracks every registered TCP connection, including:
//! - Client id assignment (ids double as yacht source ids for players)
//! - Player capacity enforcement (spectators are never refused)
//! - Host selection for admin chatter commands
//!
//! The registry is shared between connection tasks behind an `RwLock`; the
//! simulation loop never needs it.

use log::info;
use shared::protocol::ClientType;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// A registered connection
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Remote address of the TCP connection
    pub addr: SocketAddr,
    /// Whether the client sails a yacht or only watches
    pub client_type: ClientType,
    /// When the registration handshake completed
    pub connected_at: Instant,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, client_type: ClientType) -> Self {
        Self {
            id,
            addr,
            client_type,
            connected_at: Instant::now(),
        }
    }

    pub fn is_player(&self) -> bool {
        self.client_type == ClientType::Player
    }
}

/// Manages all registered clients
///
/// Client ids start from 1 and are never reused, so the lowest remaining
/// player id always belongs to the player who has been connected longest.
/// That player is the host.
pub struct ClientManager {
    /// Registered clients indexed by their unique id
    clients: HashMap<u32, Client>,
    /// Next available client id for new registrations
    next_client_id: u32,
    /// Maximum number of concurrent players allowed
    max_players: usize,
}

impl ClientManager {
    /// Creates an empty registry that admits at most `max_players` players
    pub fn new(max_players: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_players,
        }
    }

    /// Attempts to register a new client
    ///
    /// Returns Some(client_id) if successful, None if a player asked to join
    /// a full race. Spectators are always admitted.
    pub fn add_client(&mut self, addr: SocketAddr, client_type: ClientType) -> Option<u32> {
        if client_type == ClientType::Player && self.player_count() >= self.max_players {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        self.clients
            .insert(client_id, Client::new(client_id, addr, client_type));
        info!(
            "Client {} registered from {} as {:?} ({} players, {} spectators)",
            client_id,
            addr,
            client_type,
            self.player_count(),
            self.spectator_count()
        );

        Some(client_id)
    }

    /// Removes a client from the registry
    ///
    /// Returns the removed client, or None if they were already gone. The
    /// session length is logged from the registration time.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!(
            "Client {} ({:?}) disconnected after {:.1?}",
            client.id,
            client.client_type,
            client.connected_at.elapsed()
        );
        Some(client)
    }

    /// The player allowed to issue admin commands, if any
    pub fn host(&self) -> Option<u32> {
        self.clients
            .values()
            .filter(|client| client.is_player())
            .map(|client| client.id)
            .min()
    }

    pub fn is_host(&self, client_id: u32) -> bool {
        self.host() == Some(client_id)
    }

    pub fn player_count(&self) -> usize {
        self.clients.values().filter(|c| c.is_player()).count()
    }

    pub fn spectator_count(&self) -> usize {
        self.clients.len() - self.player_count()
    }

    /// Returns the number of currently registered clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
