//! Transport abstraction and connection tracking
//!
//! This module defines the event bus the engine speaks through. The bus
//! abstracts the real transport (WebSocket framing, fallbacks, resumption
//! live elsewhere); the engine only needs room-channel broadcasts and
//! targeted emits. Replies to a requesting socket are the typed return
//! values of engine operations, rendered into acks at the dispatch edge.
//!
//! Alongside the bus lives the per-connection registry: each socket carries
//! opaque data (room code, role, player id, device id) that the engine tags
//! as connections create or join rooms.

use std::{fmt::Display, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::{code::RoomCode, protocol::ServerEvent};

/// Identity of one client connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(String);

impl SocketId {
    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SocketId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SocketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The role a connection plays in its room
///
/// The TV hosts the room on a shared screen and owns privileged
/// operations; players join from their own devices. The engine uses the
/// role to keep answer information away from player screens while a
/// question is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The hosting TV connection
    Tv,
    /// A participating mobile device
    Player,
}

/// Opaque per-connection data carried alongside the transport
#[derive(Debug, Clone, Default)]
pub struct ConnectionData {
    /// Room the connection is subscribed to
    pub room_code: Option<RoomCode>,
    /// Role assigned on the first successful create or join
    pub role: Option<Role>,
    /// Player identity inside the room, for player-role connections
    pub player_id: Option<SocketId>,
    /// Stable device identifier supplied in the connection handshake
    pub device_id: Option<String>,
    /// Display name of the hosting screen, for TV connections
    pub host_name: Option<String>,
}

/// Process-local registry of connection data
///
/// Rebuilt implicitly as events come in after a restart; never
/// authoritative for game state.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<SocketId, ConnectionData>,
}

impl ConnectionRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the connection's data, if known
    pub fn get(&self, socket: &SocketId) -> Option<ConnectionData> {
        self.connections.get(socket).map(|c| c.value().clone())
    }

    /// Applies `f` to the connection's data, inserting a default record
    /// first if the socket is unknown
    pub fn update<F: FnOnce(&mut ConnectionData)>(&self, socket: &SocketId, f: F) {
        let mut entry = self.connections.entry(socket.clone()).or_default();
        f(entry.value_mut());
    }

    /// Role of the connection, if it has been assigned one
    pub fn role(&self, socket: &SocketId) -> Option<Role> {
        self.connections.get(socket).and_then(|c| c.role)
    }

    /// Room the connection is subscribed to, if any
    pub fn room(&self, socket: &SocketId) -> Option<RoomCode> {
        self.connections
            .get(socket)
            .and_then(|c| c.room_code.clone())
    }

    /// Drops the connection's record entirely
    pub fn remove(&self, socket: &SocketId) -> Option<ConnectionData> {
        self.connections.remove(socket).map(|(_, data)| data)
    }
}

/// Outbound side of the transport
///
/// Room broadcasts are best-effort and unordered across recipients but
/// ordered per recipient; targeted emits address one socket. Implementors
/// wrap the actual socket server.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Adds a socket to a room channel
    async fn subscribe(&self, socket: &SocketId, code: &RoomCode);

    /// Removes a socket from a room channel
    async fn unsubscribe(&self, socket: &SocketId, code: &RoomCode);

    /// Delivers an event to every socket in the room channel
    async fn broadcast(&self, code: &RoomCode, event: ServerEvent);

    /// Delivers an event to a single socket
    async fn emit_to(&self, socket: &SocketId, event: ServerEvent);
}

/// Shared handle to an event bus implementation
pub type SharedBus = Arc<dyn EventBus>;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{EventBus, SocketId};
    use crate::{code::RoomCode, protocol::ServerEvent};

    /// Test bus that records everything it is asked to deliver.
    #[derive(Default)]
    pub struct RecordingBus {
        broadcasts: Mutex<Vec<(RoomCode, ServerEvent)>>,
        emits: Mutex<Vec<(SocketId, ServerEvent)>>,
        memberships: Mutex<Vec<(SocketId, RoomCode, bool)>>,
    }

    impl RecordingBus {
        pub fn new() -> Self {
            Self::default()
        }

        /// Events broadcast to the given room, in delivery order.
        pub fn room_events(&self, code: &RoomCode) -> Vec<ServerEvent> {
            self.broadcasts
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == code)
                .map(|(_, e)| e.clone())
                .collect()
        }

        /// Wire names of events broadcast to the given room, in order.
        pub fn room_event_names(&self, code: &RoomCode) -> Vec<&'static str> {
            self.room_events(code)
                .iter()
                .map(ServerEvent::name)
                .collect()
        }

        /// Events emitted directly to the given socket, in order.
        pub fn emitted_to(&self, socket: &SocketId) -> Vec<ServerEvent> {
            self.emits
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| s == socket)
                .map(|(_, e)| e.clone())
                .collect()
        }

        /// Whether the socket was subscribed to the room channel.
        pub fn is_subscribed(&self, socket: &SocketId, code: &RoomCode) -> bool {
            self.memberships
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(s, c, _)| s == socket && c == code)
                .is_some_and(|(_, _, joined)| *joined)
        }

        /// Forgets all recorded traffic.
        pub fn clear(&self) {
            self.broadcasts.lock().unwrap().clear();
            self.emits.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn subscribe(&self, socket: &SocketId, code: &RoomCode) {
            self.memberships
                .lock()
                .unwrap()
                .push((socket.clone(), code.clone(), true));
        }

        async fn unsubscribe(&self, socket: &SocketId, code: &RoomCode) {
            self.memberships
                .lock()
                .unwrap()
                .push((socket.clone(), code.clone(), false));
        }

        async fn broadcast(&self, code: &RoomCode, event: ServerEvent) {
            self.broadcasts.lock().unwrap().push((code.clone(), event));
        }

        async fn emit_to(&self, socket: &SocketId, event: ServerEvent) {
            self.emits.lock().unwrap().push((socket.clone(), event));
        }
    }
}
