//! Room service: the session registry.
//!
//! DESIGN
//! ======
//! The registry owns every room and every live connection. All membership
//! changes go through `create_room`, `join_room`, and `leave`, which keep
//! three invariants:
//! - a connection's `room_id` is set iff it is in exactly that room's set
//! - a room's participant count is the size of its member set
//! - a room with no members is removed immediately
//!
//! Notifications produced by a membership change (replies, owner alert,
//! count updates) are queued on the members' channels before the call
//! returns. Delivery is best-effort: a full or closed channel is logged and
//! skipped without affecting the rest of the fan-out.

use std::collections::HashMap;
use std::fmt::Write;

use frames::{Envelope, ParticipantCount, RoomCreated, ServerMessage};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::frame::{ErrorCode, encode};
use crate::state::{Connection, ConnectionId, Room, RoomId};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room not found: {0}")]
    NotFound(RoomId),
    #[error("not in a room; create or join one first")]
    NotInRoom,
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

impl ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_ROOM_NOT_FOUND",
            Self::NotInRoom => "E_NOT_IN_ROOM",
            Self::UnknownConnection(_) => "E_UNKNOWN_CONNECTION",
        }
    }
}

/// Prefix of every generated room id.
pub const ROOM_ID_PREFIX: &str = "room_";

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a room id with 128 bits of randomness.
#[must_use]
pub fn generate_room_id() -> RoomId {
    let bytes: [u8; 16] = rand::rng().random();
    format!("{ROOM_ID_PREFIX}{}", bytes_to_hex(&bytes))
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    connections: HashMap<ConnectionId, Connection>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // CONNECTIONS
    // -------------------------------------------------------------------------

    /// Register a newly opened socket.
    pub fn connect(&mut self, conn_id: ConnectionId, tx: mpsc::Sender<Envelope>) {
        self.connections.insert(conn_id, Connection::new(tx));
        debug!(%conn_id, connections = self.connections.len(), "registry: connection opened");
    }

    /// Forget a closed socket, leaving its room first.
    pub fn disconnect(&mut self, conn_id: ConnectionId) {
        self.leave(conn_id);
        self.connections.remove(&conn_id);
        debug!(%conn_id, connections = self.connections.len(), "registry: connection closed");
    }

    #[must_use]
    pub fn is_connected(&self, conn_id: ConnectionId) -> bool {
        self.connections.contains_key(&conn_id)
    }

    /// The room a connection is currently in.
    #[must_use]
    pub fn room_of(&self, conn_id: ConnectionId) -> Option<&RoomId> {
        self.connections.get(&conn_id)?.room_id.as_ref()
    }

    // -------------------------------------------------------------------------
    // ROOMS
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Create a room owned by `conn_id` and reply `createRoom {roomId}`.
    /// A connection already in a room leaves it first.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::UnknownConnection`] if the socket is not registered.
    pub fn create_room(&mut self, conn_id: ConnectionId) -> Result<RoomId, RoomError> {
        if !self.is_connected(conn_id) {
            return Err(RoomError::UnknownConnection(conn_id));
        }
        self.leave(conn_id);

        let mut room_id = generate_room_id();
        while self.rooms.contains_key(&room_id) {
            room_id = generate_room_id();
        }

        self.rooms.insert(room_id.clone(), Room::new(room_id.clone(), conn_id));
        self.set_room(conn_id, Some(room_id.clone()));
        info!(%conn_id, %room_id, rooms = self.rooms.len(), "room created");

        let reply = ServerMessage::RoomCreated(RoomCreated { room_id: room_id.clone(), participant_count: 1 });
        self.notify(conn_id, &reply);
        Ok(room_id)
    }

    /// Add `conn_id` to an existing room.
    ///
    /// On success the joiner gets `joined`, the owner gets `newUserJoined`
    /// if it is still a member, and every member gets `participantCountUpdate`. Joining the room the
    /// connection is already in only repeats the `joined` reply.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotFound`] if the room does not exist; nothing
    /// changes and nothing is sent to anyone.
    pub fn join_room(&mut self, conn_id: ConnectionId, room_id: &str) -> Result<usize, RoomError> {
        if !self.is_connected(conn_id) {
            return Err(RoomError::UnknownConnection(conn_id));
        }
        if !self.rooms.contains_key(room_id) {
            return Err(RoomError::NotFound(room_id.to_owned()));
        }

        if self.room_of(conn_id).is_some_and(|current| current == room_id) {
            let count = self.rooms.get(room_id).map_or(0, Room::participant_count);
            self.notify(conn_id, &joined(room_id, count));
            return Ok(count);
        }

        self.leave(conn_id);

        // The room cannot have emptied: `conn_id` was not one of its members.
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Err(RoomError::NotFound(room_id.to_owned()));
        };
        room.clients.insert(conn_id);
        let count = room.participant_count();
        let owner = room.owner;
        self.set_room(conn_id, Some(room_id.to_owned()));
        info!(%conn_id, %room_id, participants = count, "client joined room");

        self.notify(conn_id, &joined(room_id, count));
        if owner != conn_id {
            // An owner that moved to another room would upload into the wrong room.
            let owner_present = self.room_of(owner).is_some_and(|current| current == room_id);
            if !owner_present || !self.notify(owner, &ServerMessage::NewUserJoined) {
                warn!(%room_id, %owner, "room owner unavailable; joiner will not receive a snapshot");
            }
        }
        self.broadcast_participant_count(room_id);
        Ok(count)
    }

    /// Remove `conn_id` from its room. Deletes the room when it empties,
    /// otherwise broadcasts the new count to the remaining members.
    /// Returns the room that was left.
    pub fn leave(&mut self, conn_id: ConnectionId) -> Option<RoomId> {
        let room_id = self.connections.get_mut(&conn_id)?.room_id.take()?;
        let room = self.rooms.get_mut(&room_id)?;

        room.clients.remove(&conn_id);
        let remaining = room.participant_count();
        info!(%conn_id, %room_id, remaining, "client left room");

        if remaining == 0 {
            self.rooms.remove(&room_id);
            info!(%room_id, rooms = self.rooms.len(), "room deleted");
        } else {
            self.broadcast_participant_count(&room_id);
        }
        Some(room_id)
    }

    /// Current count for the caller's room.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotInRoom`] if the connection has no room.
    pub fn participant_count_of(&self, conn_id: ConnectionId) -> Result<ParticipantCount, RoomError> {
        let room_id = self.room_of(conn_id).ok_or(RoomError::NotInRoom)?;
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        Ok(ParticipantCount { room_id: room.id.clone(), participant_count: room.participant_count() })
    }

    /// Send the current count to every member. Returns deliveries made.
    pub fn broadcast_participant_count(&self, room_id: &str) -> usize {
        let Some(room) = self.rooms.get(room_id) else {
            return 0;
        };
        let update = ServerMessage::ParticipantCountUpdate(ParticipantCount {
            room_id: room.id.clone(),
            participant_count: room.participant_count(),
        });
        let Some(envelope) = encode(&update) else {
            return 0;
        };
        room.clients
            .iter()
            .filter(|member| self.send(**member, envelope.clone()))
            .count()
    }

    // -------------------------------------------------------------------------
    // DELIVERY
    // -------------------------------------------------------------------------

    /// Queue an envelope for one connection. Returns false if the connection
    /// is gone or its queue is full or closed.
    pub fn send(&self, conn_id: ConnectionId, envelope: Envelope) -> bool {
        let Some(conn) = self.connections.get(&conn_id) else {
            return false;
        };
        match conn.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!(%conn_id, error = %e, "dropping frame for connection");
                false
            }
        }
    }

    /// Encode and queue a server message for one connection.
    pub fn notify(&self, conn_id: ConnectionId, msg: &ServerMessage) -> bool {
        encode(msg).is_some_and(|envelope| self.send(conn_id, envelope))
    }

    fn set_room(&mut self, conn_id: ConnectionId, room_id: Option<RoomId>) {
        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.room_id = room_id;
        }
    }
}

fn joined(room_id: &str, count: usize) -> ServerMessage {
    ServerMessage::Joined(ParticipantCount { room_id: room_id.to_owned(), participant_count: count })
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
