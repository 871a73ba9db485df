//! Broadcast relay for scene operations.
//!
//! DESIGN
//! ======
//! The relay does not interpret scene content. An op that passed ingress
//! validation is forwarded verbatim to every other member of the sender's
//! room. The sender never receives its own op back; that is the
//! echo-suppression contract editors rely on to avoid applying an edit twice.

use frames::Envelope;
use tracing::debug;

use super::room::{RoomError, RoomRegistry};
use crate::state::ConnectionId;

/// Forward `envelope` to every member of `from`'s room except `from`.
/// Returns the number of members the frame was queued for.
///
/// # Errors
///
/// Returns [`RoomError::NotInRoom`] if the sender has no room.
pub fn relay(registry: &RoomRegistry, from: ConnectionId, envelope: &Envelope) -> Result<usize, RoomError> {
    let room_id = registry.room_of(from).ok_or(RoomError::NotInRoom)?;
    let room = registry
        .room(room_id)
        .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

    let delivered = room
        .clients
        .iter()
        .filter(|member| **member != from)
        .filter(|member| registry.send(**member, envelope.clone()))
        .count();

    debug!(%from, %room_id, kind = %envelope.kind, delivered, "relayed scene op");
    Ok(delivered)
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
