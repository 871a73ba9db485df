//! WebSocket handler: room control plus scene relay.
//!
//! DESIGN
//! ======
//! On upgrade, registers the socket with the room registry and enters a
//! `select!` loop:
//! - Incoming client frames → validate → dispatch by message type
//! - Frames queued for this connection by peers → forward to client
//!
//! Room-control messages (`createRoom`, `joinRoom`, `getParticipantCount`)
//! run against the registry, which queues every reply and notification.
//! Scene ops are handed to the relay unchanged. Nothing is written to the
//! socket directly from dispatch; all outbound traffic flows through the
//! per-connection channel, so one connection's frames stay in order.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register connection (no room)
//! 2. Client frames → dispatch → registry / relay
//! 3. Close or error → leave room → unregister

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::{ClientMessage, CodecError, Envelope, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::error_message;
use crate::services::relay::relay;
use crate::state::{AppState, ConnectionId};

// =============================================================================
// DISPOSITION
// =============================================================================

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// A room-control message ran; replies are queued.
    Handled,
    /// A scene op went to this many peers.
    Relayed(usize),
    /// The sender was sent an `error` frame.
    Rejected,
    /// Malformed, unknown, or quarantined; nothing was sent.
    Dropped,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();

    // Per-connection channel for replies and relayed peer frames.
    let (tx, mut rx) = mpsc::channel::<Envelope>(state.config.client_queue_capacity);
    state.rooms.lock().await.connect(conn_id, tx);

    info!(%conn_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        process_inbound_text(&state, conn_id, text.as_str()).await;
                    }
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            process_inbound_text(&state, conn_id, text).await;
                        }
                        Err(_) => warn!(%conn_id, len = bytes.len(), "ws: dropping non-utf8 binary frame"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(envelope) = rx.recv() => {
                if send_envelope(&mut socket, conn_id, &envelope).await.is_err() {
                    break;
                }
            }
        }
    }

    state.rooms.lock().await.disconnect(conn_id);
    info!(%conn_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Validate and process one inbound text frame.
///
/// Kept apart from the socket loop so tests can drive dispatch directly.
pub(crate) async fn process_inbound_text(state: &AppState, conn_id: ConnectionId, text: &str) -> Disposition {
    let envelope = match frames::decode_envelope(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(%conn_id, error = %e, "ws: malformed inbound frame");
            return Disposition::Dropped;
        }
    };

    let msg = match ClientMessage::from_envelope(&envelope) {
        Ok(msg) => msg,
        Err(CodecError::UnknownType(kind)) => {
            warn!(%conn_id, %kind, "ws: ignoring unknown message type");
            return Disposition::Dropped;
        }
        Err(e) => {
            warn!(%conn_id, kind = %envelope.kind, error = %e, "ws: quarantined invalid payload");
            return Disposition::Dropped;
        }
    };

    debug!(%conn_id, kind = msg.kind(), "ws: recv");

    let mut rooms = state.rooms.lock().await;
    let result = match msg {
        ClientMessage::CreateRoom => rooms.create_room(conn_id).map(|_| Disposition::Handled),
        ClientMessage::JoinRoom(join) => rooms.join_room(conn_id, &join.room_id).map(|_| Disposition::Handled),
        ClientMessage::GetParticipantCount => rooms.participant_count_of(conn_id).map(|count| {
            rooms.notify(conn_id, &ServerMessage::ParticipantCountUpdate(count));
            Disposition::Handled
        }),
        ClientMessage::Scene(_) => relay(&rooms, conn_id, &envelope).map(Disposition::Relayed),
    };

    match result {
        Ok(disposition) => disposition,
        Err(e) => {
            info!(%conn_id, kind = %envelope.kind, error = %e, "ws: request rejected");
            rooms.notify(conn_id, &error_message(&e));
            Disposition::Rejected
        }
    }
}

async fn send_envelope(socket: &mut WebSocket, conn_id: ConnectionId, envelope: &Envelope) -> Result<(), ()> {
    let json = match frames::encode_envelope(envelope) {
        Ok(json) => json,
        Err(e) => {
            // Unencodable frames are skipped rather than closing the socket.
            warn!(%conn_id, kind = %envelope.kind, error = %e, "ws: failed to serialize frame");
            return Ok(());
        }
    };
    debug!(%conn_id, kind = %envelope.kind, "ws: send");
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
