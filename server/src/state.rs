//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the configuration and the room registry. The registry sits behind a
//! single mutex: every inbound frame takes the lock once, runs its registry
//! operation and fan-out to completion, and releases it, so registry state is
//! never observed mid-mutation.

use std::collections::HashSet;
use std::sync::Arc;

use frames::Envelope;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::services::room::RoomRegistry;

/// Identifies one socket for its lifetime.
pub type ConnectionId = Uuid;

/// Opaque server-generated room identifier.
pub type RoomId = String;

// =============================================================================
// CONNECTION
// =============================================================================

/// Per-socket entry in the registry.
pub struct Connection {
    /// Sender for outbound frames; drained by the socket task.
    pub tx: mpsc::Sender<Envelope>,
    /// The room this connection is in, if any.
    pub room_id: Option<RoomId>,
}

impl Connection {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Envelope>) -> Self {
        Self { tx, room_id: None }
    }
}

// =============================================================================
// ROOM
// =============================================================================

pub struct Room {
    pub id: RoomId,
    /// Creator of the room. Receives new-joiner notifications; may have left.
    pub owner: ConnectionId,
    pub clients: HashSet<ConnectionId>,
}

impl Room {
    #[must_use]
    pub fn new(id: RoomId, owner: ConnectionId) -> Self {
        Self { id, owner, clients: HashSet::from([owner]) }
    }

    /// Always equal to the size of the member set.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.clients.len()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum; inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub rooms: Arc<Mutex<RoomRegistry>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self { config: Arc::new(config), rooms: Arc::new(Mutex::new(RoomRegistry::new())) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    /// Register a fresh connection and return its id and outbound receiver.
    pub async fn connect_client(state: &AppState) -> (ConnectionId, mpsc::Receiver<Envelope>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(64);
        state.rooms.lock().await.connect(conn_id, tx);
        (conn_id, rx)
    }

    pub async fn recv_envelope(rx: &mut mpsc::Receiver<Envelope>) -> Envelope {
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("envelope receive timed out")
            .expect("channel closed unexpectedly")
    }

    pub async fn assert_no_envelope(rx: &mut mpsc::Receiver<Envelope>) {
        assert!(
            timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
            "expected no envelope"
        );
    }

    /// Serve the full router on an ephemeral local port.
    pub async fn spawn_app(state: AppState) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, crate::routes::app(state))
                .await
                .expect("test server");
        });
        addr
    }

    /// Drain everything currently queued without waiting.
    pub fn drain(rx: &mut mpsc::Receiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope);
        }
        out
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
