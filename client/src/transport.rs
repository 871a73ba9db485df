//! WebSocket transport to the room server.
//!
//! DESIGN
//! ======
//! `Transport::connect` opens one socket and spawns a connection task that
//! owns it. The task selects over two sources:
//! - frames from the server → validate → typed `ServerMessage` on the
//!   inbound channel (one ordered channel, one consumer)
//! - outbound requests from `Transport::send` / `close` → socket
//!
//! Malformed or unknown frames are logged and dropped; the socket stays
//! open. When the socket ends for any reason the state moves to `Closed`
//! and the inbound channel closes. There is no reconnection.
//!
//! STATE MACHINE
//! =============
//! `Disconnected → Connecting → Open → Closed`. `Closed` is terminal. A
//! handle only exists once the socket is open; callers that display the
//! earlier states own the `watch::Sender` and pass it to `connect_observed`.

use frames::{ClientMessage, CodecError, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Frames buffered in each direction before backpressure.
pub const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

enum Outbound {
    Text(String),
    Close,
}

/// Handle to one server connection. Cheap to share by reference; dropping
/// it closes the socket.
pub struct Transport {
    outbound: mpsc::Sender<Outbound>,
    state: watch::Receiver<ConnectionState>,
}

impl Transport {
    /// Connect to `url` and start the connection task.
    ///
    /// Returns the handle and the ordered channel of inbound messages. The
    /// handle starts out `Open`; use [`Transport::connect_observed`] to see
    /// the earlier states.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ServerMessage>), TransportError> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self::connect_observed(url, state_tx).await
    }

    /// Like [`Transport::connect`], but publishes every state on `state`,
    /// including `Connecting` while the handshake runs and `Closed` when it
    /// fails. Subscribe to `state` before calling to watch the whole
    /// lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the handshake fails.
    pub async fn connect_observed(
        url: &str,
        state: watch::Sender<ConnectionState>,
    ) -> Result<(Self, mpsc::Receiver<ServerMessage>), TransportError> {
        state.send_replace(ConnectionState::Connecting);
        debug!(%url, "transport: connecting");

        let stream = match connect_async(url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                state.send_replace(ConnectionState::Closed);
                warn!(%url, error = %e, "transport: connect failed");
                return Err(TransportError::Connect(Box::new(e)));
            }
        };

        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.send_replace(ConnectionState::Open);
        info!(%url, "transport: open");

        let state_rx = state.subscribe();
        tokio::spawn(run_connection(stream, out_rx, in_tx, state));

        Ok((Self { outbound: out_tx, state: state_rx }, in_rx))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch state transitions, e.g. to await `Closed`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Queue a message for the server. Returns false, with a diagnostic,
    /// when the transport is not open or the message cannot be queued.
    pub fn send(&self, msg: &ClientMessage) -> bool {
        if !self.is_connected() {
            warn!(kind = msg.kind(), state = ?self.state(), "transport: not open; message discarded");
            return false;
        }
        let text = match encode(msg) {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = msg.kind(), error = %e, "transport: failed to encode message");
                return false;
            }
        };
        match self.outbound.try_send(Outbound::Text(text)) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = msg.kind(), error = %e, "transport: outbound queue unavailable; message discarded");
                false
            }
        }
    }

    /// Close the socket. The inbound channel ends once the close completes.
    pub async fn close(&self) {
        if self.outbound.send(Outbound::Close).await.is_err() {
            debug!("transport: already closed");
        }
    }
}

fn encode(msg: &ClientMessage) -> Result<String, CodecError> {
    frames::encode_envelope(&msg.to_envelope()?)
}

/// Decode one inbound text frame. `None` when it must be dropped.
fn decode(text: &str) -> Option<ServerMessage> {
    let envelope = match frames::decode_envelope(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "transport: malformed frame dropped");
            return None;
        }
    };
    match ServerMessage::from_envelope(&envelope) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!(kind = %envelope.kind, error = %e, "transport: invalid message dropped");
            None
        }
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

type Stream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_connection(
    stream: Stream,
    mut outbound: mpsc::Receiver<Outbound>,
    inbound: mpsc::Sender<ServerMessage>,
    state: watch::Sender<ConnectionState>,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(len = bytes.len(), "transport: non-utf8 binary frame dropped");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("transport: closed by server");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "transport: socket error");
                        break;
                    }
                };
                let Some(msg) = decode(&text) else { continue };
                debug!(kind = msg.kind(), "transport: recv");
                if inbound.send(msg).await.is_err() {
                    debug!("transport: inbound consumer gone");
                }
            }
            request = outbound.recv() => {
                match request {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::text(text)).await {
                            warn!(error = %e, "transport: send failed");
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        info!("transport: closed by client");
                        break;
                    }
                }
            }
        }
    }

    state.send_replace(ConnectionState::Closed);
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
