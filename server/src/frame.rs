//! Outbound frame helpers for the server.
//!
//! DESIGN
//! ======
//! Wire types live in the `frames` crate. This module adds the server-side
//! pieces: the `ErrorCode` trait that turns typed errors into structured
//! `error` frames, and the encoding step for server-originated messages.

use frames::{Envelope, ErrorPayload, ServerMessage};
use tracing::warn;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

/// Build an `error` message from a typed error.
#[must_use]
pub fn error_message(err: &(impl ErrorCode + ?Sized)) -> ServerMessage {
    ServerMessage::Error(ErrorPayload { message: err.to_string(), code: Some(err.error_code().to_owned()) })
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encode a server-originated message. Encoding failures are logged and
/// yield `None`; the caller skips delivery.
#[must_use]
pub fn encode(msg: &ServerMessage) -> Option<Envelope> {
    match msg.to_envelope() {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(kind = msg.kind(), error = %e, "failed to encode server message");
            None
        }
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
