//! Shared envelope model and JSON codec for the voxel room protocol.
//!
//! This crate owns the wire representation used by both `server` and
//! `client`. Every frame on the socket is an [`Envelope`] of the shape
//! `{"type": <string>, "data": <any>}`. The envelope keeps `data` flexible
//! (`serde_json::Value`) so the relay can forward payloads verbatim; the
//! typed unions in [`message`] validate payload shape at ingress.

pub mod message;
pub mod snapshot;
pub mod voxel;

pub use message::{
    AddObject, ChangeColor, ClientMessage, ErrorPayload, JoinRoom, ParticipantCount, RemoveObject, RoomCreated,
    SceneOp, ServerMessage,
};
pub use snapshot::{SceneSnapshot, SnapshotPayload};
pub use voxel::{ObjectId, SIZE_TOLERANCE, Vec3, VoxelObject, normalize_color};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// MESSAGE TYPES
// =============================================================================

pub const CREATE_ROOM: &str = "createRoom";
pub const JOIN_ROOM: &str = "joinRoom";
pub const GET_PARTICIPANT_COUNT: &str = "getParticipantCount";
pub const JOINED: &str = "joined";
pub const NEW_USER_JOINED: &str = "newUserJoined";
pub const UPLOAD_SCENE: &str = "uploadScene";
pub const ADD_OBJECT: &str = "addObject";
pub const REMOVE_OBJECT: &str = "removeObject";
pub const CHANGE_COLOR: &str = "changeColor";
pub const CLEAR_SCENE: &str = "clearScene";
pub const PARTICIPANT_COUNT_UPDATE: &str = "participantCountUpdate";
pub const ERROR: &str = "error";

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned when decoding an envelope or its typed payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text is not JSON, or not an object with a string `type`.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    /// The `type` tag is not part of the protocol for this direction.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// The `data` payload does not match the shape required by its tag.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
    /// A color is not a `#rgb` / `#rrggbb` hex string.
    #[error("invalid color: {0:?}")]
    InvalidColor(String),
    /// A snapshot string is not a JSON array of voxel objects.
    #[error("invalid snapshot: {0}")]
    Snapshot(#[source] serde_json::Error),
    /// Encoding to JSON failed.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A single message on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type tag, e.g. `"addObject"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary JSON payload. Missing `data` decodes as `null`.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope from a tag and a payload.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { kind: kind.into(), data }
    }

    /// Build an envelope carrying an empty object payload.
    pub fn empty(kind: impl Into<String>) -> Self {
        Self::new(kind, Value::Object(serde_json::Map::new()))
    }
}

/// Encode an envelope as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the payload cannot be serialized.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(CodecError::Encode)
}

/// Decode JSON text into an envelope. Only the outer shape is checked.
///
/// # Errors
///
/// Returns [`CodecError::Envelope`] for non-JSON input or a missing/non-string
/// `type` field.
pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Envelope)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
