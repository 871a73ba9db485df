//! Typed messages, one tagged union per direction.
//!
//! DESIGN
//! ======
//! The wire stays `{type, data}`. Ingress decodes the envelope into
//! [`ClientMessage`] (server side) or [`ServerMessage`] (client side) and
//! rejects payloads whose shape does not match their tag. Scene mutations
//! are shared by both directions through [`SceneOp`], since the relay hands
//! them from one client to the others unchanged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::{SceneSnapshot, SnapshotPayload};
use crate::voxel::{ObjectId, Vec3, VoxelObject, normalize_color};
use crate::{CodecError, Envelope};

// =============================================================================
// PAYLOADS
// =============================================================================

/// `addObject` payload: the voxel itself.
pub type AddObject = VoxelObject;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: String,
}

/// Reply to `createRoom`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    pub room_id: String,
    #[serde(default = "single_participant")]
    pub participant_count: usize,
}

fn single_participant() -> usize {
    1
}

/// Shared by `joined` and `participantCountUpdate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantCount {
    pub room_id: String,
    pub participant_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    /// Grepable error code, e.g. `E_ROOM_NOT_FOUND`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoveObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub position: Vec3,
    pub size: Vec3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeColor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub position: Vec3,
    pub color: String,
}

// =============================================================================
// SCENE OPS
// =============================================================================

/// A scene mutation. Relayed between peers without server interpretation.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneOp {
    AddObject(AddObject),
    RemoveObject(RemoveObject),
    ChangeColor(ChangeColor),
    ClearScene,
    UploadScene(SceneSnapshot),
}

impl SceneOp {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddObject(_) => crate::ADD_OBJECT,
            Self::RemoveObject(_) => crate::REMOVE_OBJECT,
            Self::ChangeColor(_) => crate::CHANGE_COLOR,
            Self::ClearScene => crate::CLEAR_SCENE,
            Self::UploadScene(_) => crate::UPLOAD_SCENE,
        }
    }

    /// Decode a scene op. Returns `None` when `kind` is not a scene type.
    fn decode(kind: &str, data: &Value) -> Option<Result<Self, CodecError>> {
        let op = match kind {
            crate::ADD_OBJECT => payload::<VoxelObject>(kind, data).and_then(|mut obj| {
                obj.validate()?;
                Ok(Self::AddObject(obj))
            }),
            crate::REMOVE_OBJECT => payload::<RemoveObject>(kind, data).map(Self::RemoveObject),
            crate::CHANGE_COLOR => payload::<ChangeColor>(kind, data).and_then(|mut change| {
                change.color = normalize_color(&change.color)?;
                Ok(Self::ChangeColor(change))
            }),
            crate::CLEAR_SCENE => expect_empty(kind, data).map(|()| Self::ClearScene),
            crate::UPLOAD_SCENE => payload::<SnapshotPayload>(kind, data)
                .and_then(SnapshotPayload::into_snapshot)
                .map(Self::UploadScene),
            _ => return None,
        };
        Some(op)
    }

    fn encode(&self) -> Result<Value, CodecError> {
        match self {
            Self::AddObject(obj) => to_data(obj),
            Self::RemoveObject(remove) => to_data(remove),
            Self::ChangeColor(change) => to_data(change),
            Self::ClearScene => Ok(empty_data()),
            // Editors parse the snapshot from a JSON string, so send that form.
            Self::UploadScene(snapshot) => {
                let text = serde_json::to_string(snapshot).map_err(CodecError::Encode)?;
                Ok(Value::String(text))
            }
        }
    }
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Everything a client may send.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    CreateRoom,
    JoinRoom(JoinRoom),
    GetParticipantCount,
    Scene(SceneOp),
}

impl ClientMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRoom => crate::CREATE_ROOM,
            Self::JoinRoom(_) => crate::JOIN_ROOM,
            Self::GetParticipantCount => crate::GET_PARTICIPANT_COUNT,
            Self::Scene(op) => op.kind(),
        }
    }

    /// Validate an inbound envelope against the client-to-server catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownType`] for tags outside the catalog and
    /// [`CodecError::InvalidPayload`] (or a color/snapshot error) when the
    /// payload does not match its tag.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, CodecError> {
        let kind = envelope.kind.as_str();
        let data = &envelope.data;
        if let Some(op) = SceneOp::decode(kind, data) {
            return op.map(Self::Scene);
        }
        match kind {
            crate::CREATE_ROOM => expect_empty(kind, data).map(|()| Self::CreateRoom),
            crate::JOIN_ROOM => payload::<JoinRoom>(kind, data).map(Self::JoinRoom),
            crate::GET_PARTICIPANT_COUNT => expect_empty(kind, data).map(|()| Self::GetParticipantCount),
            other => Err(CodecError::UnknownType(other.to_owned())),
        }
    }

    /// Build the wire envelope for this message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the payload cannot be serialized.
    pub fn to_envelope(&self) -> Result<Envelope, CodecError> {
        let data = match self {
            Self::CreateRoom | Self::GetParticipantCount => empty_data(),
            Self::JoinRoom(join) => to_data(join)?,
            Self::Scene(op) => op.encode()?,
        };
        Ok(Envelope::new(self.kind(), data))
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Everything a client may receive.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    RoomCreated(RoomCreated),
    Joined(ParticipantCount),
    NewUserJoined,
    ParticipantCountUpdate(ParticipantCount),
    Error(ErrorPayload),
    Scene(SceneOp),
}

impl ServerMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomCreated(_) => crate::CREATE_ROOM,
            Self::Joined(_) => crate::JOINED,
            Self::NewUserJoined => crate::NEW_USER_JOINED,
            Self::ParticipantCountUpdate(_) => crate::PARTICIPANT_COUNT_UPDATE,
            Self::Error(_) => crate::ERROR,
            Self::Scene(op) => op.kind(),
        }
    }

    /// Validate an inbound envelope against the server-to-client catalog.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`ClientMessage::from_envelope`].
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, CodecError> {
        let kind = envelope.kind.as_str();
        let data = &envelope.data;
        if let Some(op) = SceneOp::decode(kind, data) {
            return op.map(Self::Scene);
        }
        match kind {
            crate::CREATE_ROOM => payload::<RoomCreated>(kind, data).map(Self::RoomCreated),
            crate::JOINED => payload::<ParticipantCount>(kind, data).map(Self::Joined),
            crate::NEW_USER_JOINED => expect_empty(kind, data).map(|()| Self::NewUserJoined),
            crate::PARTICIPANT_COUNT_UPDATE => payload::<ParticipantCount>(kind, data).map(Self::ParticipantCountUpdate),
            crate::ERROR => payload::<ErrorPayload>(kind, data).map(Self::Error),
            other => Err(CodecError::UnknownType(other.to_owned())),
        }
    }

    /// Build the wire envelope for this message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the payload cannot be serialized.
    pub fn to_envelope(&self) -> Result<Envelope, CodecError> {
        let data = match self {
            Self::RoomCreated(created) => to_data(created)?,
            Self::Joined(count) | Self::ParticipantCountUpdate(count) => to_data(count)?,
            Self::NewUserJoined => empty_data(),
            Self::Error(err) => to_data(err)?,
            Self::Scene(op) => op.encode()?,
        };
        Ok(Envelope::new(self.kind(), data))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn payload<T: DeserializeOwned>(kind: &str, data: &Value) -> Result<T, CodecError> {
    T::deserialize(data).map_err(|e| CodecError::InvalidPayload { kind: kind.to_owned(), reason: e.to_string() })
}

/// Empty payloads may arrive as `{}`, `null`, or with `data` omitted.
fn expect_empty(kind: &str, data: &Value) -> Result<(), CodecError> {
    match data {
        Value::Null | Value::Object(_) => Ok(()),
        other => Err(CodecError::InvalidPayload { kind: kind.to_owned(), reason: format!("expected object, got {other}") }),
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(CodecError::Encode)
}

fn empty_data() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
