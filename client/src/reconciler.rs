//! Scene reconciler: the one owner of an editor's scene.
//!
//! DESIGN
//! ======
//! Remote events arrive as typed `ServerMessage`s from the transport; local
//! edits arrive as method calls (or `LocalEdit`s through `run_session`).
//! Both are applied to the same `Scene` one at a time through `&mut self`,
//! so no event ever observes another half-applied.
//!
//! Local edits are applied first and then sent; the relay never echoes them
//! back. When the server reports `newUserJoined` (only the room owner gets
//! it), the reconciler uploads its whole scene so the joiner can replace its
//! own state with it.
//!
//! Room status (id and participant count) is tracked for display only.

use frames::{ChangeColor, ClientMessage, CodecError, ErrorPayload, JoinRoom, RemoveObject, SceneOp, SceneSnapshot};
use frames::{ServerMessage, Vec3, VoxelObject};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::scene::{Scene, SceneChange};
use crate::transport::Transport;

// =============================================================================
// OUTBOX
// =============================================================================

/// Where the reconciler sends its messages. Implemented by [`Transport`].
pub trait Outbox {
    /// Returns false when the message was discarded.
    fn send(&self, msg: &ClientMessage) -> bool;
}

impl Outbox for Transport {
    fn send(&self, msg: &ClientMessage) -> bool {
        Transport::send(self, msg)
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoomStatus {
    pub room_id: Option<String>,
    pub participant_count: usize,
}

/// Result of handling one event, for the rendering layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    Scene(SceneChange),
    Room(RoomStatus),
    /// The scene was uploaded for a new participant.
    SnapshotSent { objects: usize, delivered: bool },
    ServerError(ErrorPayload),
}

/// Edits fed into [`run_session`] by the UI or a script.
#[derive(Debug)]
pub enum LocalEdit {
    Add(VoxelObject),
    /// Place a default cube against a face at `point` with outward `normal`.
    Place { point: Vec3, normal: Vec3, color: String },
    Remove(RemoveObject),
    Recolor(ChangeColor),
    Clear,
    Load(SceneSnapshot),
    CreateRoom,
    JoinRoom(String),
    Export(oneshot::Sender<SceneSnapshot>),
}

// =============================================================================
// RECONCILER
// =============================================================================

pub struct Reconciler<O> {
    scene: Scene,
    status: RoomStatus,
    outbox: O,
}

impl<O: Outbox> Reconciler<O> {
    #[must_use]
    pub fn new(outbox: O) -> Self {
        Self { scene: Scene::new(), status: RoomStatus::default(), outbox }
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[must_use]
    pub fn status(&self) -> &RoomStatus {
        &self.status
    }

    #[must_use]
    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    // -------------------------------------------------------------------------
    // REMOTE
    // -------------------------------------------------------------------------

    /// Apply one message from the server.
    pub fn handle(&mut self, msg: ServerMessage) -> Update {
        match msg {
            ServerMessage::RoomCreated(created) => {
                info!(room_id = %created.room_id, "room created");
                self.set_status(created.room_id, created.participant_count)
            }
            ServerMessage::Joined(joined) => {
                info!(room_id = %joined.room_id, participants = joined.participant_count, "joined room");
                self.set_status(joined.room_id, joined.participant_count)
            }
            ServerMessage::ParticipantCountUpdate(count) => self.set_status(count.room_id, count.participant_count),
            ServerMessage::NewUserJoined => self.upload_scene(),
            ServerMessage::Error(err) => {
                warn!(message = %err.message, code = ?err.code, "server error");
                Update::ServerError(err)
            }
            ServerMessage::Scene(op) => {
                let kind = op.kind();
                let change = self.scene.apply(op);
                match &change {
                    SceneChange::Unmatched(target) => {
                        warn!(kind, position = ?target.position, "recolor target not found");
                    }
                    SceneChange::Replaced { count, .. } => info!(objects = count, "scene replaced from peer"),
                    _ => debug!(kind, "applied remote op"),
                }
                Update::Scene(change)
            }
        }
    }

    fn set_status(&mut self, room_id: String, participant_count: usize) -> Update {
        self.status = RoomStatus { room_id: Some(room_id), participant_count };
        Update::Room(self.status.clone())
    }

    fn upload_scene(&mut self) -> Update {
        let snapshot = self.scene.snapshot();
        let objects = snapshot.len();
        let delivered = self.outbox.send(&ClientMessage::Scene(SceneOp::UploadScene(snapshot)));
        info!(objects, delivered, "uploaded scene for new participant");
        Update::SnapshotSent { objects, delivered }
    }

    // -------------------------------------------------------------------------
    // LOCAL
    // -------------------------------------------------------------------------

    /// Validate and add locally, then send. Peers store exactly what was sent.
    ///
    /// # Errors
    ///
    /// Returns the voxel validation error; nothing is applied or sent.
    pub fn add(&mut self, mut object: VoxelObject) -> Result<SceneChange, CodecError> {
        object.validate()?;
        self.outbox.send(&ClientMessage::Scene(SceneOp::AddObject(object.clone())));
        Ok(self.scene.add(object))
    }

    /// Add a default-size cube snapped to the grid cell against a face.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidColor`] for a color that is not hex.
    pub fn place(&mut self, point: Vec3, normal: Vec3, color: impl Into<String>) -> Result<SceneChange, CodecError> {
        self.add(VoxelObject::placed_against(point, normal, color))
    }

    /// Remove locally; the removal is sent only if something matched.
    pub fn remove(&mut self, remove: RemoveObject) -> SceneChange {
        let change = self.scene.remove(&remove);
        if let SceneChange::Removed(object) = &change {
            let remove = RemoveObject { id: object.id, position: object.position, size: object.size };
            self.outbox.send(&ClientMessage::Scene(SceneOp::RemoveObject(remove)));
        }
        change
    }

    /// Recolor locally; the change is sent only if something matched.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidColor`] for a color that is not hex.
    pub fn recolor(&mut self, mut change: ChangeColor) -> Result<SceneChange, CodecError> {
        change.color = frames::normalize_color(&change.color)?;
        let applied = self.scene.recolor(change);
        if let SceneChange::Recolored { object, .. } = &applied {
            let change = ChangeColor { id: object.id, position: object.position, color: object.color.clone() };
            self.outbox.send(&ClientMessage::Scene(SceneOp::ChangeColor(change)));
        }
        Ok(applied)
    }

    pub fn clear(&mut self) -> SceneChange {
        self.outbox.send(&ClientMessage::Scene(SceneOp::ClearScene));
        self.scene.clear()
    }

    /// Replace the local scene with `snapshot` and push it to the room.
    ///
    /// # Errors
    ///
    /// Returns the first voxel validation error; the scene is left untouched.
    pub fn load_snapshot(&mut self, mut snapshot: SceneSnapshot) -> Result<SceneChange, CodecError> {
        snapshot.validate()?;
        self.outbox.send(&ClientMessage::Scene(SceneOp::UploadScene(snapshot.clone())));
        Ok(self.scene.replace(snapshot))
    }

    /// Replace the local scene without telling the room, e.g. to prepare a
    /// scene before creating a room for it.
    pub fn restore(&mut self, snapshot: SceneSnapshot) -> SceneChange {
        self.scene.replace(snapshot)
    }

    /// Parse exported JSON and load it.
    ///
    /// # Errors
    ///
    /// Returns the snapshot parse error; the scene is left untouched.
    pub fn import_json(&mut self, text: &str) -> Result<SceneChange, CodecError> {
        let snapshot = SceneSnapshot::from_json(text)?;
        self.load_snapshot(snapshot)
    }

    #[must_use]
    pub fn export_snapshot(&self) -> SceneSnapshot {
        self.scene.snapshot()
    }

    /// The scene as indented JSON, the export file format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn export_json(&self) -> Result<String, CodecError> {
        self.scene.snapshot().to_json_pretty()
    }

    pub fn create_room(&self) -> bool {
        self.outbox.send(&ClientMessage::CreateRoom)
    }

    pub fn join_room(&self, room_id: impl Into<String>) -> bool {
        self.outbox.send(&ClientMessage::JoinRoom(JoinRoom { room_id: room_id.into() }))
    }

    pub fn request_participant_count(&self) -> bool {
        self.outbox.send(&ClientMessage::GetParticipantCount)
    }

    /// Apply one local edit. `Export` answers on its channel and yields no update.
    pub fn edit(&mut self, edit: LocalEdit) -> Option<Update> {
        let result = match edit {
            LocalEdit::Add(object) => self.add(object),
            LocalEdit::Place { point, normal, color } => self.place(point, normal, color),
            LocalEdit::Remove(remove) => Ok(self.remove(remove)),
            LocalEdit::Recolor(change) => self.recolor(change),
            LocalEdit::Clear => Ok(self.clear()),
            LocalEdit::Load(snapshot) => self.load_snapshot(snapshot),
            LocalEdit::CreateRoom => {
                self.create_room();
                return None;
            }
            LocalEdit::JoinRoom(room_id) => {
                self.join_room(room_id);
                return None;
            }
            LocalEdit::Export(reply) => {
                let _ = reply.send(self.export_snapshot());
                return None;
            }
        };
        match result {
            Ok(change) => Some(Update::Scene(change)),
            Err(e) => {
                warn!(error = %e, "local edit rejected");
                None
            }
        }
    }
}

// =============================================================================
// RUN LOOP
// =============================================================================

/// Drive a reconciler until the transport's inbound channel closes.
///
/// Remote messages and local edits are applied in arrival order, one at a
/// time. Every resulting [`Update`] is forwarded to `updates` when given.
/// Returns the reconciler so its final scene can be inspected.
pub async fn run_session<O: Outbox>(
    mut reconciler: Reconciler<O>,
    mut inbound: mpsc::Receiver<ServerMessage>,
    mut edits: mpsc::Receiver<LocalEdit>,
    updates: Option<mpsc::Sender<Update>>,
) -> Reconciler<O> {
    let mut edits_open = true;

    loop {
        let update = tokio::select! {
            msg = inbound.recv() => {
                let Some(msg) = msg else { break };
                Some(reconciler.handle(msg))
            }
            edit = edits.recv(), if edits_open => {
                match edit {
                    Some(edit) => reconciler.edit(edit),
                    None => {
                        edits_open = false;
                        None
                    }
                }
            }
        };

        if let (Some(update), Some(tx)) = (update, &updates) {
            if tx.send(update).await.is_err() {
                debug!("session: update consumer gone");
            }
        }
    }

    info!(objects = reconciler.scene().len(), "session ended");
    reconciler
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
