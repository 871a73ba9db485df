//! Full-scene snapshots for join synchronization and export.

use serde::{Deserialize, Serialize};

use crate::CodecError;
use crate::voxel::VoxelObject;

/// The ordered content of a scene at one instant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneSnapshot {
    pub objects: Vec<VoxelObject>,
}

impl SceneSnapshot {
    #[must_use]
    pub fn new(objects: Vec<VoxelObject>) -> Self {
        Self { objects }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Parse a snapshot from JSON text (a top-level array of voxels).
    /// Every voxel is validated and its color normalized.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Snapshot`] for malformed JSON and the voxel
    /// validation error for a bad entry.
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        let mut snapshot: Self = serde_json::from_str(text).map_err(CodecError::Snapshot)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Render the snapshot as indented JSON, the export file format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, CodecError> {
        serde_json::to_string_pretty(self).map_err(CodecError::Encode)
    }

    /// Validate every voxel and normalize its color in place.
    ///
    /// # Errors
    ///
    /// Returns the first voxel validation error.
    pub fn validate(&mut self) -> Result<(), CodecError> {
        for object in &mut self.objects {
            object.validate()?;
        }
        Ok(())
    }
}

/// `uploadScene` payload as seen on the wire.
///
/// Editors send the snapshot either as a JSON string holding the array, or
/// as the array itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotPayload {
    Inline(SceneSnapshot),
    Text(String),
}

impl SnapshotPayload {
    /// Resolve either form into a validated snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the text form does not parse or any voxel
    /// fails validation.
    pub fn into_snapshot(self) -> Result<SceneSnapshot, CodecError> {
        match self {
            Self::Text(text) => SceneSnapshot::from_json(&text),
            Self::Inline(mut snapshot) => {
                snapshot.validate()?;
                Ok(snapshot)
            }
        }
    }
}

impl From<SceneSnapshot> for SnapshotPayload {
    fn from(snapshot: SceneSnapshot) -> Self {
        Self::Inline(snapshot)
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
