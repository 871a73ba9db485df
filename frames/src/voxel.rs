//! Voxel object model shared by every scene message.
//!
//! Identity is structural: two voxels are the same object when their
//! positions are exactly equal and their sizes agree within
//! [`SIZE_TOLERANCE`]. Objects created by current clients also carry a stable
//! `id`, which takes precedence when both sides of a comparison have one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CodecError;

/// Stable identifier assigned to a voxel by the client that created it.
pub type ObjectId = Uuid;

/// Per-axis tolerance used when comparing voxel sizes.
pub const SIZE_TOLERANCE: f64 = 1e-6;

/// Edge length of a voxel placed by the editor.
pub const DEFAULT_CUBE_SIZE: f64 = 50.0;

/// A point or extent in scene space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A cube extent with all three edges equal.
    #[must_use]
    pub const fn splat(v: f64) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Exact per-axis equality. Used for position matching.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn exactly_eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z
    }

    /// Per-axis equality within [`SIZE_TOLERANCE`]. Used for size matching.
    #[must_use]
    pub fn approx_eq(&self, other: &Self) -> bool {
        (self.x - other.x).abs() < SIZE_TOLERANCE
            && (self.y - other.y).abs() < SIZE_TOLERANCE
            && (self.z - other.z).abs() < SIZE_TOLERANCE
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A cuboid scene object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub position: Vec3,
    pub size: Vec3,
    pub color: String,
}

impl VoxelObject {
    /// Create a voxel with a fresh stable id.
    #[must_use]
    pub fn new(position: Vec3, size: Vec3, color: impl Into<String>) -> Self {
        Self { id: Some(Uuid::new_v4()), position, size, color: color.into() }
    }

    /// Create a cube of [`DEFAULT_CUBE_SIZE`] snapped to the grid cell that
    /// contains `point + normal`, the placement rule for clicking a face.
    #[must_use]
    pub fn placed_against(point: Vec3, normal: Vec3, color: impl Into<String>) -> Self {
        let target = Vec3::new(point.x + normal.x, point.y + normal.y, point.z + normal.z);
        Self::new(snap_to_grid(target, DEFAULT_CUBE_SIZE), Vec3::splat(DEFAULT_CUBE_SIZE), color)
    }

    /// Structural match: exact position, size within tolerance.
    #[must_use]
    pub fn matches_shape(&self, position: &Vec3, size: &Vec3) -> bool {
        self.position.exactly_eq(position) && self.size.approx_eq(size)
    }

    /// Validate geometry and normalize the color in place.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidColor`] for a non-hex color and
    /// [`CodecError::InvalidPayload`] for non-finite or negative geometry.
    pub fn validate(&mut self) -> Result<(), CodecError> {
        if !self.position.is_finite() || !self.size.is_finite() {
            return Err(invalid_geometry("coordinates must be finite"));
        }
        if self.size.x < 0.0 || self.size.y < 0.0 || self.size.z < 0.0 {
            return Err(invalid_geometry("size must not be negative"));
        }
        self.color = normalize_color(&self.color)?;
        Ok(())
    }
}

fn invalid_geometry(reason: &str) -> CodecError {
    CodecError::InvalidPayload { kind: "voxel".into(), reason: reason.into() }
}

/// Snap a point to the center of its grid cell: `floor(p / s) * s + s / 2`.
#[must_use]
pub fn snap_to_grid(point: Vec3, cell: f64) -> Vec3 {
    let snap = |v: f64| (v / cell).floor() * cell + cell / 2.0;
    Vec3::new(snap(point.x), snap(point.y), snap(point.z))
}

/// Normalize a hex color to lowercase `#rrggbb`.
///
/// Accepts an optional leading `#` and both the 3- and 6-digit forms;
/// snapshots exported by older editors omit the `#`.
///
/// # Errors
///
/// Returns [`CodecError::InvalidColor`] for anything else.
pub fn normalize_color(raw: &str) -> Result<String, CodecError> {
    let hex = raw.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidColor(raw.to_owned()));
    }
    match hex.len() {
        6 => Ok(format!("#{}", hex.to_ascii_lowercase())),
        3 => {
            let mut out = String::with_capacity(7);
            out.push('#');
            for c in hex.chars() {
                let c = c.to_ascii_lowercase();
                out.push(c);
                out.push(c);
            }
            Ok(out)
        }
        _ => Err(CodecError::InvalidColor(raw.to_owned())),
    }
}

#[cfg(test)]
#[path = "voxel_test.rs"]
mod tests;
