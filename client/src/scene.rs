//! Local scene model: the ordered set of voxels one editor renders.
//!
//! Matching rules for targeted mutations:
//! - an op carrying an `id` matches the object with that id, if present
//! - otherwise `removeObject` takes the first object with the exact position
//!   and a size within `SIZE_TOLERANCE`, and `changeColor` the first object
//!   at the exact position
//!
//! Every mutation returns a [`SceneChange`] so the caller can update
//! rendering resources without diffing.

use frames::{ChangeColor, ObjectId, RemoveObject, SceneOp, SceneSnapshot, Vec3, VoxelObject};

/// What a mutation did to the scene.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneChange {
    Added(VoxelObject),
    Removed(VoxelObject),
    Recolored { object: VoxelObject, previous: String },
    /// `removeObject` that matched nothing.
    Unchanged,
    /// `changeColor` that matched nothing.
    Unmatched(ChangeColor),
    Cleared(Vec<VoxelObject>),
    /// Wholesale replacement; carries the objects that were dropped.
    Replaced { removed: Vec<VoxelObject>, count: usize },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    objects: Vec<VoxelObject>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn objects(&self) -> &[VoxelObject] {
        &self.objects
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Apply a scene op from the wire.
    pub fn apply(&mut self, op: SceneOp) -> SceneChange {
        match op {
            SceneOp::AddObject(object) => self.add(object),
            SceneOp::RemoveObject(remove) => self.remove(&remove),
            SceneOp::ChangeColor(change) => self.recolor(change),
            SceneOp::ClearScene => self.clear(),
            SceneOp::UploadScene(snapshot) => self.replace(snapshot),
        }
    }

    /// Append. Duplicate placements are kept.
    pub fn add(&mut self, object: VoxelObject) -> SceneChange {
        self.objects.push(object.clone());
        SceneChange::Added(object)
    }

    pub fn remove(&mut self, remove: &RemoveObject) -> SceneChange {
        let index = self
            .index_of_id(remove.id)
            .or_else(|| self.objects.iter().position(|o| o.matches_shape(&remove.position, &remove.size)));
        match index {
            Some(index) => SceneChange::Removed(self.objects.remove(index)),
            None => SceneChange::Unchanged,
        }
    }

    /// Recolor one object. Last applied wins.
    pub fn recolor(&mut self, change: ChangeColor) -> SceneChange {
        let index = self
            .index_of_id(change.id)
            .or_else(|| self.index_at(&change.position));
        let Some(object) = index.and_then(|i| self.objects.get_mut(i)) else {
            return SceneChange::Unmatched(change);
        };
        let previous = std::mem::replace(&mut object.color, change.color);
        SceneChange::Recolored { object: object.clone(), previous }
    }

    pub fn clear(&mut self) -> SceneChange {
        SceneChange::Cleared(std::mem::take(&mut self.objects))
    }

    pub fn replace(&mut self, snapshot: SceneSnapshot) -> SceneChange {
        let count = snapshot.len();
        let removed = std::mem::replace(&mut self.objects, snapshot.objects);
        SceneChange::Replaced { removed, count }
    }

    #[must_use]
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot::new(self.objects.clone())
    }

    /// First object at exactly `position`.
    #[must_use]
    pub fn object_at(&self, position: &Vec3) -> Option<&VoxelObject> {
        self.index_at(position).map(|i| &self.objects[i])
    }

    fn index_at(&self, position: &Vec3) -> Option<usize> {
        self.objects.iter().position(|o| o.position.exactly_eq(position))
    }

    fn index_of_id(&self, id: Option<ObjectId>) -> Option<usize> {
        let id = id?;
        self.objects.iter().position(|o| o.id == Some(id))
    }
}

impl From<SceneSnapshot> for Scene {
    fn from(snapshot: SceneSnapshot) -> Self {
        Self { objects: snapshot.objects }
    }
}

#[cfg(test)]
#[path = "scene_test.rs"]
mod tests;
