//! Live planning scene and its immutable per-run snapshot.
//!
//! [`PlanningScene`] is the mutable world model that perception and the
//! application update.  A filter run never reads it directly: it calls
//! [`PlanningScene::snapshot`] once and shares the resulting
//! [`PlanningSceneSnapshot`] between all workers.  The snapshot is an
//! `Arc` over a deep copy, so later edits to the live scene cannot change the
//! outcome of a run in progress.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use graspkit_geometry::octree::Octree;
use graspkit_geometry::{Aabb, Pose, Sphere, Vec3};
use graspkit_types::GraspError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// ACM name of the point-cloud obstacle.
pub const OCTOMAP_ID: &str = "<octomap>";

// ────────────────────────────────────────────────────────────────────────────
// Collision objects
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectShape {
    /// Box with full edge lengths `size`, centred on the object pose.
    Box { size: Vec3 },
    Sphere { radius: f64 },
}

/// A named obstacle placed in the scene frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionObject {
    pub id: String,
    pub pose: Pose,
    pub shape: ObjectShape,
}

impl CollisionObject {
    pub fn cuboid(id: impl Into<String>, pose: Pose, size: Vec3) -> Self {
        Self {
            id: id.into(),
            pose,
            shape: ObjectShape::Box { size },
        }
    }

    pub fn sphere(id: impl Into<String>, centre: Vec3, radius: f64) -> Self {
        Self {
            id: id.into(),
            pose: Pose::from_translation(centre),
            shape: ObjectShape::Sphere { radius },
        }
    }

    /// Closest point of the object surface or interior to `p`.
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        match &self.shape {
            ObjectShape::Box { size } => {
                let local = self.pose.inverse().transform_point(p);
                let clamped = Aabb::from_centre(Vec3::zero(), *size).closest_point(local);
                self.pose.transform_point(clamped)
            }
            ObjectShape::Sphere { radius } => {
                let centre = self.pose.translation;
                match p.sub(centre).normalized() {
                    Some(dir) if p.distance(centre) > *radius => centre.add(dir.scale(*radius)),
                    _ => p,
                }
            }
        }
    }

    pub fn overlaps_sphere(&self, sphere: &Sphere) -> bool {
        self.closest_point(sphere.centre).distance(sphere.centre) <= sphere.radius
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AllowedCollisionMatrix
// ────────────────────────────────────────────────────────────────────────────

/// Symmetric set of body pairs whose contact is ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowedCollisionMatrix {
    allowed: BTreeSet<(String, String)>,
}

impl AllowedCollisionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub fn set_entry(&mut self, a: &str, b: &str, allowed: bool) {
        let key = Self::key(a, b);
        if allowed {
            self.allowed.insert(key);
        } else {
            self.allowed.remove(&key);
        }
    }

    pub fn is_allowed(&self, a: &str, b: &str) -> bool {
        self.allowed.contains(&Self::key(a, b))
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PlanningScene
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct SceneData {
    frame: String,
    version: u64,
    objects: BTreeMap<String, CollisionObject>,
    cloud: Option<Octree>,
    acm: AllowedCollisionMatrix,
}

/// The live, mutable world model.
#[derive(Debug, Clone, Default)]
pub struct PlanningScene {
    data: SceneData,
}

impl PlanningScene {
    /// Create an empty scene expressed in `frame` (the robot model frame).
    pub fn new(frame: impl Into<String>) -> Self {
        Self {
            data: SceneData {
                frame: frame.into(),
                ..SceneData::default()
            },
        }
    }

    pub fn frame(&self) -> &str {
        &self.data.frame
    }

    /// Monotonic edit counter; snapshots record the version they copied.
    pub fn version(&self) -> u64 {
        self.data.version
    }

    /// Add or replace an object.
    pub fn add_object(&mut self, object: CollisionObject) {
        debug!(object = %object.id, "planning scene: add object");
        self.data.objects.insert(object.id.clone(), object);
        self.data.version += 1;
    }

    pub fn remove_object(&mut self, id: &str) -> Option<CollisionObject> {
        let removed = self.data.objects.remove(id);
        if removed.is_some() {
            self.data.version += 1;
        }
        removed
    }

    /// Replace the point-cloud obstacle.
    pub fn set_point_cloud(&mut self, cloud: Octree) {
        debug!(points = cloud.len(), "planning scene: point cloud updated");
        self.data.cloud = Some(cloud);
        self.data.version += 1;
    }

    pub fn clear_point_cloud(&mut self) {
        if self.data.cloud.take().is_some() {
            self.data.version += 1;
        }
    }

    pub fn set_allowed_collision(&mut self, a: &str, b: &str, allowed: bool) {
        self.data.acm.set_entry(a, b, allowed);
        self.data.version += 1;
    }

    pub fn object(&self, id: &str) -> Option<&CollisionObject> {
        self.data.objects.get(id)
    }

    /// Freeze the current world into an immutable, shareable snapshot.
    pub fn snapshot(&self) -> PlanningSceneSnapshot {
        PlanningSceneSnapshot {
            data: Arc::new(self.data.clone()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PlanningSceneSnapshot
// ────────────────────────────────────────────────────────────────────────────

/// Read-only point-in-time copy of a [`PlanningScene`].
///
/// Cloning is cheap and every clone refers to the same frozen data, so it
/// can be handed to any number of workers without locking.
#[derive(Debug, Clone)]
pub struct PlanningSceneSnapshot {
    data: Arc<SceneData>,
}

impl PlanningSceneSnapshot {
    pub fn frame(&self) -> &str {
        &self.data.frame
    }

    pub fn version(&self) -> u64 {
        self.data.version
    }

    pub fn objects(&self) -> impl Iterator<Item = &CollisionObject> {
        self.data.objects.values()
    }

    pub fn object(&self, id: &str) -> Option<&CollisionObject> {
        self.data.objects.get(id)
    }

    pub fn point_cloud(&self) -> Option<&Octree> {
        self.data.cloud.as_ref()
    }

    pub fn acm(&self) -> &AllowedCollisionMatrix {
        &self.data.acm
    }

    /// Derive a new snapshot in which every link in `links` may touch
    /// `object_id`.  `self` is left unchanged.
    ///
    /// # Errors
    ///
    /// [`GraspError::UnknownObject`] when the object is not in the scene.
    pub fn with_allowed_contacts(&self, object_id: &str, links: &[String]) -> Result<Self, GraspError> {
        if !self.data.objects.contains_key(object_id) {
            return Err(GraspError::UnknownObject(object_id.to_string()));
        }
        let mut data = (*self.data).clone();
        for link in links {
            debug!(object = object_id, link = %link, "collisions allowed");
            data.acm.set_entry(object_id, link, true);
        }
        Ok(Self { data: Arc::new(data) })
    }

    /// True when both snapshots share the same frozen data.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}
