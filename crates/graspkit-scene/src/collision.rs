//! Collision Query Adapter.
//!
//! [`CollisionChecker`] answers "is this robot state in collision with this
//! snapshot?".  Implementations hold no per-query mutable state, so one
//! checker is shared by every worker of a filter run.
//!
//! [`SceneCollisionChecker`] tests the robot's link spheres against
//! - scene objects (boxes and spheres),
//! - the point-cloud octree, and
//! - each other (non-adjacent links only),
//!
//! skipping any pair the snapshot's allowed-collision matrix permits.

use graspkit_geometry::{Sphere, Vec3};
use graspkit_types::{LinkSphere, RobotState};
use serde::{Deserialize, Serialize};

use crate::scene::{OCTOMAP_ID, PlanningSceneSnapshot};

/// The body a robot link touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ContactBody {
    Object(String),
    PointCloud,
    Link(String),
}

impl std::fmt::Display for ContactBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactBody::Object(id) => write!(f, "object '{id}'"),
            ContactBody::PointCloud => write!(f, "point cloud"),
            ContactBody::Link(name) => write!(f, "link '{name}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub link: String,
    pub body: ContactBody,
    /// Approximate contact location in the scene frame.
    pub position: Vec3,
}

pub trait CollisionChecker: Send + Sync {
    /// True when `state` touches the environment or itself.
    fn is_in_collision(&self, state: &RobotState, scene: &PlanningSceneSnapshot) -> bool;

    /// Up to `max` contacts for `state`, used for diagnostics only.
    fn contacts(&self, _state: &RobotState, _scene: &PlanningSceneSnapshot, _max: usize) -> Vec<Contact> {
        Vec::new()
    }
}

/// Sphere-based checker over a [`PlanningSceneSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneCollisionChecker {
    /// Inflate every link sphere by this margin (m).
    pub padding: f64,
    pub check_self_collision: bool,
}

impl Default for SceneCollisionChecker {
    fn default() -> Self {
        Self {
            padding: 0.0,
            check_self_collision: true,
        }
    }
}

impl SceneCollisionChecker {
    pub fn new(padding: f64) -> Self {
        Self {
            padding,
            ..Self::default()
        }
    }

    fn padded(&self, link: &LinkSphere) -> Sphere {
        Sphere::new(link.sphere.centre, link.sphere.radius + self.padding)
    }

    /// Visit contacts until `visit` returns `false`.
    fn scan(&self, state: &RobotState, scene: &PlanningSceneSnapshot, visit: &mut dyn FnMut(Contact) -> bool) {
        let acm = scene.acm();

        for link in &state.spheres {
            let sphere = self.padded(link);

            for object in scene.objects() {
                if acm.is_allowed(&link.link, &object.id) || !object.overlaps_sphere(&sphere) {
                    continue;
                }
                let contact = Contact {
                    link: link.link.clone(),
                    body: ContactBody::Object(object.id.clone()),
                    position: object.closest_point(sphere.centre),
                };
                if !visit(contact) {
                    return;
                }
            }

            if let Some(cloud) = scene.point_cloud()
                && !acm.is_allowed(&link.link, OCTOMAP_ID)
                && let Some(point) = cloud.first_in_sphere(&sphere)
            {
                let contact = Contact {
                    link: link.link.clone(),
                    body: ContactBody::PointCloud,
                    position: point,
                };
                if !visit(contact) {
                    return;
                }
            }
        }

        if !self.check_self_collision {
            return;
        }
        for (i, a) in state.spheres.iter().enumerate() {
            for b in &state.spheres[i + 1..] {
                if a.link_index.abs_diff(b.link_index) <= 1 || acm.is_allowed(&a.link, &b.link) {
                    continue;
                }
                let (sa, sb) = (self.padded(a), self.padded(b));
                if !sa.overlaps_sphere(&sb) {
                    continue;
                }
                let contact = Contact {
                    link: a.link.clone(),
                    body: ContactBody::Link(b.link.clone()),
                    position: sa.centre.add(sb.centre).scale(0.5),
                };
                if !visit(contact) {
                    return;
                }
            }
        }
    }
}

impl CollisionChecker for SceneCollisionChecker {
    fn is_in_collision(&self, state: &RobotState, scene: &PlanningSceneSnapshot) -> bool {
        let mut hit = false;
        self.scan(state, scene, &mut |_| {
            hit = true;
            false
        });
        hit
    }

    fn contacts(&self, state: &RobotState, scene: &PlanningSceneSnapshot, max: usize) -> Vec<Contact> {
        let mut out = Vec::new();
        if max == 0 {
            return out;
        }
        self.scan(state, scene, &mut |c| {
            out.push(c);
            out.len() < max
        });
        out
    }
}
