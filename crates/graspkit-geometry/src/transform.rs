//! Rigid-body pose math and the named frame tree.
//!
//! Grasp poses, cutting planes and IK targets are all expressed as a [`Pose`]
//! (translation + unit quaternion) relative to some named frame.  The
//! [`FrameTree`] stores the fixed transforms between those frames and composes
//! chains of them via BFS.
//!
//! # Example
//!
//! ```rust
//! use graspkit_geometry::transform::{FrameTree, Pose, Quaternion, Vec3};
//!
//! let mut frames = FrameTree::new();
//!
//! // The arm base sits 0.5 m above the world origin.
//! frames.set_transform("world", "base_link",
//!     Pose::new(Vec3::new(0.0, 0.0, 0.5), Quaternion::identity()));
//!
//! // A grasp 1 m above the world origin is 0.5 m above the arm base.
//! let world_to_base = frames.lookup("world", "base_link").unwrap();
//! let grasp = Pose::from_translation(Vec3::new(0.0, 0.0, 1.0));
//! let in_base = world_to_base.inverse().compose(grasp);
//! assert!((in_base.translation.z - 0.5).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector or point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub const fn unit_x() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    pub const fn unit_y() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    pub const fn unit_z() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn neg(self) -> Self {
        self.scale(-1.0)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, rhs: Self) -> f64 {
        self.sub(rhs).norm()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n < 1e-12 || !n.is_finite() {
            None
        } else {
            Some(self.scale(1.0 / n))
        }
    }

    /// Unsigned angle between two vectors in `[0, π]`.
    ///
    /// Returns π/2 when either vector is zero, so a degenerate axis never
    /// looks aligned.
    pub fn angle_to(self, rhs: Self) -> f64 {
        match (self.normalized(), rhs.normalized()) {
            (Some(a), Some(b)) => a.cross(b).norm().atan2(a.dot(b)),
            _ => std::f64::consts::FRAC_PI_2,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  Use [`Quaternion::normalized`] if the components
    /// do not already have unit length.
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle` radians about `axis`.  A zero axis yields identity.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let Some(a) = axis.normalized() else {
            return Self::identity();
        };
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(c, a.x * s, a.y * s, a.z * s)
    }

    /// Fixed-axis roll/pitch/yaw: `Rz(yaw) * Ry(pitch) * Rx(roll)`.
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let qz = Self::from_axis_angle(Vec3::unit_z(), yaw);
        let qy = Self::from_axis_angle(Vec3::unit_y(), pitch);
        let qx = Self::from_axis_angle(Vec3::unit_x(), roll);
        qz.mul(qy).mul(qx)
    }

    /// Inverse of [`Quaternion::from_rpy`].
    pub fn to_rpy(self) -> (f64, f64, f64) {
        let m = self.to_matrix();
        let pitch = (-m[2][0]).clamp(-1.0, 1.0).asin();
        if m[2][0].abs() < 1.0 - 1e-9 {
            let roll = m[2][1].atan2(m[2][2]);
            let yaw = m[1][0].atan2(m[0][0]);
            (roll, pitch, yaw)
        } else {
            // Gimbal lock: fold all of the remaining rotation into yaw.
            let yaw = (-m[0][1]).atan2(m[1][1]);
            (0.0, pitch, yaw)
        }
    }

    /// Build from a row-major rotation matrix.
    pub fn from_matrix(m: [[f64; 3]; 3]) -> Self {
        let trace = m[0][0] + m[1][1] + m[2][2];
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new(
                0.25 * s,
                (m[2][1] - m[1][2]) / s,
                (m[0][2] - m[2][0]) / s,
                (m[1][0] - m[0][1]) / s,
            )
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Self::new(
                (m[2][1] - m[1][2]) / s,
                0.25 * s,
                (m[0][1] + m[1][0]) / s,
                (m[0][2] + m[2][0]) / s,
            )
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Self::new(
                (m[0][2] - m[2][0]) / s,
                (m[0][1] + m[1][0]) / s,
                0.25 * s,
                (m[1][2] + m[2][1]) / s,
            )
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Self::new(
                (m[1][0] - m[0][1]) / s,
                (m[0][2] + m[2][0]) / s,
                (m[1][2] + m[2][1]) / s,
                0.25 * s,
            )
        };
        q.normalized()
    }

    /// Row-major rotation matrix.
    pub fn to_matrix(self) -> [[f64; 3]; 3] {
        let Self { w, x, y, z } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n < 1e-12 || !n.is_finite() {
            Self::identity()
        } else {
            Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
        }
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Magnitude of the rotation taking `self` to `other`, in `[0, π]`.
    pub fn angle_to(self, other: Self) -> f64 {
        let d = self.conjugate().mul(other);
        let v = (d.x * d.x + d.y * d.y + d.z * d.z).sqrt();
        2.0 * v.atan2(d.w.abs())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quaternion::identity())
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation).normalized();
        Self::new(translated, rotated)
    }

    /// T_B_A for `self` = T_A_B.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation).neg(), inv_rot)
    }

    /// Map a point expressed in the child frame into the parent frame.
    pub fn transform_point(self, p: Vec3) -> Vec3 {
        self.rotation.rotate(p).add(self.translation)
    }

    /// Rotate a direction expressed in the child frame into the parent frame.
    pub fn transform_vector(self, v: Vec3) -> Vec3 {
        self.rotation.rotate(v)
    }

    pub fn x_axis(self) -> Vec3 {
        self.rotation.rotate(Vec3::unit_x())
    }

    pub fn y_axis(self) -> Vec3 {
        self.rotation.rotate(Vec3::unit_y())
    }

    pub fn z_axis(self) -> Vec3 {
        self.rotation.rotate(Vec3::unit_z())
    }

    /// Same orientation, translation shifted by `offset` in the parent frame.
    pub fn translated(self, offset: Vec3) -> Self {
        Self::new(self.translation.add(offset), self.rotation)
    }

    pub fn is_finite(self) -> bool {
        self.translation.is_finite()
            && self.rotation.w.is_finite()
            && self.rotation.x.is_finite()
            && self.rotation.y.is_finite()
            && self.rotation.z.is_finite()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FrameTree
// ────────────────────────────────────────────────────────────────────────────

/// A graph of named reference frames and the [`Pose`]s that relate them.
///
/// Registering `parent → child` also registers the inverse edge, so
/// [`FrameTree::lookup`] can walk the tree in either direction.
#[derive(Debug, Clone, Default)]
pub struct FrameTree {
    /// `edges[from][to] = T_from_to`
    edges: HashMap<String, HashMap<String, Pose>>,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform `T_parent_child`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Pose) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
        self.edges
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string(), transform.inverse());
    }

    /// True when `frame` has been mentioned by at least one transform.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame)
    }

    /// Compute `T_source_target`, the pose of `target_frame` expressed in
    /// `source_frame`.
    ///
    /// Returns `None` if no path exists between the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Pose> {
        if source_frame == target_frame {
            return Some(Pose::identity());
        }

        let mut queue: VecDeque<(&str, Pose)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back((source_frame, Pose::identity()));
        visited.insert(source_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(current) else {
                continue;
            };
            for (next, edge) in neighbours {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                let composed = accumulated.compose(*edge);
                if next == target_frame {
                    return Some(composed);
                }
                queue.push_back((next.as_str(), composed));
            }
        }

        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn assert_vec_close(a: Vec3, b: Vec3) {
        assert!(a.distance(b) < 1e-9, "expected {b:?}, got {a:?}");
    }

    // ── Vec3 ────────────────────────────────────────────────────────────────

    #[test]
    fn cross_of_x_and_y_is_z() {
        assert_vec_close(Vec3::unit_x().cross(Vec3::unit_y()), Vec3::unit_z());
    }

    #[test]
    fn normalized_zero_vector_is_none() {
        assert!(Vec3::zero().normalized().is_none());
    }

    #[test]
    fn angle_between_opposite_vectors_is_pi() {
        let a = Vec3::new(0.0, 0.0, 2.0);
        let b = Vec3::new(0.0, 0.0, -0.5);
        assert!((a.angle_to(b) - PI).abs() < 1e-9);
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn yaw_rotates_x_to_y() {
        let q = Quaternion::from_axis_angle(Vec3::unit_z(), FRAC_PI_2);
        assert_vec_close(q.rotate(Vec3::unit_x()), Vec3::unit_y());
    }

    #[test]
    fn rpy_survives_matrix_conversion() {
        let q = Quaternion::from_rpy(0.3, -0.4, 1.2);
        let (r, p, y) = q.to_rpy();
        assert!((r - 0.3).abs() < 1e-9);
        assert!((p + 0.4).abs() < 1e-9);
        assert!((y - 1.2).abs() < 1e-9);

        let back = Quaternion::from_matrix(q.to_matrix());
        assert!(q.angle_to(back) < 1e-9);
    }

    #[test]
    fn angle_to_measures_relative_rotation() {
        let a = Quaternion::from_axis_angle(Vec3::unit_x(), 0.2);
        let b = Quaternion::from_axis_angle(Vec3::unit_x(), 0.2 + FRAC_PI_4);
        assert!((a.angle_to(b) - FRAC_PI_4).abs() < 1e-9);
    }

    // ── Pose ────────────────────────────────────────────────────────────────

    #[test]
    fn compose_with_inverse_is_identity() {
        let t = Pose::new(
            Vec3::new(0.4, -1.0, 2.0),
            Quaternion::from_rpy(0.1, 0.7, -2.0),
        );
        let id = t.compose(t.inverse());
        assert_vec_close(id.translation, Vec3::zero());
        assert!(id.rotation.angle_to(Quaternion::identity()) < 1e-9);
    }

    #[test]
    fn transform_point_applies_rotation_then_translation() {
        let t = Pose::new(
            Vec3::new(1.0, 0.0, 0.0),
            Quaternion::from_axis_angle(Vec3::unit_z(), FRAC_PI_2),
        );
        assert_vec_close(t.transform_point(Vec3::unit_x()), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn translated_keeps_orientation() {
        let q = Quaternion::from_rpy(0.0, 0.5, 0.0);
        let t = Pose::new(Vec3::zero(), q).translated(Vec3::new(0.0, 0.2, 0.3));
        assert_vec_close(t.translation, Vec3::new(0.0, 0.2, 0.3));
        assert_eq!(t.rotation, q);
    }

    // ── FrameTree ───────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tree = FrameTree::new();
        assert_eq!(tree.lookup("world", "world"), Some(Pose::identity()));
    }

    #[test]
    fn lookup_chains_transforms() {
        let mut tree = FrameTree::new();
        tree.set_transform("world", "base", Pose::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        tree.set_transform("base", "tool", Pose::from_translation(Vec3::new(0.0, 0.0, 0.5)));
        let t = tree.lookup("world", "tool").unwrap();
        assert_vec_close(t.translation, Vec3::new(1.0, 0.0, 0.5));
    }

    #[test]
    fn lookup_walks_edges_backwards() {
        let mut tree = FrameTree::new();
        tree.set_transform("world", "base", Pose::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let t = tree.lookup("base", "world").unwrap();
        assert_vec_close(t.translation, Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn lookup_unknown_frame_is_none() {
        let mut tree = FrameTree::new();
        tree.set_transform("world", "base", Pose::identity());
        assert!(tree.lookup("world", "camera").is_none());
        assert!(!tree.has_frame("camera"));
    }
}
