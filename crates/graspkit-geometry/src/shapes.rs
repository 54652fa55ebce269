//! Collision primitives.
//!
//! Robot links are approximated by [`Sphere`]s; world obstacles are
//! [`Aabb`]s or spheres.  All overlap tests treat touching as overlapping.

use serde::{Deserialize, Serialize};

use crate::transform::Vec3;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Box of the given full `size` centred on `centre`.
    pub fn from_centre(centre: Vec3, size: Vec3) -> Self {
        let half = size.scale(0.5);
        Self::new(centre.sub(half), centre.add(half))
    }

    pub fn centre(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    pub fn size(&self) -> Vec3 {
        self.max.sub(self.min)
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True when `other` overlaps (intersects or touches) this box.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Closest point of the box to `p` (`p` itself when inside).
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        Vec3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sphere
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub centre: Vec3,
    pub radius: f64,
}

impl Sphere {
    pub fn new(centre: Vec3, radius: f64) -> Self {
        Self { centre, radius }
    }

    pub fn overlaps_sphere(&self, other: &Sphere) -> bool {
        self.centre.distance(other.centre) <= self.radius + other.radius
    }

    pub fn overlaps_aabb(&self, aabb: &Aabb) -> bool {
        aabb.closest_point(self.centre).distance(self.centre) <= self.radius
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.centre.distance(p) <= self.radius
    }

    /// Tight axis-aligned bound.
    pub fn bounding_box(&self) -> Aabb {
        let r = Vec3::new(self.radius, self.radius, self.radius);
        Aabb::new(self.centre.sub(r), self.centre.add(r))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GraspParallelPlane
// ────────────────────────────────────────────────────────────────────────────

/// Which plane of a reference frame a cutting plane lies in.
///
/// The plane's normal is the remaining axis: `XY` is tested along z, `XZ`
/// along y and `YZ` along x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraspParallelPlane {
    Xy,
    Xz,
    Yz,
}

impl GraspParallelPlane {
    /// The coordinate of `p` measured along this plane's normal.
    pub fn normal_coordinate(self, p: Vec3) -> f64 {
        match self {
            Self::Xy => p.z,
            Self::Xz => p.y,
            Self::Yz => p.x,
        }
    }

    /// Unit normal in the plane's own frame.
    pub fn normal(self) -> Vec3 {
        match self {
            Self::Xy => Vec3::unit_z(),
            Self::Xz => Vec3::unit_y(),
            Self::Yz => Vec3::unit_x(),
        }
    }
}

impl std::fmt::Display for GraspParallelPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xy => write!(f, "XY"),
            Self::Xz => write!(f, "XZ"),
            Self::Yz => write!(f, "YZ"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_new_normalises_corners() {
        let b = Aabb::new(Vec3::new(1.0, -1.0, 2.0), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn from_centre_spans_half_size_each_way() {
        let b = Aabb::from_centre(Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 2.0, 0.2));
        assert!((b.min.z - 0.9).abs() < 1e-12);
        assert!((b.max.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sphere_touching_box_face_overlaps() {
        let b = Aabb::new(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        let touching = Sphere::new(Vec3::new(0.5, 0.5, 1.25), 0.25);
        let clear = Sphere::new(Vec3::new(0.5, 0.5, 1.3), 0.25);
        assert!(touching.overlaps_aabb(&b));
        assert!(!clear.overlaps_aabb(&b));
    }

    #[test]
    fn sphere_inside_box_overlaps() {
        let b = Aabb::new(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        assert!(Sphere::new(Vec3::new(0.5, 0.5, 0.5), 0.01).overlaps_aabb(&b));
    }

    #[test]
    fn spheres_overlap_by_radius_sum() {
        let a = Sphere::new(Vec3::zero(), 0.5);
        let b = Sphere::new(Vec3::new(0.9, 0.0, 0.0), 0.5);
        let c = Sphere::new(Vec3::new(1.1, 0.0, 0.0), 0.5);
        assert!(a.overlaps_sphere(&b));
        assert!(!a.overlaps_sphere(&c));
    }

    #[test]
    fn plane_normal_coordinate_picks_remaining_axis() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(GraspParallelPlane::Xy.normal_coordinate(p), 3.0);
        assert_eq!(GraspParallelPlane::Xz.normal_coordinate(p), 2.0);
        assert_eq!(GraspParallelPlane::Yz.normal_coordinate(p), 1.0);
    }
}
