//! Point-cloud obstacle index.
//!
//! Sensed obstacle points (e.g. a depth-camera scan of the bin) are stored in
//! a recursive **Octree** so that a link sphere can be tested against
//! thousands of points without visiting each one.
//!
//! # Example
//!
//! ```rust
//! use graspkit_geometry::octree::Octree;
//! use graspkit_geometry::shapes::{Aabb, Sphere};
//! use graspkit_geometry::transform::Vec3;
//!
//! let bounds = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
//! let mut cloud = Octree::new(bounds, 8);
//! cloud.insert(Vec3::new(0.2, 0.0, 0.3));
//!
//! let hit = cloud.first_in_sphere(&Sphere::new(Vec3::new(0.2, 0.0, 0.35), 0.1));
//! assert_eq!(hit, Some(Vec3::new(0.2, 0.0, 0.3)));
//! assert!(cloud.first_in_sphere(&Sphere::new(Vec3::new(-0.5, 0.0, 0.0), 0.1)).is_none());
//! ```

use crate::shapes::{Aabb, Sphere};
use crate::transform::Vec3;

const MAX_DEPTH: usize = 8;

/// A recursive spatial index that subdivides 3-D space into eight octants.
///
/// Points are stored in the deepest node whose bounding box still contains
/// them.  Subdividing stops when either
/// - the number of points in a node is ≤ `capacity`, or
/// - `max_depth` levels have already been created.
#[derive(Debug, Clone)]
pub struct Octree {
    root: OctreeNode,
    max_depth: usize,
}

impl Octree {
    /// Create an empty octree covering `bounds`.
    ///
    /// - `capacity` – maximum points per leaf before subdivision is attempted.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity.max(1)),
            max_depth: MAX_DEPTH,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.root.bounds
    }

    /// Insert a point.  Points outside the root bounding box are ignored.
    pub fn insert(&mut self, point: Vec3) {
        self.root.insert(point, self.max_depth, 0);
    }

    pub fn len(&self) -> usize {
        self.root.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First stored point inside `sphere`, used to report a contact location.
    ///
    /// Octants whose box misses the sphere are skipped without visiting their
    /// points.
    pub fn first_in_sphere(&self, sphere: &Sphere) -> Option<Vec3> {
        let bound = sphere.bounding_box();
        let enter = |node_bounds: &Aabb| node_bounds.overlaps(&bound) && sphere.overlaps_aabb(node_bounds);
        self.root.find(&enter, &|p| sphere.contains_point(p))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct OctreeNode {
    bounds: Aabb,
    capacity: usize,
    /// Only non-empty while this node is a leaf.
    points: Vec<Vec3>,
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            points: Vec::new(),
            children: None,
        }
    }

    fn count(&self) -> usize {
        match &self.children {
            None => self.points.len(),
            Some(children) => children.iter().map(|c| c.count()).sum(),
        }
    }

    fn insert(&mut self, point: Vec3, max_depth: usize, depth: usize) {
        if !self.bounds.contains_point(point) {
            return;
        }
        match self.children.as_mut() {
            None => {
                self.points.push(point);
                if self.points.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
            }
            Some(children) => {
                if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(point)) {
                    child.insert(point, max_depth, depth + 1);
                }
            }
        }
    }

    /// Depth-first search for a point passing `hit`, descending only into
    /// nodes that pass `enter`.
    fn find(&self, enter: &dyn Fn(&Aabb) -> bool, hit: &dyn Fn(Vec3) -> bool) -> Option<Vec3> {
        if !enter(&self.bounds) {
            return None;
        }
        match &self.children {
            None => self.points.iter().copied().find(|p| hit(*p)),
            Some(children) => children.iter().find_map(|c| c.find(enter, hit)),
        }
    }

    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let (min, max) = (self.bounds.min, self.bounds.max);

        let octants = [
            Aabb::new(min, c),
            Aabb::new(Vec3::new(c.x, min.y, min.z), Vec3::new(max.x, c.y, c.z)),
            Aabb::new(Vec3::new(min.x, c.y, min.z), Vec3::new(c.x, max.y, c.z)),
            Aabb::new(Vec3::new(c.x, c.y, min.z), Vec3::new(max.x, max.y, c.z)),
            Aabb::new(Vec3::new(min.x, min.y, c.z), Vec3::new(c.x, c.y, max.z)),
            Aabb::new(Vec3::new(c.x, min.y, c.z), Vec3::new(max.x, c.y, max.z)),
            Aabb::new(Vec3::new(min.x, c.y, c.z), Vec3::new(c.x, max.y, max.z)),
            Aabb::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(octants.map(|b| OctreeNode::new(b, cap)));

        for p in std::mem::take(&mut self.points) {
            if let Some(child) = children.iter_mut().find(|ch| ch.bounds.contains_point(p)) {
                child.insert(p, max_depth, depth + 1);
            }
        }

        self.children = Some(children);
    }
}
