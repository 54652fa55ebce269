//! `graspkit-geometry` – spatial primitives shared by every grasp-filter crate.
//!
//! # Modules
//!
//! - [`transform`] – [`Pose`][transform::Pose] math and the
//!   [`FrameTree`][transform::FrameTree] that relates named frames.
//! - [`shapes`] – [`Aabb`][shapes::Aabb], [`Sphere`][shapes::Sphere] and the
//!   [`GraspParallelPlane`][shapes::GraspParallelPlane] selector used by
//!   cutting planes.
//! - [`octree`] – [`Octree`][octree::Octree]: point-cloud obstacle index.

pub mod octree;
pub mod shapes;
pub mod transform;

pub use shapes::{Aabb, GraspParallelPlane, Sphere};
pub use transform::{FrameTree, Pose, Quaternion, Vec3};
