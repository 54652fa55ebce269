//! `graspkit-scene` – obstacle world and the Collision Query Adapter.
//!
//! # Modules
//!
//! - [`scene`] – [`PlanningScene`] (live, mutable) and
//!   [`PlanningSceneSnapshot`] (frozen, shared by all filter workers).
//! - [`collision`] – [`CollisionChecker`] trait and the sphere-based
//!   [`SceneCollisionChecker`].

pub mod collision;
pub mod scene;

pub use collision::{CollisionChecker, Contact, ContactBody, SceneCollisionChecker};
pub use scene::{
    AllowedCollisionMatrix, CollisionObject, ObjectShape, PlanningScene, PlanningSceneSnapshot,
};
