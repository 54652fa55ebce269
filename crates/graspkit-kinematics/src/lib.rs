//! `graspkit-kinematics` – robot model handle and the Kinematic Solver Adapter.
//!
//! # Modules
//!
//! - [`solver`] – [`KinematicSolver`], [`SolverFactory`] and
//!   [`ArmKinematics`] traits plus the [`IkFailure`] outcome.
//! - [`model`] – [`RobotModel`] with planning and end-effector groups;
//!   resolves an [`ArmContext`] for a filter run.
//! - [`sim`] – [`SimArm`][sim::SimArm]: analytic 6-DOF articulated arm.
//! - [`gantry`] – [`CartesianGantry`][gantry::CartesianGantry]: closed-form
//!   gantry with a single IK solution.

pub mod gantry;
pub mod model;
pub mod sim;
pub mod solver;

pub use model::{ArmContext, EndEffectorGroup, EndEffectorLink, PlanningGroup, RobotModel};
pub use solver::{ArmKinematics, IkFailure, KinematicSolver, SolverFactory};
