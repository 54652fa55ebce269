//! Filter stages.
//!
//! A pipeline is an ordered list of [`FilterStage`]s built from
//! [`FilterPipelineConfig::stages`].  Each stage looks at one candidate and
//! either lets it through or returns the [`RejectReason`] that stops it.
//!
//! | Stage | Cost | Rejects with |
//! |---|---|---|
//! | [`FilterStage::CuttingPlane`] | geometric | `cutting_plane` |
//! | [`FilterStage::ApproachDirection`] | geometric | `approach_direction` |
//! | [`FilterStage::DesiredOrientation`] | geometric | `orientation` |
//! | [`FilterStage::IkFeasibility`] | 1–3 IK calls | `<pose>_unreachable`, `ik_timeout` |
//! | [`FilterStage::IkWithCollision`] | 1–3 IK calls plus collision checks | `<pose>_pose_collision`, `ik_timeout` |
//!
//! Stages only ever write to the candidate they are given.  Everything else
//! they touch (scene, arm, collision checker) is shared read-only; the solver
//! belongs to the calling worker.

use std::time::Duration;

use graspkit_geometry::{Pose, Vec3};
use graspkit_kinematics::{ArmContext, IkFailure, KinematicSolver};
use graspkit_scene::{CollisionChecker, PlanningSceneSnapshot};
use graspkit_types::{GraspCandidate, JointState, PoseKind, PoseSolutions, RejectReason, StageKind};
use tracing::debug;

use crate::config::{CuttingPlane, DesiredOrientation, FilterPipelineConfig};

/// Contacts logged per failed pose when `collision_verbose` is set.
const VERBOSE_CONTACTS: usize = 8;

/// Everything a stage may read, plus the worker's own solver.
pub struct StageContext<'a> {
    pub arm: &'a ArmContext,
    pub scene: &'a PlanningSceneSnapshot,
    pub collision: &'a dyn CollisionChecker,
    pub solver: &'a mut dyn KinematicSolver,
    /// Seed for the first pose of every candidate.
    pub seed: &'a JointState,
    pub timeout: Duration,
    pub collision_verbose: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// FilterStage
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FilterStage {
    CuttingPlane {
        planes: Vec<CuttingPlane>,
    },
    ApproachDirection {
        axis: Vec3,
        tolerance: f64,
    },
    DesiredOrientation {
        orientations: Vec<DesiredOrientation>,
        tcp_to_eef_mount: Pose,
    },
    IkFeasibility,
    IkWithCollision,
}

impl FilterStage {
    /// Build the stage for `kind` from the parameters in `config`.
    pub fn from_config(kind: StageKind, config: &FilterPipelineConfig) -> Self {
        match kind {
            StageKind::CuttingPlane => FilterStage::CuttingPlane {
                planes: config.cutting_planes.clone(),
            },
            StageKind::ApproachDirection => FilterStage::ApproachDirection {
                // Validation guarantees a non-zero axis.
                axis: config.approach.axis.normalized().unwrap_or(config.approach.axis),
                tolerance: config.approach.tolerance,
            },
            StageKind::DesiredOrientation => FilterStage::DesiredOrientation {
                orientations: config.desired_orientations.clone(),
                tcp_to_eef_mount: config.grasp_geometry.tcp_to_eef_mount,
            },
            StageKind::IkFeasibility => FilterStage::IkFeasibility,
            StageKind::IkWithCollision => FilterStage::IkWithCollision,
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            FilterStage::CuttingPlane { .. } => StageKind::CuttingPlane,
            FilterStage::ApproachDirection { .. } => StageKind::ApproachDirection,
            FilterStage::DesiredOrientation { .. } => StageKind::DesiredOrientation,
            FilterStage::IkFeasibility => StageKind::IkFeasibility,
            FilterStage::IkWithCollision => StageKind::IkWithCollision,
        }
    }

    /// Run the stage on `candidate`.
    ///
    /// Geometric stages ignore `ctx` apart from reading it.  IK stages record
    /// the solutions they found on the candidate, even when a later pose
    /// fails.
    pub fn evaluate(&self, candidate: &mut GraspCandidate, ctx: &mut StageContext<'_>) -> Result<(), RejectReason> {
        match self {
            FilterStage::CuttingPlane { planes } => check_cutting_planes(candidate, planes),
            FilterStage::ApproachDirection { axis, tolerance } => check_approach(candidate, *axis, *tolerance),
            FilterStage::DesiredOrientation {
                orientations,
                tcp_to_eef_mount,
            } => check_orientation(candidate, orientations, *tcp_to_eef_mount),
            FilterStage::IkFeasibility => solve_feasibility(candidate, ctx),
            FilterStage::IkWithCollision => solve_collision_free(candidate, ctx),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Geometric stages
// ────────────────────────────────────────────────────────────────────────────

/// The grasp may not sit in a forbidden half-space, and neither may the
/// pregrasp the gripper approaches from.
pub fn check_cutting_planes(candidate: &GraspCandidate, planes: &[CuttingPlane]) -> Result<(), RejectReason> {
    let points = [
        candidate.grasp_pose().translation,
        candidate.pregrasp_pose().translation,
    ];
    for (i, plane) in planes.iter().enumerate() {
        if points.iter().any(|p| plane.forbids(*p)) {
            debug!(
                target: "graspkit::superdebug",
                candidate = %candidate.id(),
                plane = i,
                kind = %plane.plane,
                "grasp crosses cutting plane"
            );
            return Err(RejectReason::CuttingPlane);
        }
    }
    Ok(())
}

pub fn check_approach(candidate: &GraspCandidate, axis: Vec3, tolerance: f64) -> Result<(), RejectReason> {
    let angle = candidate.approach_direction().angle_to(axis);
    if angle > tolerance {
        debug!(
            target: "graspkit::superdebug",
            candidate = %candidate.id(),
            angle,
            tolerance,
            "approach direction out of tolerance"
        );
        return Err(RejectReason::ApproachDirection);
    }
    Ok(())
}

/// Compare the TCP z axis against every desired orientation.  All of them
/// must hold.
pub fn check_orientation(
    candidate: &GraspCandidate,
    orientations: &[DesiredOrientation],
    tcp_to_eef_mount: Pose,
) -> Result<(), RejectReason> {
    let tcp = candidate.grasp_pose().compose(tcp_to_eef_mount.inverse());
    let tcp_z = tcp.z_axis();
    for desired in orientations {
        let angle = tcp_z.angle_to(desired.pose.z_axis());
        if angle > desired.max_angle_offset {
            debug!(
                target: "graspkit::superdebug",
                candidate = %candidate.id(),
                angle,
                max = desired.max_angle_offset,
                "tcp orientation out of tolerance"
            );
            return Err(RejectReason::Orientation);
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// IK stages
// ────────────────────────────────────────────────────────────────────────────

fn solve_feasibility(candidate: &mut GraspCandidate, ctx: &mut StageContext<'_>) -> Result<(), RejectReason> {
    let mut solutions = PoseSolutions::default();
    let mut seed = ctx.seed.clone();

    for pose in PoseKind::SEQUENCE {
        let target = ctx.arm.to_base(candidate.pose(pose));
        match ctx.solver.solve(&target, &seed, ctx.timeout) {
            Ok(q) => {
                seed = q.clone();
                solutions.set(pose, q);
            }
            Err(failure) => {
                debug!(
                    target: "graspkit::superdebug",
                    candidate = %candidate.id(),
                    %pose,
                    solver = ctx.solver.name(),
                    %failure,
                    "ik failed"
                );
                candidate.set_ik_solution(solutions);
                return Err(match failure {
                    IkFailure::Timeout => RejectReason::IkTimeout,
                    IkFailure::Unreachable | IkFailure::NoValidSolution => RejectReason::unreachable(pose),
                });
            }
        }
    }

    candidate.set_ik_solution(solutions);
    Ok(())
}

fn solve_collision_free(candidate: &mut GraspCandidate, ctx: &mut StageContext<'_>) -> Result<(), RejectReason> {
    let arm = ctx.arm;
    let scene = ctx.scene;
    let collision = ctx.collision;
    let mut is_valid = |q: &JointState| !collision.is_in_collision(&arm.robot_state(q), scene);

    let mut solutions = PoseSolutions::default();
    let mut chained = ctx.seed.clone();

    for pose in PoseKind::SEQUENCE {
        // The collision-free branch is usually the one IK feasibility found.
        let seed = candidate
            .ik_solution()
            .and_then(|s| s.get(pose))
            .cloned()
            .unwrap_or_else(|| chained.clone());
        let target = arm.to_base(candidate.pose(pose));

        match ctx.solver.solve_with(&target, &seed, ctx.timeout, &mut is_valid) {
            Ok(q) => {
                chained = q.clone();
                solutions.set(pose, q);
            }
            Err(IkFailure::Timeout) => {
                candidate.set_collision_free_solution(solutions);
                return Err(RejectReason::IkTimeout);
            }
            Err(failure) => {
                debug!(
                    target: "graspkit::superdebug",
                    candidate = %candidate.id(),
                    %pose,
                    %failure,
                    "no collision-free ik solution"
                );
                if ctx.collision_verbose {
                    let state = arm.robot_state(&seed);
                    for contact in collision.contacts(&state, scene, VERBOSE_CONTACTS) {
                        debug!(
                            target: "graspkit::superdebug",
                            candidate = %candidate.id(),
                            %pose,
                            link = %contact.link,
                            body = %contact.body,
                            x = contact.position.x,
                            y = contact.position.y,
                            z = contact.position.z,
                            "contact"
                        );
                    }
                }
                candidate.set_collision_free_solution(solutions);
                return Err(RejectReason::collision(pose));
            }
        }
    }

    candidate.set_collision_free_solution(solutions);
    Ok(())
}
