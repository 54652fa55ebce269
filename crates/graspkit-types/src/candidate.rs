//! The grasp candidate entity and the geometry used to derive its waypoints.
//!
//! A [`GraspCandidate`] carries three poses in the robot model frame:
//!
//! | Pose | Derivation |
//! |---|---|
//! | `pregrasp_pose` | grasp pose backed off along the approach direction by `pregrasp_distance` |
//! | `grasp_pose` | as generated |
//! | `lift_pose` | grasp pose moved along `lift_direction` by `lift_distance` |
//!
//! The waypoints are computed once in [`GraspCandidate::new`] and never change.
//! Filter stages may only advance the status and record IK solutions.

use graspkit_geometry::{Pose, Vec3};
use serde::{Deserialize, Serialize};

use crate::{CandidateId, GraspStatus, JointState, RejectReason, StageKind};

/// Which of the three candidate waypoints a solution or failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseKind {
    Pregrasp,
    Grasp,
    Lift,
}

impl PoseKind {
    /// IK order: the arm must reach the pregrasp before the grasp, and the
    /// grasp before the lift.
    pub const SEQUENCE: [PoseKind; 3] = [PoseKind::Pregrasp, PoseKind::Grasp, PoseKind::Lift];
}

impl std::fmt::Display for PoseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoseKind::Pregrasp => write!(f, "pregrasp"),
            PoseKind::Grasp => write!(f, "grasp"),
            PoseKind::Lift => write!(f, "lift"),
        }
    }
}

/// End-effector geometry needed to derive waypoints and TCP orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspGeometry {
    /// Back-off distance from the grasp pose to the pregrasp pose (m).
    pub pregrasp_distance: f64,
    /// Distance from the grasp pose to the lift pose (m).
    pub lift_distance: f64,
    /// Lift direction in the model frame.
    pub lift_direction: Vec3,
    /// Approach axis in the end-effector frame.
    pub approach_axis: Vec3,
    /// Transform from the tool centre point to the end-effector mount.
    pub tcp_to_eef_mount: Pose,
}

impl Default for GraspGeometry {
    fn default() -> Self {
        Self {
            pregrasp_distance: 0.1,
            lift_distance: 0.1,
            lift_direction: Vec3::unit_z(),
            approach_axis: Vec3::unit_z(),
            tcp_to_eef_mount: Pose::identity(),
        }
    }
}

/// Joint solutions for the three waypoints, filled in IK order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseSolutions {
    pub pregrasp: Option<JointState>,
    pub grasp: Option<JointState>,
    pub lift: Option<JointState>,
}

impl PoseSolutions {
    pub fn get(&self, pose: PoseKind) -> Option<&JointState> {
        match pose {
            PoseKind::Pregrasp => self.pregrasp.as_ref(),
            PoseKind::Grasp => self.grasp.as_ref(),
            PoseKind::Lift => self.lift.as_ref(),
        }
    }

    pub fn set(&mut self, pose: PoseKind, solution: JointState) {
        match pose {
            PoseKind::Pregrasp => self.pregrasp = Some(solution),
            PoseKind::Grasp => self.grasp = Some(solution),
            PoseKind::Lift => self.lift = Some(solution),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pregrasp.is_some() && self.grasp.is_some() && self.lift.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraspCandidate {
    id: CandidateId,
    grasp_pose: Pose,
    pregrasp_pose: Pose,
    lift_pose: Pose,
    approach_direction: Vec3,
    gripper_opening: f64,
    score: f64,
    status: GraspStatus,
    /// Written by the IK feasibility stage.
    ik_solution: Option<PoseSolutions>,
    /// Written by the collision-aware IK stage.
    collision_free_solution: Option<PoseSolutions>,
}

impl GraspCandidate {
    /// Build a candidate and derive its pregrasp and lift waypoints.
    ///
    /// A zero approach axis or lift direction degenerates to a waypoint equal
    /// to the grasp pose.
    pub fn new(
        id: CandidateId,
        grasp_pose: Pose,
        geometry: &GraspGeometry,
        gripper_opening: f64,
        score: f64,
    ) -> Self {
        let approach_direction = grasp_pose
            .transform_vector(geometry.approach_axis)
            .normalized()
            .unwrap_or(Vec3::zero());
        let pregrasp_pose =
            grasp_pose.translated(approach_direction.scale(-geometry.pregrasp_distance));
        let lift = geometry.lift_direction.normalized().unwrap_or(Vec3::zero());
        let lift_pose = grasp_pose.translated(lift.scale(geometry.lift_distance));

        Self {
            id,
            grasp_pose,
            pregrasp_pose,
            lift_pose,
            approach_direction,
            gripper_opening,
            score,
            status: GraspStatus::Pending,
            ik_solution: None,
            collision_free_solution: None,
        }
    }

    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn grasp_pose(&self) -> Pose {
        self.grasp_pose
    }

    pub fn pregrasp_pose(&self) -> Pose {
        self.pregrasp_pose
    }

    pub fn lift_pose(&self) -> Pose {
        self.lift_pose
    }

    pub fn pose(&self, kind: PoseKind) -> Pose {
        match kind {
            PoseKind::Pregrasp => self.pregrasp_pose,
            PoseKind::Grasp => self.grasp_pose,
            PoseKind::Lift => self.lift_pose,
        }
    }

    /// Unit approach direction in the model frame (pregrasp → grasp).
    pub fn approach_direction(&self) -> Vec3 {
        self.approach_direction
    }

    pub fn gripper_opening(&self) -> f64 {
        self.gripper_opening
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn status(&self) -> GraspStatus {
        self.status
    }

    pub fn ik_solution(&self) -> Option<&PoseSolutions> {
        self.ik_solution.as_ref()
    }

    pub fn collision_free_solution(&self) -> Option<&PoseSolutions> {
        self.collision_free_solution.as_ref()
    }

    /// Record that `stage` passed.  Ignored once the status is terminal.
    pub fn mark_passed(&mut self, stage: StageKind) {
        if !self.status.is_terminal() {
            self.status = GraspStatus::PassedStage { stage };
        }
    }

    /// Record a rejection.  The first rejection wins; later calls are ignored.
    pub fn mark_rejected(&mut self, stage: StageKind, reason: RejectReason) {
        if !self.status.is_terminal() {
            self.status = GraspStatus::RejectedAt { stage, reason };
        }
    }

    /// Promote to `Valid`.  Ignored once the status is terminal.
    pub fn mark_valid(&mut self) {
        if !self.status.is_terminal() {
            self.status = GraspStatus::Valid;
        }
    }

    pub fn set_ik_solution(&mut self, solutions: PoseSolutions) {
        self.ik_solution = Some(solutions);
    }

    pub fn set_collision_free_solution(&mut self, solutions: PoseSolutions) {
        self.collision_free_solution = Some(solutions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graspkit_geometry::Quaternion;
    use std::f64::consts::PI;

    fn top_down_grasp() -> Pose {
        // Tool z axis pointing straight down.
        Pose::new(
            Vec3::new(0.5, 0.0, 0.2),
            Quaternion::from_axis_angle(Vec3::unit_x(), PI),
        )
    }

    #[test]
    fn pregrasp_is_backed_off_against_approach() {
        let c = GraspCandidate::new(CandidateId(1), top_down_grasp(), &GraspGeometry::default(), 0.04, 1.0);
        assert!(c.approach_direction().distance(Vec3::new(0.0, 0.0, -1.0)) < 1e-9);
        assert!(c.pregrasp_pose().translation.distance(Vec3::new(0.5, 0.0, 0.3)) < 1e-9);
        assert_eq!(c.pregrasp_pose().rotation, c.grasp_pose().rotation);
    }

    #[test]
    fn lift_follows_lift_direction() {
        let geometry = GraspGeometry {
            lift_direction: Vec3::new(0.0, 0.0, 2.0),
            lift_distance: 0.05,
            ..GraspGeometry::default()
        };
        let c = GraspCandidate::new(CandidateId(2), top_down_grasp(), &geometry, 0.04, 1.0);
        assert!(c.lift_pose().translation.distance(Vec3::new(0.5, 0.0, 0.25)) < 1e-9);
        assert_eq!(c.pose(PoseKind::Lift), c.lift_pose());
    }

    #[test]
    fn new_candidate_is_pending_without_solutions() {
        let c = GraspCandidate::new(CandidateId(3), top_down_grasp(), &GraspGeometry::default(), 0.0, 0.5);
        assert_eq!(c.status(), GraspStatus::Pending);
        assert!(c.ik_solution().is_none());
        assert!(c.collision_free_solution().is_none());
    }

    #[test]
    fn rejection_is_final() {
        let mut c = GraspCandidate::new(CandidateId(4), top_down_grasp(), &GraspGeometry::default(), 0.0, 0.5);
        c.mark_passed(StageKind::CuttingPlane);
        c.mark_rejected(StageKind::IkFeasibility, RejectReason::IkTimeout);
        c.mark_valid();
        c.mark_rejected(StageKind::IkWithCollision, RejectReason::LiftPoseCollision);
        assert_eq!(
            c.status(),
            GraspStatus::RejectedAt {
                stage: StageKind::IkFeasibility,
                reason: RejectReason::IkTimeout,
            }
        );
    }

    #[test]
    fn pose_solutions_fill_in_order() {
        let mut s = PoseSolutions::default();
        s.set(PoseKind::Pregrasp, JointState::zeros(6));
        s.set(PoseKind::Grasp, JointState::zeros(6));
        assert!(!s.is_complete());
        assert!(s.get(PoseKind::Lift).is_none());
        s.set(PoseKind::Lift, JointState::zeros(6));
        assert!(s.is_complete());
    }
}
