use graspkit_geometry::{Pose, Sphere};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod candidate;

pub use candidate::{GraspCandidate, GraspGeometry, PoseKind, PoseSolutions};

/// Stable identifier assigned to a candidate by its generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub u64);

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of end effector the candidates were generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripperType {
    #[default]
    TwoFinger,
    Suction,
}

impl std::fmt::Display for GripperType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GripperType::TwoFinger => write!(f, "two_finger"),
            GripperType::Suction => write!(f, "suction"),
        }
    }
}

/// The closed set of filter stages a pipeline can be assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    CuttingPlane,
    ApproachDirection,
    DesiredOrientation,
    IkFeasibility,
    IkWithCollision,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::CuttingPlane,
        StageKind::ApproachDirection,
        StageKind::DesiredOrientation,
        StageKind::IkFeasibility,
        StageKind::IkWithCollision,
    ];

    /// Human-readable stage name used in logs and statistics.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::CuttingPlane => "CuttingPlaneFilter",
            StageKind::ApproachDirection => "ApproachDirectionFilter",
            StageKind::DesiredOrientation => "DesiredOrientationFilter",
            StageKind::IkFeasibility => "IKFeasibilityFilter",
            StageKind::IkWithCollision => "IKWithCollisionFilter",
        }
    }

    /// Geometric stages never call the solver or the collision checker.
    pub fn is_geometric(self) -> bool {
        matches!(
            self,
            StageKind::CuttingPlane | StageKind::ApproachDirection | StageKind::DesiredOrientation
        )
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    CuttingPlane,
    ApproachDirection,
    Orientation,
    PregraspUnreachable,
    GraspUnreachable,
    LiftUnreachable,
    IkTimeout,
    PregraspPoseCollision,
    GraspPoseCollision,
    LiftPoseCollision,
    Cancelled,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::CuttingPlane => "cutting_plane",
            RejectReason::ApproachDirection => "approach_direction",
            RejectReason::Orientation => "orientation",
            RejectReason::PregraspUnreachable => "pregrasp_unreachable",
            RejectReason::GraspUnreachable => "grasp_unreachable",
            RejectReason::LiftUnreachable => "lift_unreachable",
            RejectReason::IkTimeout => "ik_timeout",
            RejectReason::PregraspPoseCollision => "pregrasp_pose_collision",
            RejectReason::GraspPoseCollision => "grasp_pose_collision",
            RejectReason::LiftPoseCollision => "lift_pose_collision",
            RejectReason::Cancelled => "cancelled",
        }
    }

    pub fn unreachable(pose: PoseKind) -> Self {
        match pose {
            PoseKind::Pregrasp => RejectReason::PregraspUnreachable,
            PoseKind::Grasp => RejectReason::GraspUnreachable,
            PoseKind::Lift => RejectReason::LiftUnreachable,
        }
    }

    pub fn collision(pose: PoseKind) -> Self {
        match pose {
            PoseKind::Pregrasp => RejectReason::PregraspPoseCollision,
            PoseKind::Grasp => RejectReason::GraspPoseCollision,
            PoseKind::Lift => RejectReason::LiftPoseCollision,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a candidate through a pipeline run.
///
/// Transitions only move forward: `Pending → PassedStage(..)* → Valid` or
/// `→ RejectedAt`.  Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GraspStatus {
    #[default]
    Pending,
    PassedStage { stage: StageKind },
    RejectedAt { stage: StageKind, reason: RejectReason },
    Valid,
}

impl GraspStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GraspStatus::Valid | GraspStatus::RejectedAt { .. })
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, GraspStatus::Valid)
    }

    pub fn rejection(&self) -> Option<(StageKind, RejectReason)> {
        match *self {
            GraspStatus::RejectedAt { stage, reason } => Some((stage, reason)),
            _ => None,
        }
    }
}

/// Joint positions for one planning group, in the group's joint order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    pub positions: Vec<f64>,
}

impl JointState {
    pub fn new(positions: Vec<f64>) -> Self {
        Self { positions }
    }

    pub fn zeros(dof: usize) -> Self {
        Self::new(vec![0.0; dof])
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Euclidean distance in joint space; mismatched lengths compare the
    /// common prefix.
    pub fn distance(&self, other: &JointState) -> f64 {
        self.positions
            .iter()
            .zip(&other.positions)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

/// One collision sphere of a robot link, placed in a robot frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSphere {
    pub link: String,
    /// Position of the link along the kinematic chain; links whose indices
    /// differ by at most one are adjacent and never self-collide.
    pub link_index: usize,
    pub sphere: Sphere,
}

/// A fully evaluated robot configuration: joints, tool pose and link geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub joints: JointState,
    pub tool_pose: Pose,
    pub spheres: Vec<LinkSphere>,
}

/// Run-level errors.  Any of these aborts a run before a candidate is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraspError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Unknown {kind} group '{name}'")]
    UnknownGroup { kind: &'static str, name: String },

    #[error("Unknown frame '{0}'")]
    UnknownFrame(String),

    #[error("Unknown collision object '{0}'")]
    UnknownObject(String),

    #[error("Worker Pool Error: {0}")]
    WorkerPool(String),
}
