//! Debug marker model.
//!
//! Markers describe *what* to draw; rendering is left to whatever consumes
//! a [`MarkerSink`][crate::sink::MarkerSink].
//!
//! # Colour code
//!
//! | Colour | Meaning |
//! |---|---|
//! | [`MarkerColor::Magenta`] | rejected by a cutting plane |
//! | [`MarkerColor::Yellow`] | rejected by approach direction or orientation |
//! | [`MarkerColor::Blue`] | pregrasp pose has no IK solution |
//! | [`MarkerColor::Red`] | grasp or lift pose has no IK solution |
//! | [`MarkerColor::Cyan`] | pregrasp pose in collision |
//! | [`MarkerColor::Pink`] | grasp or lift pose in collision |
//! | [`MarkerColor::Grey`] | cancelled, timed out or otherwise filtered |
//! | [`MarkerColor::Green`] | valid grasp |
//! | [`MarkerColor::Orange`] | arm at a valid pregrasp |
//! | [`MarkerColor::White`] | arm at a valid grasp |

use chrono::{DateTime, Utc};
use graspkit_geometry::{GraspParallelPlane, Pose, Vec3};
use graspkit_types::{CandidateId, GraspStatus, LinkSphere, RejectReason};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerColor {
    Magenta,
    Yellow,
    Red,
    Pink,
    Blue,
    Cyan,
    Grey,
    Green,
    Orange,
    White,
}

impl MarkerColor {
    /// RGBA in `[0, 1]`.
    pub fn rgba(self) -> [f32; 4] {
        match self {
            MarkerColor::Magenta => [1.0, 0.0, 1.0, 1.0],
            MarkerColor::Yellow => [1.0, 1.0, 0.0, 1.0],
            MarkerColor::Red => [1.0, 0.0, 0.0, 1.0],
            MarkerColor::Pink => [1.0, 0.4, 0.7, 1.0],
            MarkerColor::Blue => [0.0, 0.0, 1.0, 1.0],
            MarkerColor::Cyan => [0.0, 1.0, 1.0, 1.0],
            MarkerColor::Grey => [0.5, 0.5, 0.5, 1.0],
            MarkerColor::Green => [0.0, 0.8, 0.0, 1.0],
            MarkerColor::Orange => [1.0, 0.5, 0.0, 1.0],
            MarkerColor::White => [1.0, 1.0, 1.0, 1.0],
        }
    }

    /// Colour for a candidate's final status.
    pub fn for_status(status: &GraspStatus) -> Self {
        match status.rejection() {
            None if status.is_valid() => MarkerColor::Green,
            None => MarkerColor::Grey,
            Some((_, reason)) => match reason {
                RejectReason::CuttingPlane => MarkerColor::Magenta,
                RejectReason::ApproachDirection | RejectReason::Orientation => MarkerColor::Yellow,
                RejectReason::PregraspUnreachable => MarkerColor::Blue,
                RejectReason::GraspUnreachable | RejectReason::LiftUnreachable => MarkerColor::Red,
                RejectReason::PregraspPoseCollision => MarkerColor::Cyan,
                RejectReason::GraspPoseCollision | RejectReason::LiftPoseCollision => MarkerColor::Pink,
                RejectReason::IkTimeout | RejectReason::Cancelled => MarkerColor::Grey,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marker {
    /// Arrow along the approach direction ending at the grasp pose.
    GraspArrow {
        candidate: CandidateId,
        pose: Pose,
        approach: Vec3,
        length: f64,
        color: MarkerColor,
    },
    /// Square patch of a cutting plane.
    CuttingPlane {
        pose: Pose,
        plane: GraspParallelPlane,
        size: f64,
        color: MarkerColor,
    },
    /// Collision spheres of the robot at a solved waypoint.
    ArmState {
        candidate: CandidateId,
        spheres: Vec<LinkSphere>,
        color: MarkerColor,
    },
    /// A contact point found while diagnosing a collision rejection.
    Contact {
        candidate: CandidateId,
        link: String,
        position: Vec3,
        color: MarkerColor,
    },
}

impl Marker {
    pub fn color(&self) -> MarkerColor {
        match self {
            Marker::GraspArrow { color, .. }
            | Marker::CuttingPlane { color, .. }
            | Marker::ArmState { color, .. }
            | Marker::Contact { color, .. } => *color,
        }
    }

    /// Namespace used by sinks to group markers, e.g. for layer toggles.
    pub fn namespace(&self) -> &'static str {
        match self {
            Marker::GraspArrow { .. } => "filtered_grasps",
            Marker::CuttingPlane { .. } => "cutting_planes",
            Marker::ArmState { .. } => "arm_solutions",
            Marker::Contact { .. } => "collision_contacts",
        }
    }
}

/// A marker stamped with the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub marker: Marker,
}

impl MarkerEvent {
    pub fn new(run_id: Uuid, marker: Marker) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graspkit_types::StageKind;

    #[test]
    fn status_colours() {
        assert_eq!(MarkerColor::for_status(&GraspStatus::Valid), MarkerColor::Green);
        assert_eq!(MarkerColor::for_status(&GraspStatus::Pending), MarkerColor::Grey);
        let collided = GraspStatus::RejectedAt {
            stage: StageKind::IkWithCollision,
            reason: RejectReason::PregraspPoseCollision,
        };
        assert_eq!(MarkerColor::for_status(&collided), MarkerColor::Cyan);
        let cut = GraspStatus::RejectedAt {
            stage: StageKind::CuttingPlane,
            reason: RejectReason::CuttingPlane,
        };
        assert_eq!(MarkerColor::for_status(&cut), MarkerColor::Magenta);
    }

    #[test]
    fn marker_event_serializes_with_type_tag() {
        let event = MarkerEvent::new(
            Uuid::new_v4(),
            Marker::CuttingPlane {
                pose: Pose::identity(),
                plane: GraspParallelPlane::Xy,
                size: 1.0,
                color: MarkerColor::Magenta,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["marker"]["type"], "cutting_plane");
        assert_eq!(json["marker"]["plane"], "xy");
        assert_eq!(event.marker.namespace(), "cutting_planes");
    }
}
