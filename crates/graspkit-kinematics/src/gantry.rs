//! Cartesian gantry with a spherical wrist.
//!
//! Joints are `[x, y, z, roll, pitch, yaw]`, so forward and inverse
//! kinematics are a direct mapping with a single solution.  Useful for
//! deterministic pipeline runs where only the workspace box decides
//! reachability.

use std::f64::consts::PI;
use std::time::Duration;

use graspkit_geometry::{Pose, Quaternion, Sphere, Vec3};
use graspkit_types::{JointState, LinkSphere};
use serde::{Deserialize, Serialize};

use crate::solver::{ArmKinematics, IkFailure, KinematicSolver, SolverFactory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartesianGantry {
    /// Lower corner of the reachable tool positions in the base frame.
    pub workspace_min: Vec3,
    /// Upper corner of the reachable tool positions in the base frame.
    pub workspace_max: Vec3,
    /// Height of the carriage sphere above the tool point.
    pub carriage_offset: f64,
    pub carriage_radius: f64,
}

impl Default for CartesianGantry {
    fn default() -> Self {
        Self {
            workspace_min: Vec3::new(-1.0, -1.0, -0.5),
            workspace_max: Vec3::new(1.0, 1.0, 1.0),
            carriage_offset: 0.5,
            carriage_radius: 0.05,
        }
    }
}

impl CartesianGantry {
    fn reachable(&self, p: Vec3) -> bool {
        let (lo, hi) = (self.workspace_min, self.workspace_max);
        p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y && p.z >= lo.z && p.z <= hi.z
    }
}

impl ArmKinematics for CartesianGantry {
    fn dof(&self) -> usize {
        6
    }

    fn joint_limits(&self) -> Vec<(f64, f64)> {
        let (lo, hi) = (self.workspace_min, self.workspace_max);
        vec![
            (lo.x, hi.x),
            (lo.y, hi.y),
            (lo.z, hi.z),
            (-PI, PI),
            (-PI / 2.0, PI / 2.0),
            (-PI, PI),
        ]
    }

    fn forward(&self, joints: &JointState) -> Pose {
        let q = |i: usize| joints.positions.get(i).copied().unwrap_or(0.0);
        Pose::new(Vec3::new(q(0), q(1), q(2)), Quaternion::from_rpy(q(3), q(4), q(5)))
    }

    fn link_spheres(&self, joints: &JointState) -> Vec<LinkSphere> {
        let tool = self.forward(joints).translation;
        vec![LinkSphere {
            link: "carriage".to_string(),
            link_index: 0,
            sphere: Sphere::new(
                tool.add(Vec3::new(0.0, 0.0, self.carriage_offset)),
                self.carriage_radius,
            ),
        }]
    }

    fn link_count(&self) -> usize {
        1
    }
}

impl SolverFactory for CartesianGantry {
    fn create(&self) -> Box<dyn KinematicSolver> {
        Box::new(GantrySolver {
            gantry: self.clone(),
        })
    }
}

/// Closed-form solver for [`CartesianGantry`].
#[derive(Debug, Clone)]
pub struct GantrySolver {
    gantry: CartesianGantry,
}

impl KinematicSolver for GantrySolver {
    fn name(&self) -> &str {
        "gantry_closed_form"
    }

    fn solve(
        &mut self,
        target: &Pose,
        _seed: &JointState,
        timeout: Duration,
    ) -> Result<JointState, IkFailure> {
        if timeout.is_zero() {
            return Err(IkFailure::Timeout);
        }
        if !self.gantry.reachable(target.translation) {
            return Err(IkFailure::Unreachable);
        }
        let (roll, pitch, yaw) = target.rotation.to_rpy();
        let t = target.translation;
        Ok(JointState::new(vec![t.x, t.y, t.z, roll, pitch, yaw]))
    }
}
