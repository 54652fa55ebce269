//! Simulated 6-DOF articulated arm with an analytic IK solver.
//!
//! The arm is a classic anthropomorphic layout: base yaw, shoulder and elbow
//! pitch, then a spherical Z-Y-Z wrist whose centre sits `d6` behind the tool
//! point.
//!
//! | Joint | Axis | Notes |
//! |---|---|---|
//! | `q1` | base z | yaw of the whole arm |
//! | `q2` | shoulder | elevation of the upper arm above the horizontal |
//! | `q3` | elbow | elevation of the forearm relative to the upper arm |
//! | `q4..q6` | wrist | Z-Y-Z Euler angles about the forearm axis |
//!
//! IK decouples position and orientation: the wrist centre fixes `q1..q3`
//! (two shoulder × two elbow branches), the remaining rotation fixes
//! `q4..q6` (two wrist branches).  Up to eight solutions are produced, ranked
//! by joint-space distance to the seed and verified by forward kinematics.
//!
//! ```rust
//! use std::time::Duration;
//! use graspkit_kinematics::sim::SimArm;
//! use graspkit_kinematics::solver::{ArmKinematics, SolverFactory};
//! use graspkit_types::JointState;
//!
//! let arm = SimArm::default();
//! let q = JointState::new(vec![0.3, 0.4, 0.5, -0.2, 0.7, 0.1]);
//! let target = arm.forward(&q);
//!
//! let mut solver = arm.create();
//! let solution = solver.solve(&target, &q, Duration::from_millis(10)).unwrap();
//! assert!(solution.distance(&q) < 1e-6);
//! ```

use std::f64::consts::{FRAC_PI_2, PI};
use std::time::{Duration, Instant};

use graspkit_geometry::{Pose, Quaternion, Sphere, Vec3};
use graspkit_types::{JointState, LinkSphere};
use serde::{Deserialize, Serialize};

use crate::solver::{ArmKinematics, IkFailure, KinematicSolver, SolverFactory};

/// Tolerance for accepting an IK branch after forward verification.
const VERIFY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimArm {
    /// Shoulder height above the base frame origin.
    pub d1: f64,
    /// Upper arm length.
    pub a2: f64,
    /// Forearm length.
    pub a3: f64,
    /// Wrist centre to tool point.
    pub d6: f64,
    pub limits: [(f64, f64); 6],
    pub base_radius: f64,
    pub upper_arm_radius: f64,
    pub forearm_radius: f64,
}

impl Default for SimArm {
    fn default() -> Self {
        Self {
            d1: 0.33,
            a2: 0.32,
            a3: 0.38,
            d6: 0.1,
            limits: [
                (-PI, PI),
                (-FRAC_PI_2, PI),
                (-2.8, 2.8),
                (-PI, PI),
                (-2.5, 2.5),
                (-PI, PI),
            ],
            base_radius: 0.07,
            upper_arm_radius: 0.05,
            forearm_radius: 0.04,
        }
    }
}

/// Joint origins along the chain for one configuration.
struct Chain {
    shoulder: Vec3,
    elbow: Vec3,
    wrist: Vec3,
    tool: Pose,
}

fn rot_y(angle: f64) -> Quaternion {
    Quaternion::from_axis_angle(Vec3::unit_y(), angle)
}

fn rot_z(angle: f64) -> Quaternion {
    Quaternion::from_axis_angle(Vec3::unit_z(), angle)
}

/// Wrap an angle into `[-π, π]`.
fn wrap(angle: f64) -> f64 {
    let mut a = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Orientation of the forearm frame rotated so its z axis runs along the
/// forearm; the wrist angles are measured from here.
fn wrist_base(q1: f64, q2: f64, q3: f64) -> Quaternion {
    rot_z(q1).mul(rot_y(-(q2 + q3))).mul(rot_y(FRAC_PI_2))
}

/// Z-Y-Z Euler decomposition of a rotation matrix, both branches.
///
/// At a wrist singularity only `q4 + q6` (or `q6 - q4`) is determined, so
/// `q4` is pinned to `seed_q4`.
fn zyz_branches(m: [[f64; 3]; 3], seed_q4: f64) -> Vec<[f64; 3]> {
    let s = m[0][2].hypot(m[1][2]);
    if s > 1e-9 {
        let b = s.atan2(m[2][2]);
        let a = m[1][2].atan2(m[0][2]);
        let c = m[2][1].atan2(-m[2][0]);
        vec![[a, b, c], [a + PI, -b, c + PI]]
    } else if m[2][2] > 0.0 {
        let sum = m[1][0].atan2(m[0][0]);
        vec![[seed_q4, 0.0, sum - seed_q4]]
    } else {
        let diff = m[1][0].atan2(-m[0][0]);
        vec![[seed_q4, PI, seed_q4 + diff]]
    }
}

impl SimArm {
    fn chain(&self, joints: &JointState) -> Chain {
        let q = |i: usize| joints.positions.get(i).copied().unwrap_or(0.0);
        let yaw = rot_z(q(0));
        let shoulder = Vec3::new(0.0, 0.0, self.d1);
        let elbow = shoulder.add(yaw.mul(rot_y(-q(1))).rotate(Vec3::unit_x()).scale(self.a2));
        let r03 = yaw.mul(rot_y(-(q(1) + q(2))));
        let wrist = elbow.add(r03.rotate(Vec3::unit_x()).scale(self.a3));
        let rotation = wrist_base(q(0), q(1), q(2))
            .mul(rot_z(q(3)))
            .mul(rot_y(q(4)))
            .mul(rot_z(q(5)))
            .normalized();
        let tip = wrist.add(rotation.rotate(Vec3::unit_z()).scale(self.d6));
        Chain {
            shoulder,
            elbow,
            wrist,
            tool: Pose::new(tip, rotation),
        }
    }

    /// All joint-limit-respecting IK solutions for `target`, unsorted.
    fn ik_branches(&self, target: &Pose, seed: &JointState, deadline: Instant) -> Result<Vec<JointState>, IkFailure> {
        let seed_at = |i: usize| seed.positions.get(i).copied().unwrap_or(0.0);
        let wrist = target
            .translation
            .sub(target.rotation.rotate(Vec3::unit_z()).scale(self.d6));
        let rho = wrist.x.hypot(wrist.y);
        let h = wrist.z - self.d1;

        // (q1, signed radial distance of the wrist in the q1 plane)
        let shoulders: Vec<(f64, f64)> = if rho < 1e-9 {
            vec![(seed_at(0), 0.0)]
        } else {
            let q1 = wrist.y.atan2(wrist.x);
            vec![(q1, rho), (wrap(q1 + PI), -rho)]
        };

        let mut out = Vec::new();
        for (q1, radial) in shoulders {
            let d = (radial * radial + h * h - self.a2 * self.a2 - self.a3 * self.a3)
                / (2.0 * self.a2 * self.a3);
            if d.abs() > 1.0 + 1e-9 {
                continue;
            }
            let elbow_angle = d.clamp(-1.0, 1.0).acos();
            for q3 in [elbow_angle, -elbow_angle] {
                if Instant::now() > deadline {
                    return Err(IkFailure::Timeout);
                }
                let q2 = h.atan2(radial)
                    - (self.a3 * q3.sin()).atan2(self.a2 + self.a3 * q3.cos());
                let residual = wrist_base(q1, q2, q3).conjugate().mul(target.rotation);
                for [q4, q5, q6] in zyz_branches(residual.to_matrix(), seed_at(3)) {
                    let candidate = JointState::new(vec![
                        wrap(q1),
                        wrap(q2),
                        wrap(q3),
                        wrap(q4),
                        wrap(q5),
                        wrap(q6),
                    ]);
                    if self.within_limits(&candidate) && self.reproduces(&candidate, target) {
                        out.push(candidate);
                    }
                }
            }
        }
        Ok(out)
    }

    fn reproduces(&self, joints: &JointState, target: &Pose) -> bool {
        let fk = self.forward(joints);
        fk.translation.distance(target.translation) < VERIFY_TOLERANCE
            && fk.rotation.angle_to(target.rotation) < VERIFY_TOLERANCE
    }
}

impl ArmKinematics for SimArm {
    fn dof(&self) -> usize {
        6
    }

    fn joint_limits(&self) -> Vec<(f64, f64)> {
        self.limits.to_vec()
    }

    fn forward(&self, joints: &JointState) -> Pose {
        self.chain(joints).tool
    }

    fn link_spheres(&self, joints: &JointState) -> Vec<LinkSphere> {
        let chain = self.chain(joints);
        let along = |from: Vec3, to: Vec3, t: f64| from.add(to.sub(from).scale(t));
        let mut spheres = vec![LinkSphere {
            link: "base_link".to_string(),
            link_index: 0,
            sphere: Sphere::new(Vec3::new(0.0, 0.0, self.d1 * 0.5), self.base_radius),
        }];
        spheres.extend([0.0, 0.33, 0.66].map(|t| LinkSphere {
            link: "upper_arm".to_string(),
            link_index: 1,
            sphere: Sphere::new(along(chain.shoulder, chain.elbow, t), self.upper_arm_radius),
        }));
        spheres.extend([0.0, 0.33, 0.66, 1.0].map(|t| LinkSphere {
            link: "forearm".to_string(),
            link_index: 2,
            sphere: Sphere::new(along(chain.elbow, chain.wrist, t), self.forearm_radius),
        }));
        spheres
    }

    fn link_count(&self) -> usize {
        3
    }

    fn default_seed(&self) -> JointState {
        // Elbow up, wrist pointing down.
        JointState::new(vec![0.0, 0.6, -1.6, 0.0, 1.0, 0.0])
    }
}

impl SolverFactory for SimArm {
    fn create(&self) -> Box<dyn KinematicSolver> {
        Box::new(SimArmSolver {
            arm: self.clone(),
            branches: Vec::with_capacity(8),
        })
    }
}

/// Analytic solver for [`SimArm`].  Reuses its branch buffer across calls.
#[derive(Debug, Clone)]
pub struct SimArmSolver {
    arm: SimArm,
    branches: Vec<JointState>,
}

impl SimArmSolver {
    fn ranked(&mut self, target: &Pose, seed: &JointState, timeout: Duration) -> Result<(), IkFailure> {
        if timeout.is_zero() {
            return Err(IkFailure::Timeout);
        }
        let deadline = Instant::now() + timeout;
        self.branches = self.arm.ik_branches(target, seed, deadline)?;
        self.branches
            .sort_by(|a, b| a.distance(seed).total_cmp(&b.distance(seed)));
        Ok(())
    }
}

impl KinematicSolver for SimArmSolver {
    fn name(&self) -> &str {
        "sim_arm_analytic"
    }

    fn solve(&mut self, target: &Pose, seed: &JointState, timeout: Duration) -> Result<JointState, IkFailure> {
        self.ranked(target, seed, timeout)?;
        self.branches.first().cloned().ok_or(IkFailure::Unreachable)
    }

    fn solve_with(
        &mut self,
        target: &Pose,
        seed: &JointState,
        timeout: Duration,
        is_valid: &mut dyn FnMut(&JointState) -> bool,
    ) -> Result<JointState, IkFailure> {
        self.ranked(target, seed, timeout)?;
        if self.branches.is_empty() {
            return Err(IkFailure::Unreachable);
        }
        self.branches
            .iter()
            .find(|q| is_valid(q))
            .cloned()
            .ok_or(IkFailure::NoValidSolution)
    }
}
