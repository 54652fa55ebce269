//! Kinematic Solver Adapter.
//!
//! The filter only ever talks to these traits, so an analytic solver, a
//! numeric solver or a test double can be swapped in without touching the
//! pipeline.
//!
//! | Trait | Sharing | Role |
//! |---|---|---|
//! | [`ArmKinematics`] | `Send + Sync`, shared | Forward kinematics, limits and link geometry. |
//! | [`SolverFactory`] | `Send + Sync`, shared | Builds one [`KinematicSolver`] per worker. |
//! | [`KinematicSolver`] | `Send`, owned by one worker | Inverse kinematics. |
//!
//! A solver instance may keep internal scratch state between calls, which is
//! why it is `Send` but not `Sync`: the orchestrator hands each worker its own
//! instance and never shares one.

use std::time::Duration;

use graspkit_geometry::Pose;
use graspkit_types::{JointState, LinkSphere};
use thiserror::Error;

/// Why an IK request produced no usable joint state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IkFailure {
    #[error("target pose is outside the reachable workspace")]
    Unreachable,

    #[error("solver timed out")]
    Timeout,

    /// Solutions exist but the validity callback rejected all of them.
    #[error("no solution passed the validity check")]
    NoValidSolution,
}

/// Inverse kinematics for one planning group.
///
/// Targets are tool poses expressed in the group's IK base frame.
pub trait KinematicSolver: Send {
    /// Stable identifier used in logs, e.g. `"sim_arm_analytic"`.
    fn name(&self) -> &str;

    /// Solve for a joint state reaching `target`, preferring solutions close
    /// to `seed`.
    ///
    /// # Errors
    ///
    /// [`IkFailure::Unreachable`] when no solution exists within the joint
    /// limits, [`IkFailure::Timeout`] when `timeout` elapsed first.
    fn solve(
        &mut self,
        target: &Pose,
        seed: &JointState,
        timeout: Duration,
    ) -> Result<JointState, IkFailure>;

    /// Like [`solve`][Self::solve], but only returns a solution for which
    /// `is_valid` holds (e.g. collision free).
    ///
    /// The default implementation checks the single nearest solution.
    /// Solvers that can enumerate alternatives should override this and try
    /// each of them.
    fn solve_with(
        &mut self,
        target: &Pose,
        seed: &JointState,
        timeout: Duration,
        is_valid: &mut dyn FnMut(&JointState) -> bool,
    ) -> Result<JointState, IkFailure> {
        let solution = self.solve(target, seed, timeout)?;
        if is_valid(&solution) {
            Ok(solution)
        } else {
            Err(IkFailure::NoValidSolution)
        }
    }
}

/// Builds independent [`KinematicSolver`] instances, one per worker.
pub trait SolverFactory: Send + Sync {
    fn create(&self) -> Box<dyn KinematicSolver>;
}

/// Forward kinematics and collision geometry of a planning group.
pub trait ArmKinematics: Send + Sync {
    /// Number of joints in the group.
    fn dof(&self) -> usize;

    /// `(lower, upper)` limit per joint in radians or metres.
    fn joint_limits(&self) -> Vec<(f64, f64)>;

    /// Tool pose in the IK base frame.
    fn forward(&self, joints: &JointState) -> Pose;

    /// Collision spheres of the arm links in the IK base frame.
    ///
    /// Link indices start at zero and increase along the chain.
    fn link_spheres(&self, joints: &JointState) -> Vec<LinkSphere>;

    /// Number of distinct arm links reported by [`link_spheres`][Self::link_spheres].
    fn link_count(&self) -> usize;

    /// Seed used when the configuration supplies none.
    fn default_seed(&self) -> JointState {
        JointState::zeros(self.dof())
    }

    fn within_limits(&self, joints: &JointState) -> bool {
        joints.len() == self.dof()
            && joints
                .positions
                .iter()
                .zip(self.joint_limits())
                .all(|(q, (lo, hi))| *q >= lo - 1e-9 && *q <= hi + 1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solver that always returns a fixed state.
    struct FixedSolver(JointState);

    impl KinematicSolver for FixedSolver {
        fn name(&self) -> &str {
            "fixed"
        }

        fn solve(&mut self, _: &Pose, _: &JointState, _: Duration) -> Result<JointState, IkFailure> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn default_solve_with_rejects_invalid_solution() {
        let mut solver = FixedSolver(JointState::zeros(2));
        let seed = JointState::zeros(2);
        let timeout = Duration::from_millis(10);

        let ok = solver.solve_with(&Pose::identity(), &seed, timeout, &mut |_| true);
        assert_eq!(ok, Ok(JointState::zeros(2)));

        let rejected = solver.solve_with(&Pose::identity(), &seed, timeout, &mut |_| false);
        assert_eq!(rejected, Err(IkFailure::NoValidSolution));
    }

    #[test]
    fn failure_messages() {
        assert_eq!(IkFailure::Timeout.to_string(), "solver timed out");
    }
}
