//! Robot and semantic model handle.
//!
//! [`RobotModel`] is the opaque description the filter is configured
//! against: named planning groups (each backed by an [`ArmKinematics`] and a
//! [`SolverFactory`]), end-effector groups with their collision geometry, and
//! the [`FrameTree`] relating the model frame to every IK base frame.
//!
//! [`RobotModel::resolve_arm`] validates a planning/end-effector pairing and
//! returns an [`ArmContext`], which is everything a filter run needs to turn
//! joint states into placed collision geometry.

use std::collections::HashMap;
use std::sync::Arc;

use graspkit_geometry::{FrameTree, Pose, Sphere};
use graspkit_types::{GraspError, JointState, LinkSphere, RobotState};
use tracing::debug;

use crate::solver::{ArmKinematics, KinematicSolver, SolverFactory};

/// A kinematic chain the filter can solve IK for.
#[derive(Clone)]
pub struct PlanningGroup {
    pub name: String,
    /// Frame that IK targets must be expressed in.
    pub base_frame: String,
    pub kinematics: Arc<dyn ArmKinematics>,
    pub solvers: Arc<dyn SolverFactory>,
}

impl std::fmt::Debug for PlanningGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningGroup")
            .field("name", &self.name)
            .field("base_frame", &self.base_frame)
            .field("dof", &self.kinematics.dof())
            .finish()
    }
}

/// A collision sphere of an end-effector link, in the tool frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EndEffectorLink {
    pub name: String,
    pub sphere: Sphere,
}

/// Gripper mounted at the tip of a planning group.
#[derive(Debug, Clone)]
pub struct EndEffectorGroup {
    pub name: String,
    /// Planning group the gripper is attached to.
    pub parent_group: String,
    pub links: Vec<EndEffectorLink>,
}

#[derive(Debug, Clone)]
pub struct RobotModel {
    pub name: String,
    /// Frame in which grasp candidates and scene geometry are expressed.
    pub model_frame: String,
    pub frames: FrameTree,
    planning_groups: HashMap<String, PlanningGroup>,
    end_effectors: HashMap<String, EndEffectorGroup>,
}

impl RobotModel {
    pub fn new(name: impl Into<String>, model_frame: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_frame: model_frame.into(),
            frames: FrameTree::new(),
            planning_groups: HashMap::new(),
            end_effectors: HashMap::new(),
        }
    }

    /// Register `T_parent_child`.
    pub fn set_frame(&mut self, parent: &str, child: &str, pose: Pose) {
        self.frames.set_transform(parent, child, pose);
    }

    /// Register a planning group.  A group with the same name is replaced.
    pub fn add_planning_group(&mut self, group: PlanningGroup) {
        self.planning_groups.insert(group.name.clone(), group);
    }

    /// Register an end-effector group.  A group with the same name is replaced.
    pub fn add_end_effector(&mut self, group: EndEffectorGroup) {
        self.end_effectors.insert(group.name.clone(), group);
    }

    pub fn planning_group(&self, name: &str) -> Option<&PlanningGroup> {
        self.planning_groups.get(name)
    }

    pub fn end_effector(&self, name: &str) -> Option<&EndEffectorGroup> {
        self.end_effectors.get(name)
    }

    /// Validate a planning/end-effector pairing and resolve the IK base frame.
    ///
    /// # Errors
    ///
    /// - [`GraspError::UnknownGroup`] when either group is not in the model.
    /// - [`GraspError::Configuration`] when the end effector is attached to a
    ///   different planning group.
    /// - [`GraspError::UnknownFrame`] when the IK base frame cannot be reached
    ///   from the model frame.
    pub fn resolve_arm(&self, planning_group: &str, end_effector: &str) -> Result<ArmContext, GraspError> {
        let group = self
            .planning_group(planning_group)
            .ok_or_else(|| GraspError::UnknownGroup {
                kind: "planning",
                name: planning_group.to_string(),
            })?;
        let ee = self
            .end_effector(end_effector)
            .ok_or_else(|| GraspError::UnknownGroup {
                kind: "end-effector",
                name: end_effector.to_string(),
            })?;
        if ee.parent_group != group.name {
            return Err(GraspError::Configuration(format!(
                "end-effector group '{}' is attached to '{}', not '{}'",
                ee.name, ee.parent_group, group.name
            )));
        }
        let base_pose = self
            .frames
            .lookup(&self.model_frame, &group.base_frame)
            .ok_or_else(|| GraspError::UnknownFrame(group.base_frame.clone()))?;

        debug!(
            robot = %self.name,
            planning_group,
            end_effector,
            base_frame = %group.base_frame,
            "resolved arm context"
        );

        Ok(ArmContext {
            planning_group: group.name.clone(),
            end_effector: ee.name.clone(),
            base_frame: group.base_frame.clone(),
            model_to_base: base_pose,
            kinematics: group.kinematics.clone(),
            solvers: group.solvers.clone(),
            ee_links: ee.links.clone(),
        })
    }
}

/// A resolved planning group plus its gripper, ready for a filter run.
#[derive(Clone)]
pub struct ArmContext {
    pub planning_group: String,
    pub end_effector: String,
    pub base_frame: String,
    /// `T_model_base`.
    pub model_to_base: Pose,
    pub kinematics: Arc<dyn ArmKinematics>,
    solvers: Arc<dyn SolverFactory>,
    ee_links: Vec<EndEffectorLink>,
}

impl std::fmt::Debug for ArmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmContext")
            .field("planning_group", &self.planning_group)
            .field("end_effector", &self.end_effector)
            .field("base_frame", &self.base_frame)
            .field("model_to_base", &self.model_to_base)
            .finish()
    }
}

impl ArmContext {
    pub fn dof(&self) -> usize {
        self.kinematics.dof()
    }

    pub fn new_solver(&self) -> Box<dyn KinematicSolver> {
        self.solvers.create()
    }

    /// Names of every end-effector link, e.g. for allowed-collision entries.
    pub fn ee_link_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for link in &self.ee_links {
            if !names.contains(&link.name) {
                names.push(link.name.clone());
            }
        }
        names
    }

    /// Express a model-frame pose in the IK base frame.
    pub fn to_base(&self, pose: Pose) -> Pose {
        self.model_to_base.inverse().compose(pose)
    }

    /// Place the arm and gripper geometry for `joints` in the model frame.
    pub fn robot_state(&self, joints: &JointState) -> RobotState {
        let tool_in_base = self.kinematics.forward(joints);
        let tool_pose = self.model_to_base.compose(tool_in_base);

        let mut spheres: Vec<LinkSphere> = self
            .kinematics
            .link_spheres(joints)
            .into_iter()
            .map(|mut s| {
                s.sphere.centre = self.model_to_base.transform_point(s.sphere.centre);
                s
            })
            .collect();

        let ee_index = self.kinematics.link_count();
        spheres.extend(self.ee_links.iter().map(|link| LinkSphere {
            link: link.name.clone(),
            link_index: ee_index,
            sphere: Sphere::new(tool_pose.transform_point(link.sphere.centre), link.sphere.radius),
        }));

        RobotState {
            joints: joints.clone(),
            tool_pose,
            spheres,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gantry::CartesianGantry;
    use graspkit_geometry::Vec3;

    fn gantry_model() -> RobotModel {
        let gantry = Arc::new(CartesianGantry::default());
        let mut model = RobotModel::new("gantry", "world");
        model.set_frame("world", "gantry_base", Pose::from_translation(Vec3::new(0.0, 0.0, 0.5)));
        model.add_planning_group(PlanningGroup {
            name: "arm".into(),
            base_frame: "gantry_base".into(),
            kinematics: gantry.clone(),
            solvers: gantry,
        });
        model.add_end_effector(EndEffectorGroup {
            name: "hand".into(),
            parent_group: "arm".into(),
            links: vec![EndEffectorLink {
                name: "palm".into(),
                sphere: Sphere::new(Vec3::new(0.0, 0.0, -0.05), 0.02),
            }],
        });
        model
    }

    #[test]
    fn resolve_arm_rejects_unknown_planning_group() {
        let err = gantry_model().resolve_arm("panda_arm", "hand").unwrap_err();
        assert_eq!(
            err,
            GraspError::UnknownGroup {
                kind: "planning",
                name: "panda_arm".into()
            }
        );
    }

    #[test]
    fn resolve_arm_rejects_unknown_end_effector() {
        let err = gantry_model().resolve_arm("arm", "suction_cup").unwrap_err();
        assert!(matches!(err, GraspError::UnknownGroup { kind: "end-effector", .. }));
    }

    #[test]
    fn resolve_arm_rejects_detached_end_effector() {
        let mut model = gantry_model();
        model.add_end_effector(EndEffectorGroup {
            name: "other".into(),
            parent_group: "left_arm".into(),
            links: Vec::new(),
        });
        assert!(matches!(
            model.resolve_arm("arm", "other"),
            Err(GraspError::Configuration(_))
        ));
    }

    #[test]
    fn resolve_arm_requires_reachable_base_frame() {
        let mut model = gantry_model();
        model.frames = FrameTree::new();
        assert_eq!(
            model.resolve_arm("arm", "hand").unwrap_err(),
            GraspError::UnknownFrame("gantry_base".into())
        );
    }

    #[test]
    fn robot_state_places_geometry_in_model_frame() {
        let arm = gantry_model().resolve_arm("arm", "hand").unwrap();
        let joints = JointState::new(vec![0.1, 0.2, 0.3, 0.0, 0.0, 0.0]);
        let state = arm.robot_state(&joints);

        assert!(state.tool_pose.translation.distance(Vec3::new(0.1, 0.2, 0.8)) < 1e-9);
        let palm = state.spheres.iter().find(|s| s.link == "palm").unwrap();
        assert!(palm.sphere.centre.distance(Vec3::new(0.1, 0.2, 0.75)) < 1e-9);
        assert_eq!(palm.link_index, arm.kinematics.link_count());
        assert_eq!(arm.ee_link_names(), vec!["palm".to_string()]);
    }

    #[test]
    fn to_base_removes_base_offset() {
        let arm = gantry_model().resolve_arm("arm", "hand").unwrap();
        let p = arm.to_base(Pose::from_translation(Vec3::new(0.0, 0.0, 0.5)));
        assert!(p.translation.norm() < 1e-9);
    }
}
