//! Filter pipeline configuration.
//!
//! [`FilterPipelineConfig`] is built once, validated against a
//! [`RobotModel`] when a [`GraspFilter`][crate::GraspFilter] is constructed,
//! and shared read-only by every worker afterwards.
//!
//! Every field has a default, so a TOML table only needs the values it
//! changes:
//!
//! ```rust
//! use graspkit_filter::config::FilterPipelineConfig;
//! use graspkit_types::StageKind;
//!
//! let cfg = FilterPipelineConfig::from_toml_str(r#"
//!     planning_group_name = "arm"
//!     end_effector_group_name = "hand"
//!     stages = ["cutting_plane", "ik_feasibility"]
//!
//!     [visualization]
//!     statistics_verbose = true
//! "#).unwrap();
//!
//! assert_eq!(cfg.stages, vec![StageKind::CuttingPlane, StageKind::IkFeasibility]);
//! assert!(cfg.visualization.statistics_verbose);
//! assert_eq!(cfg.ik.timeout_ms, 100);
//! ```

use std::collections::HashSet;
use std::f64::consts::FRAC_PI_2;
use std::time::Duration;

use graspkit_geometry::{GraspParallelPlane, Pose, Vec3};
use graspkit_kinematics::{ArmContext, RobotModel};
use graspkit_types::{GraspError, GraspGeometry, GripperType, JointState, StageKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Points within this distance of a cutting plane count as on the
/// forbidden side.
pub const PLANE_BOUNDARY_EPSILON: f64 = 1e-8;

// ────────────────────────────────────────────────────────────────────────────
// Cutting planes
// ────────────────────────────────────────────────────────────────────────────

/// Which side of a cutting plane is forbidden, measured along its normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneSide {
    Positive,
    Negative,
}

/// A half-space constraint: grasps may not reach into the forbidden side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CuttingPlane {
    /// Plane frame in the model frame.
    pub pose: Pose,
    pub plane: GraspParallelPlane,
    pub side: PlaneSide,
}

impl CuttingPlane {
    pub fn new(pose: Pose, plane: GraspParallelPlane, side: PlaneSide) -> Self {
        Self { pose, plane, side }
    }

    /// True when `point` (model frame) lies on the forbidden side or on the
    /// plane itself.
    pub fn forbids(&self, point: Vec3) -> bool {
        let local = self.pose.inverse().transform_point(point);
        let coord = self.plane.normal_coordinate(local);
        match self.side {
            PlaneSide::Negative => coord < PLANE_BOUNDARY_EPSILON,
            PlaneSide::Positive => coord > -PLANE_BOUNDARY_EPSILON,
        }
    }

    /// The five planes that keep grasps inside a shelf bin.
    ///
    /// `world_to_bin` is the bin's bottom-right-front corner; the bin extends
    /// `width` along +y and `height` along +z.  The fifth plane cuts away the
    /// back half of the product located at `bin_to_product`.
    pub fn for_bin(world_to_bin: Pose, bin_to_product: Pose, width: f64, height: f64) -> Vec<Self> {
        let top = world_to_bin.translated(Vec3::new(0.0, width, height));
        let back = world_to_bin.translated(Vec3::new(
            bin_to_product.translation.x,
            width / 2.0,
            height / 2.0,
        ));
        vec![
            Self::new(world_to_bin, GraspParallelPlane::Xy, PlaneSide::Negative),
            Self::new(world_to_bin, GraspParallelPlane::Xz, PlaneSide::Negative),
            Self::new(top, GraspParallelPlane::Xy, PlaneSide::Positive),
            Self::new(top, GraspParallelPlane::Xz, PlaneSide::Positive),
            Self::new(back, GraspParallelPlane::Yz, PlaneSide::Positive),
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage parameters
// ────────────────────────────────────────────────────────────────────────────

/// Desired approach direction in the model frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproachConstraint {
    pub axis: Vec3,
    /// Maximum angle between the grasp approach and `axis` (rad).
    pub tolerance: f64,
}

impl Default for ApproachConstraint {
    /// Approach from above, anything within 90° of straight down.
    fn default() -> Self {
        Self {
            axis: Vec3::new(0.0, 0.0, -1.0),
            tolerance: FRAC_PI_2,
        }
    }
}

/// Desired TCP orientation: the TCP z axis must stay within
/// `max_angle_offset` of the z axis of `pose`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesiredOrientation {
    pub pose: Pose,
    pub max_angle_offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkSettings {
    /// Per-pose solver timeout.
    pub timeout_ms: u64,
    /// Seed for the first pose of every candidate; the planning group
    /// default is used when absent.
    pub seed: Option<Vec<f64>>,
}

impl Default for IkSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            seed: None,
        }
    }
}

impl IkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging and debug-marker switches.  None of them change filter results,
/// except that `collision_verbose` forces a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationFlags {
    pub statistics_verbose: bool,
    pub show_filtered_grasps: bool,
    pub show_cutting_planes: bool,
    pub show_grasp_filter_collision_if_failed: bool,
    pub show_filtered_arm_solutions: bool,
    pub collision_verbose: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// FilterPipelineConfig
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPipelineConfig {
    pub gripper_type: GripperType,
    pub end_effector_group_name: String,
    pub planning_group_name: String,
    /// Stages in execution order.
    pub stages: Vec<StageKind>,
    pub cutting_planes: Vec<CuttingPlane>,
    pub approach: ApproachConstraint,
    pub desired_orientations: Vec<DesiredOrientation>,
    pub grasp_geometry: GraspGeometry,
    pub ik: IkSettings,
    /// Object being grasped; the gripper links may touch it.
    pub target_object_id: Option<String>,
    pub visualization: VisualizationFlags,
}

impl Default for FilterPipelineConfig {
    fn default() -> Self {
        Self {
            gripper_type: GripperType::default(),
            end_effector_group_name: "hand".to_string(),
            planning_group_name: "arm".to_string(),
            stages: vec![
                StageKind::CuttingPlane,
                StageKind::ApproachDirection,
                StageKind::IkFeasibility,
                StageKind::IkWithCollision,
            ],
            cutting_planes: Vec::new(),
            approach: ApproachConstraint::default(),
            desired_orientations: Vec::new(),
            grasp_geometry: GraspGeometry::default(),
            ik: IkSettings::default(),
            target_object_id: None,
            visualization: VisualizationFlags::default(),
        }
    }
}

fn config_error(msg: impl Into<String>) -> GraspError {
    GraspError::Configuration(msg.into())
}

fn check_non_negative(name: &str, value: f64) -> Result<(), GraspError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(config_error(format!("{name} must be finite and non-negative, got {value}")))
    }
}

impl FilterPipelineConfig {
    /// Parse a TOML document.  Missing fields take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, GraspError> {
        toml::from_str(raw).map_err(|e| config_error(format!("failed to parse filter config: {e}")))
    }

    /// Check the configuration against `robot` and resolve the arm.
    ///
    /// Returns the resolved [`ArmContext`] and the IK seed.
    ///
    /// # Errors
    ///
    /// Any [`GraspError`] describing the first problem found: unknown groups
    /// or frames, an empty or mis-ordered stage list, invalid thresholds, a
    /// zero timeout, or a seed of the wrong length.
    pub fn validate(&self, robot: &RobotModel) -> Result<(ArmContext, JointState), GraspError> {
        let arm = robot.resolve_arm(&self.planning_group_name, &self.end_effector_group_name)?;
        self.validate_stages()?;

        check_non_negative("approach.tolerance", self.approach.tolerance)?;
        if self.approach.axis.normalized().is_none() {
            return Err(config_error("approach.axis must be a non-zero vector"));
        }
        for (i, o) in self.desired_orientations.iter().enumerate() {
            check_non_negative(&format!("desired_orientations[{i}].max_angle_offset"), o.max_angle_offset)?;
            if !o.pose.is_finite() {
                return Err(config_error(format!("desired_orientations[{i}].pose is not finite")));
            }
        }
        for (i, plane) in self.cutting_planes.iter().enumerate() {
            if !plane.pose.is_finite() {
                return Err(config_error(format!("cutting_planes[{i}].pose is not finite")));
            }
        }
        let g = &self.grasp_geometry;
        check_non_negative("grasp_geometry.pregrasp_distance", g.pregrasp_distance)?;
        check_non_negative("grasp_geometry.lift_distance", g.lift_distance)?;
        if !g.tcp_to_eef_mount.is_finite() || !g.lift_direction.is_finite() || !g.approach_axis.is_finite() {
            return Err(config_error("grasp_geometry contains non-finite values"));
        }

        if self.ik.timeout_ms == 0 {
            return Err(config_error("ik.timeout_ms must be greater than zero"));
        }
        let seed = match &self.ik.seed {
            Some(positions) if positions.len() != arm.dof() => {
                return Err(config_error(format!(
                    "ik.seed has {} values but planning group '{}' has {} joints",
                    positions.len(),
                    arm.planning_group,
                    arm.dof()
                )));
            }
            Some(positions) => JointState::new(positions.clone()),
            None => arm.kinematics.default_seed(),
        };

        if self.stages.contains(&StageKind::CuttingPlane) && self.cutting_planes.is_empty() {
            warn!("cutting plane stage enabled without any cutting planes");
        }
        if self.stages.contains(&StageKind::DesiredOrientation) && self.desired_orientations.is_empty() {
            warn!("desired orientation stage enabled without any desired orientations");
        }

        Ok((arm, seed))
    }

    fn validate_stages(&self) -> Result<(), GraspError> {
        if self.stages.is_empty() {
            return Err(config_error("at least one filter stage must be enabled"));
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(*stage) {
                return Err(config_error(format!("stage {stage} is listed more than once")));
            }
        }
        if let Some(first_ik) = self.stages.iter().position(|s| !s.is_geometric())
            && let Some(late) = self.stages[first_ik..].iter().find(|s| s.is_geometric())
        {
            return Err(config_error(format!(
                "geometric stage {late} must run before {}",
                self.stages[first_ik]
            )));
        }
        let position = |kind| self.stages.iter().position(|s| *s == kind);
        if let Some(collision) = position(StageKind::IkWithCollision) {
            match position(StageKind::IkFeasibility) {
                Some(feasibility) if feasibility < collision => {}
                _ => {
                    return Err(config_error(format!(
                        "{} requires {} earlier in the stage list",
                        StageKind::IkWithCollision,
                        StageKind::IkFeasibility
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graspkit_kinematics::gantry::CartesianGantry;
    use graspkit_kinematics::{EndEffectorGroup, PlanningGroup};
    use std::sync::Arc;

    fn robot() -> RobotModel {
        let gantry = Arc::new(CartesianGantry::default());
        let mut model = RobotModel::new("gantry", "world");
        model.set_frame("world", "gantry_base", Pose::identity());
        model.add_planning_group(PlanningGroup {
            name: "arm".into(),
            base_frame: "gantry_base".into(),
            kinematics: gantry.clone(),
            solvers: gantry,
        });
        model.add_end_effector(EndEffectorGroup {
            name: "hand".into(),
            parent_group: "arm".into(),
            links: Vec::new(),
        });
        model
    }

    fn config_err(cfg: &FilterPipelineConfig) -> String {
        match cfg.validate(&robot()) {
            Err(GraspError::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    // ── Cutting planes ──────────────────────────────────────────────────────

    #[test]
    fn negative_side_forbids_points_below_and_on_plane() {
        let table = CuttingPlane::new(Pose::identity(), GraspParallelPlane::Xy, PlaneSide::Negative);
        assert!(table.forbids(Vec3::new(0.3, 0.1, -0.01)));
        assert!(table.forbids(Vec3::new(0.3, 0.1, 0.0)));
        assert!(!table.forbids(Vec3::new(0.3, 0.1, 0.01)));
    }

    #[test]
    fn positive_side_is_measured_in_plane_frame() {
        let wall = CuttingPlane::new(
            Pose::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            GraspParallelPlane::Yz,
            PlaneSide::Positive,
        );
        assert!(wall.forbids(Vec3::new(1.2, 0.0, 0.0)));
        assert!(wall.forbids(Vec3::new(1.0, 5.0, 0.0)));
        assert!(!wall.forbids(Vec3::new(0.9, 0.0, 0.0)));
    }

    #[test]
    fn bin_planes_bound_the_bin() {
        let corner = Pose::from_translation(Vec3::new(1.0, -0.2, 0.5));
        let product = Pose::from_translation(Vec3::new(0.15, 0.1, 0.05));
        let planes = CuttingPlane::for_bin(corner, product, 0.4, 0.3);
        assert_eq!(planes.len(), 5);

        let inside_front = Vec3::new(1.05, 0.0, 0.6);
        assert!(planes.iter().all(|p| !p.forbids(inside_front)));

        let below = Vec3::new(1.05, 0.0, 0.4);
        let above = Vec3::new(1.05, 0.0, 0.85);
        let beyond_left = Vec3::new(1.05, 0.25, 0.6);
        let behind_product = Vec3::new(1.2, 0.0, 0.6);
        for p in [below, above, beyond_left, behind_product] {
            assert!(planes.iter().any(|plane| plane.forbids(p)), "{p:?} should be cut");
        }
    }

    // ── Parsing ─────────────────────────────────────────────────────────────

    #[test]
    fn defaults_match_cost_ordered_pipeline() {
        let cfg = FilterPipelineConfig::default();
        assert_eq!(
            cfg.stages,
            vec![
                StageKind::CuttingPlane,
                StageKind::ApproachDirection,
                StageKind::IkFeasibility,
                StageKind::IkWithCollision
            ]
        );
        assert!(cfg.validate(&robot()).is_ok());
    }

    #[test]
    fn cutting_planes_parse_from_toml() {
        let cfg = FilterPipelineConfig::from_toml_str(
            r#"
            [[cutting_planes]]
            plane = "xy"
            side = "negative"
            pose = { translation = { x = 0.0, y = 0.0, z = 0.7 }, rotation = { w = 1.0, x = 0.0, y = 0.0, z = 0.0 } }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cutting_planes.len(), 1);
        assert_eq!(cfg.cutting_planes[0].side, PlaneSide::Negative);
        assert!((cfg.cutting_planes[0].pose.translation.z - 0.7).abs() < 1e-12);
    }

    #[test]
    fn malformed_toml_is_configuration_error() {
        let err = FilterPipelineConfig::from_toml_str("stages = [\"warp_drive\"]").unwrap_err();
        assert!(matches!(err, GraspError::Configuration(_)));
    }

    // ── Validation ──────────────────────────────────────────────────────────

    #[test]
    fn unknown_planning_group_is_rejected() {
        let cfg = FilterPipelineConfig {
            planning_group_name: "panda_arm".into(),
            ..FilterPipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(&robot()),
            Err(GraspError::UnknownGroup { kind: "planning", .. })
        ));
    }

    #[test]
    fn empty_stage_list_is_rejected() {
        let cfg = FilterPipelineConfig {
            stages: Vec::new(),
            ..FilterPipelineConfig::default()
        };
        assert!(config_err(&cfg).contains("at least one"));
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let cfg = FilterPipelineConfig {
            stages: vec![StageKind::CuttingPlane, StageKind::CuttingPlane],
            ..FilterPipelineConfig::default()
        };
        assert!(config_err(&cfg).contains("more than once"));
    }

    #[test]
    fn geometric_stage_after_ik_is_rejected() {
        let cfg = FilterPipelineConfig {
            stages: vec![StageKind::IkFeasibility, StageKind::DesiredOrientation],
            ..FilterPipelineConfig::default()
        };
        assert!(config_err(&cfg).contains("must run before"));
    }

    #[test]
    fn collision_stage_needs_feasibility_first() {
        let cfg = FilterPipelineConfig {
            stages: vec![StageKind::CuttingPlane, StageKind::IkWithCollision],
            ..FilterPipelineConfig::default()
        };
        assert!(config_err(&cfg).contains("requires"));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let cfg = FilterPipelineConfig {
            approach: ApproachConstraint {
                axis: Vec3::unit_x(),
                tolerance: -0.1,
            },
            ..FilterPipelineConfig::default()
        };
        assert!(config_err(&cfg).contains("approach.tolerance"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = FilterPipelineConfig {
            ik: IkSettings {
                timeout_ms: 0,
                seed: None,
            },
            ..FilterPipelineConfig::default()
        };
        assert!(config_err(&cfg).contains("timeout"));
    }

    #[test]
    fn seed_length_must_match_group() {
        let cfg = FilterPipelineConfig {
            ik: IkSettings {
                timeout_ms: 10,
                seed: Some(vec![0.0; 3]),
            },
            ..FilterPipelineConfig::default()
        };
        assert!(config_err(&cfg).contains("6 joints"));

        let ok = FilterPipelineConfig {
            ik: IkSettings {
                timeout_ms: 10,
                seed: Some(vec![0.1; 6]),
            },
            ..FilterPipelineConfig::default()
        };
        let (_, seed) = ok.validate(&robot()).unwrap();
        assert_eq!(seed.positions, vec![0.1; 6]);
    }
}
