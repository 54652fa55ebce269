//! Shared test scene: a gantry with a palm sphere, a table and a small
//! obstacle that only the lift pose of candidate #3 reaches.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::sync::Arc;

use graspkit_geometry::{GraspParallelPlane, Pose, Quaternion, Sphere, Vec3};
use graspkit_kinematics::gantry::CartesianGantry;
use graspkit_kinematics::{EndEffectorGroup, EndEffectorLink, PlanningGroup, RobotModel};
use graspkit_scene::{CollisionObject, PlanningScene, PlanningSceneSnapshot};
use graspkit_types::{CandidateId, GraspCandidate, GraspGeometry};

use crate::config::{ApproachConstraint, CuttingPlane, FilterPipelineConfig, PlaneSide};

pub fn gantry_robot() -> RobotModel {
    gantry_robot_at(Pose::identity())
}

/// Same robot with `gantry_base` placed at `base` in the world frame.
pub fn gantry_robot_at(base: Pose) -> RobotModel {
    let gantry = Arc::new(CartesianGantry::default());
    let mut model = RobotModel::new("gantry", "world");
    model.set_frame("world", "gantry_base", base);
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

/// Grasp approaching along +x.
pub fn side_grasp(id: u64, at: Vec3) -> GraspCandidate {
    let pose = Pose::new(at, Quaternion::from_axis_angle(Vec3::unit_y(), FRAC_PI_2));
    GraspCandidate::new(CandidateId(id), pose, &GraspGeometry::default(), 0.04, 1.0)
}

/// #1 below the table, #2 clear, #3 lifts into `shelf_lip`.
pub fn three_candidates() -> Vec<GraspCandidate> {
    vec![
        side_grasp(1, Vec3::new(0.5, 0.0, -0.05)),
        side_grasp(2, Vec3::new(0.5, -0.3, 0.2)),
        side_grasp(3, Vec3::new(0.5, 0.3, 0.2)),
    ]
}

pub fn example_scene() -> PlanningSceneSnapshot {
    let mut scene = PlanningScene::new("world");
    scene.add_object(CollisionObject::cuboid(
        "table",
        Pose::from_translation(Vec3::new(0.5, 0.0, -0.05)),
        Vec3::new(1.0, 1.0, 0.1),
    ));
    scene.add_object(CollisionObject::cuboid(
        "shelf_lip",
        Pose::from_translation(Vec3::new(0.45, 0.3, 0.32)),
        Vec3::new(0.02, 0.02, 0.02),
    ));
    scene.snapshot()
}

pub fn example_config() -> FilterPipelineConfig {
    FilterPipelineConfig {
        cutting_planes: vec![CuttingPlane::new(
            Pose::identity(),
            GraspParallelPlane::Xy,
            PlaneSide::Negative,
        )],
        approach: ApproachConstraint {
            axis: Vec3::unit_x(),
            tolerance: FRAC_PI_4,
        },
        ..FilterPipelineConfig::default()
    }
}
