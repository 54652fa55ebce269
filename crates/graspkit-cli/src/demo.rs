//! Bundled filter demo: a simulated arm picking a small cube off a table.
//!
//! Each trial jitters the cube a few millimetres, generates one candidate per
//! cube face and wrist spin, and runs the full filter over them.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::sync::Arc;

use graspkit_filter::{CancelToken, CuttingPlane, FilterOutcome, FilterPipelineConfig, GraspFilter, PlaneSide, Reporter};
use graspkit_geometry::{GraspParallelPlane, Pose, Quaternion, Sphere, Vec3};
use graspkit_kinematics::sim::SimArm;
use graspkit_kinematics::{EndEffectorGroup, EndEffectorLink, PlanningGroup, RobotModel};
use graspkit_scene::{CollisionObject, PlanningScene, PlanningSceneSnapshot, SceneCollisionChecker};
use graspkit_types::{CandidateId, GraspCandidate, GraspGeometry};
use graspkit_viz::JsonLinesSink;
use tracing::{debug, info};

use crate::config::Config;

pub const TARGET_OBJECT_ID: &str = "cuboid";
const TABLE_THICKNESS: f64 = 0.1;
const TABLE_EXTENT: f64 = 0.4;
const MAX_JITTER: f64 = 0.01;
const GRIPPER_OPENING: f64 = 0.06;
const WRIST_SPINS: [f64; 2] = [0.0, FRAC_PI_2];

/// Result of one demo trial.
#[derive(Debug)]
pub struct TrialReport {
    pub trial: usize,
    pub object_centre: Vec3,
    pub outcome: FilterOutcome,
}

/// Six-axis arm on `base_link` with a two-finger hand named `hand`.
pub fn demo_robot() -> RobotModel {
    let arm = Arc::new(SimArm::default());
    let mut model = RobotModel::new("sim_arm", "world");
    model.set_frame("world", "base_link", Pose::identity());
    model.add_planning_group(PlanningGroup {
        name: "arm".into(),
        base_frame: "base_link".into(),
        kinematics: arm.clone(),
        solvers: arm,
    });
    model.add_end_effector(EndEffectorGroup {
        name: "hand".into(),
        parent_group: "arm".into(),
        links: vec![
            EndEffectorLink {
                name: "palm".into(),
                sphere: Sphere::new(Vec3::new(0.0, 0.0, -0.06), 0.03),
            },
            EndEffectorLink {
                name: "left_finger".into(),
                sphere: Sphere::new(Vec3::new(0.03, 0.0, -0.01), 0.008),
            },
            EndEffectorLink {
                name: "right_finger".into(),
                sphere: Sphere::new(Vec3::new(-0.03, 0.0, -0.01), 0.008),
            },
        ],
    });
    model
}

/// Height of the table top the cube rests on.
fn table_top(centre: Vec3, size: f64) -> f64 {
    centre.z - size / 2.0
}

/// A table slab with the cube resting on it.
pub fn demo_scene(centre: Vec3, size: f64) -> PlanningSceneSnapshot {
    let top = table_top(centre, size);
    let mut scene = PlanningScene::new("world");
    scene.add_object(CollisionObject::cuboid(
        "table",
        Pose::from_translation(Vec3::new(centre.x, centre.y, top - TABLE_THICKNESS / 2.0)),
        Vec3::new(TABLE_EXTENT, TABLE_EXTENT, TABLE_THICKNESS),
    ));
    scene.add_object(CollisionObject::cuboid(
        TARGET_OBJECT_ID,
        Pose::from_translation(centre),
        Vec3::new(size, size, size),
    ));
    scene.snapshot()
}

/// Fill in what the demo needs but the user left unset: a cutting plane at
/// the table top and the cube as target object.
pub fn prepare_filter_config(mut config: FilterPipelineConfig, centre: Vec3, size: f64) -> FilterPipelineConfig {
    if config.cutting_planes.is_empty() {
        config.cutting_planes.push(CuttingPlane::new(
            Pose::from_translation(Vec3::new(0.0, 0.0, table_top(centre, size))),
            GraspParallelPlane::Xy,
            PlaneSide::Negative,
        ));
    }
    if config.target_object_id.is_none() {
        config.target_object_id = Some(TARGET_OBJECT_ID.to_string());
    }
    config
}

/// Rotation whose z axis is `approach`.
fn approach_frame(approach: Vec3) -> Option<Quaternion> {
    let z = approach.normalized()?;
    let reference = if z.z.abs() < 0.9 { Vec3::unit_z() } else { Vec3::unit_x() };
    let x = reference.cross(z).normalized()?;
    let y = z.cross(x);
    Some(Quaternion::from_matrix([
        [x.x, y.x, z.x],
        [x.y, y.y, z.y],
        [x.z, y.z, z.z],
    ]))
}

/// One candidate per cube face and wrist spin, tool point at the cube
/// centre.  Top-down approaches score highest.
pub fn face_grasps(centre: Vec3, geometry: &GraspGeometry, first_id: u64) -> Vec<GraspCandidate> {
    let approaches = [
        Vec3::unit_z().neg(),
        Vec3::unit_x(),
        Vec3::unit_x().neg(),
        Vec3::unit_y(),
        Vec3::unit_y().neg(),
        Vec3::unit_z(),
    ];
    let down = Vec3::unit_z().neg();

    let mut id = first_id;
    let mut out = Vec::with_capacity(approaches.len() * WRIST_SPINS.len());
    for approach in approaches {
        let Some(frame) = approach_frame(approach) else {
            continue;
        };
        let score = 1.0 - approach.angle_to(down) / PI;
        for spin in WRIST_SPINS {
            let rotation = frame.mul(Quaternion::from_axis_angle(Vec3::unit_z(), spin));
            out.push(GraspCandidate::new(
                CandidateId(id),
                Pose::new(centre, rotation),
                geometry,
                GRIPPER_OPENING,
                score,
            ));
            id += 1;
        }
    }
    out
}

/// Deterministic offset in `[-MAX_JITTER, MAX_JITTER]` per trial and axis.
fn jitter(trial: usize, axis: usize) -> f64 {
    MAX_JITTER * ((trial as f64 + 1.0) * (1.7 + axis as f64)).sin()
}

pub fn trial_centre(nominal: Vec3, trial: usize) -> Vec3 {
    if trial == 0 {
        return nominal;
    }
    nominal.add(Vec3::new(jitter(trial, 0), jitter(trial, 1), jitter(trial, 2)))
}

fn reporter_for(config: &Config) -> Result<Reporter, String> {
    let reporter = Reporter::new(config.filter.visualization)
        .with_arrow_length(config.demo.arrow_length)
        .with_max_contacts(config.demo.max_contacts);
    let Some(path) = &config.demo.markers_path else {
        return Ok(reporter);
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open marker file {}: {}", path.display(), e))?;
    info!(target: "graspkit::demo", path = %path.display(), "writing markers");
    Ok(reporter.with_sink(Arc::new(JsonLinesSink::new(BufWriter::new(file)))))
}

/// Run `config.demo.num_trials` trials, calling `on_trial` after each.
///
/// Stops early once `cancel` fires; the interrupted trial is still reported.
pub fn run_trials(
    config: &Config,
    cancel: &CancelToken,
    mut on_trial: impl FnMut(&TrialReport),
) -> Result<Vec<TrialReport>, String> {
    let robot = demo_robot();
    let collision = Arc::new(SceneCollisionChecker::new(config.demo.collision_padding));
    let reporter = reporter_for(config)?;
    let size = config.demo.object_size;

    let mut reports = Vec::with_capacity(config.demo.num_trials);
    let mut next_id = 1;
    for trial in 0..config.demo.num_trials {
        if cancel.is_cancelled() {
            break;
        }
        let centre = trial_centre(config.demo.object_centre, trial);
        let filter_config = prepare_filter_config(config.filter.clone(), centre, size);
        let geometry = filter_config.grasp_geometry.clone();
        let filter = GraspFilter::new(filter_config, &robot, collision.clone())
            .map_err(|e| format!("Invalid filter configuration: {}", e))?
            .with_reporter(reporter.clone());

        let candidates = face_grasps(centre, &geometry, next_id);
        next_id += candidates.len() as u64;
        debug!(target: "graspkit::demo", trial, candidates = candidates.len(), "generated grasps");

        let outcome = filter
            .run(candidates, &demo_scene(centre, size), config.demo.worker_count, cancel)
            .map_err(|e| format!("Filter run failed: {}", e))?;
        let report = TrialReport {
            trial,
            object_centre: centre,
            outcome,
        };
        on_trial(&report);
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graspkit_types::{RejectReason, StageKind};

    fn demo_config(trials: usize) -> Config {
        let mut config = Config::default();
        config.demo.num_trials = trials;
        config.demo.worker_count = Some(2);
        config
    }

    // ── grasp generation ────────────────────────────────────────────────────

    #[test]
    fn face_grasps_cover_every_face_and_spin() {
        let centre = Vec3::new(0.28, -0.2, 0.5);
        let grasps = face_grasps(centre, &GraspGeometry::default(), 10);
        assert_eq!(grasps.len(), 12);
        assert_eq!(grasps[0].id(), CandidateId(10));
        assert_eq!(grasps[11].id(), CandidateId(21));
        for g in &grasps {
            assert!(g.grasp_pose().translation.sub(centre).norm() < 1e-12);
        }
    }

    #[test]
    fn face_grasps_approach_along_face_normals() {
        let grasps = face_grasps(Vec3::zero(), &GraspGeometry::default(), 1);
        let down = grasps[0].approach_direction();
        assert!(down.sub(Vec3::new(0.0, 0.0, -1.0)).norm() < 1e-9);
        let up = grasps[11].approach_direction();
        assert!(up.sub(Vec3::unit_z()).norm() < 1e-9);
        assert!(grasps[0].score() > grasps[2].score());
        assert!(grasps[2].score() > grasps[11].score());
    }

    #[test]
    fn wrist_spin_keeps_approach() {
        let grasps = face_grasps(Vec3::zero(), &GraspGeometry::default(), 1);
        for pair in grasps.chunks(2) {
            let a = pair[0].approach_direction();
            let b = pair[1].approach_direction();
            assert!(a.sub(b).norm() < 1e-9);
        }
    }

    // ── scene and config ────────────────────────────────────────────────────

    #[test]
    fn scene_holds_table_and_cube() {
        let scene = demo_scene(Vec3::new(0.3, 0.0, 0.5), 0.03);
        assert!(scene.object("table").is_some());
        assert!(scene.object(TARGET_OBJECT_ID).is_some());
    }

    #[test]
    fn prepare_adds_table_plane_and_target() {
        let config = prepare_filter_config(FilterPipelineConfig::default(), Vec3::new(0.3, 0.0, 0.5), 0.04);
        assert_eq!(config.cutting_planes.len(), 1);
        assert!((config.cutting_planes[0].pose.translation.z - 0.48).abs() < 1e-12);
        assert_eq!(config.target_object_id.as_deref(), Some(TARGET_OBJECT_ID));
    }

    #[test]
    fn prepare_keeps_user_settings() {
        let mut user = FilterPipelineConfig::default();
        user.target_object_id = Some("mug".into());
        user.cutting_planes.push(CuttingPlane::new(
            Pose::identity(),
            GraspParallelPlane::Yz,
            PlaneSide::Positive,
        ));
        let config = prepare_filter_config(user, Vec3::zero(), 0.03);
        assert_eq!(config.cutting_planes.len(), 1);
        assert_eq!(config.cutting_planes[0].plane, GraspParallelPlane::Yz);
        assert_eq!(config.target_object_id.as_deref(), Some("mug"));
    }

    #[test]
    fn jitter_is_bounded_and_repeatable() {
        let nominal = Vec3::new(0.28, -0.2, 0.5);
        assert_eq!(trial_centre(nominal, 0), nominal);
        for trial in 1..20 {
            let c = trial_centre(nominal, trial);
            assert_eq!(c, trial_centre(nominal, trial));
            assert!((c.x - nominal.x).abs() <= MAX_JITTER);
            assert!((c.y - nominal.y).abs() <= MAX_JITTER);
            assert!((c.z - nominal.z).abs() <= MAX_JITTER);
        }
    }

    // ── trials ──────────────────────────────────────────────────────────────

    #[test]
    fn bottom_face_grasps_hit_the_table_plane() {
        let reports = run_trials(&demo_config(1), &CancelToken::new(), |_| {}).unwrap();
        assert_eq!(reports.len(), 1);
        let outcome = &reports[0].outcome;
        assert_eq!(outcome.statistics.total, 12);
        for id in [11, 12] {
            let c = outcome.get(CandidateId(id)).unwrap();
            assert_eq!(
                c.status().rejection(),
                Some((StageKind::CuttingPlane, RejectReason::CuttingPlane))
            );
        }
    }

    #[test]
    fn candidate_ids_continue_across_trials() {
        let mut seen = Vec::new();
        let reports = run_trials(&demo_config(2), &CancelToken::new(), |r| seen.push(r.trial)).unwrap();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(reports[1].outcome.candidates[0].id(), CandidateId(13));
        assert_ne!(reports[0].outcome.run_id, reports[1].outcome.run_id);
    }

    #[test]
    fn cancelled_token_runs_no_trials() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let reports = run_trials(&demo_config(3), &cancel, |_| {}).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn markers_are_appended_to_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("markers.jsonl");
        let mut config = demo_config(1);
        config.filter.visualization.show_filtered_grasps = true;
        config.demo.markers_path = Some(path.clone());

        run_trials(&config, &CancelToken::new(), |_| {}).unwrap();
        let written = std::fs::read_to_string(&path).expect("read markers");
        assert_eq!(written.lines().count(), 12);
    }

    #[test]
    fn marker_settings_come_from_demo_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("markers.jsonl");
        let mut config = demo_config(1);
        config.filter.visualization.show_filtered_grasps = true;
        config.demo.markers_path = Some(path.clone());
        config.demo.arrow_length = 0.25;

        run_trials(&config, &CancelToken::new(), |_| {}).unwrap();
        let written = std::fs::read_to_string(&path).expect("read markers");
        assert!(written.lines().all(|l| l.contains("\"length\":0.25")));
    }

    #[test]
    fn contact_cap_comes_from_demo_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("markers.jsonl");
        let mut config = demo_config(1);
        config.filter.stages = vec![StageKind::IkFeasibility, StageKind::IkWithCollision];
        config.filter.visualization.show_grasp_filter_collision_if_failed = true;
        config.demo.markers_path = Some(path.clone());
        config.demo.collision_padding = 1.0;
        config.demo.max_contacts = 0;

        let reports = run_trials(&config, &CancelToken::new(), |_| {}).unwrap();
        assert_eq!(reports[0].outcome.statistics.valid, 0);
        let written = std::fs::read_to_string(&path).expect("read markers");
        assert!(written.is_empty());
    }

    #[test]
    fn unknown_planning_group_is_reported() {
        let mut config = demo_config(1);
        config.filter.planning_group_name = "left_arm".into();
        let err = run_trials(&config, &CancelToken::new(), |_| {}).unwrap_err();
        assert!(err.starts_with("Invalid filter configuration"));
    }
}
