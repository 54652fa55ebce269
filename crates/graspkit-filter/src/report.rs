//! Statistics and visualization reporter.
//!
//! Runs once per filter run, after every worker has joined, on the fully
//! materialized [`FilterOutcome`].  Everything here is a side channel:
//! marker failures are logged and dropped, never returned.
//!
//! | Flag | Output |
//! |---|---|
//! | `statistics_verbose` | statistics table on `graspkit::filter_statistics` |
//! | `show_filtered_grasps` | one arrow per candidate, coloured by status |
//! | `show_cutting_planes` | one patch per cutting plane |
//! | `show_filtered_arm_solutions` | arm spheres at pregrasp and grasp of valid candidates |
//! | `show_grasp_filter_collision_if_failed` | contact points of collision rejections, only when nothing is valid |

use std::sync::Arc;

use graspkit_kinematics::ArmContext;
use graspkit_scene::CollisionChecker;
use graspkit_types::{GraspCandidate, PoseKind, RejectReason};
use graspkit_viz::{Marker, MarkerColor, MarkerEvent, MarkerSink, VizError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CuttingPlane, VisualizationFlags};
use crate::pipeline::FilterOutcome;

const DEFAULT_ARROW_LENGTH: f64 = 0.1;
const DEFAULT_PLANE_SIZE: f64 = 1.0;
const DEFAULT_MAX_CONTACTS: usize = 10;

/// Run-level context the reporter reads besides the outcome itself.
pub struct RunView<'a> {
    pub arm: &'a ArmContext,
    pub collision: &'a dyn CollisionChecker,
    pub cutting_planes: &'a [CuttingPlane],
}

#[derive(Clone)]
pub struct Reporter {
    flags: VisualizationFlags,
    sink: Option<Arc<dyn MarkerSink>>,
    arrow_length: f64,
    plane_size: f64,
    max_contacts: usize,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("flags", &self.flags)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(VisualizationFlags::default())
    }
}

impl Reporter {
    pub fn new(flags: VisualizationFlags) -> Self {
        Self {
            flags,
            sink: None,
            arrow_length: DEFAULT_ARROW_LENGTH,
            plane_size: DEFAULT_PLANE_SIZE,
            max_contacts: DEFAULT_MAX_CONTACTS,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MarkerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_arrow_length(mut self, length: f64) -> Self {
        self.arrow_length = length;
        self
    }

    /// Contact markers published per collision-rejected candidate.
    pub fn with_max_contacts(mut self, max: usize) -> Self {
        self.max_contacts = max;
        self
    }

    pub fn flags(&self) -> VisualizationFlags {
        self.flags
    }

    pub fn report(&self, outcome: &FilterOutcome, view: &RunView<'_>) {
        if self.flags.statistics_verbose {
            for line in outcome.statistics.to_string().lines() {
                info!(target: "graspkit::filter_statistics", "{line}");
            }
        }

        let Some(sink) = &self.sink else {
            return;
        };
        let mut out = Publisher {
            sink: sink.as_ref(),
            run_id: outcome.run_id,
            published: 0,
            failed: false,
        };

        if self.flags.show_cutting_planes {
            for plane in view.cutting_planes {
                out.publish(Marker::CuttingPlane {
                    pose: plane.pose,
                    plane: plane.plane,
                    size: self.plane_size,
                    color: MarkerColor::Magenta,
                });
            }
        }

        if self.flags.show_filtered_grasps {
            for c in &outcome.candidates {
                out.publish(Marker::GraspArrow {
                    candidate: c.id(),
                    pose: c.grasp_pose(),
                    approach: c.approach_direction(),
                    length: self.arrow_length,
                    color: MarkerColor::for_status(&c.status()),
                });
            }
        }

        if self.flags.show_filtered_arm_solutions {
            for c in outcome.valid() {
                self.publish_arm_solutions(&mut out, c, view);
            }
        }

        if self.flags.show_grasp_filter_collision_if_failed && outcome.statistics.valid == 0 {
            for c in &outcome.candidates {
                self.publish_contacts(&mut out, c, outcome, view);
            }
        }

        if let Err(e) = sink.flush() {
            warn!(target: "graspkit::filter", error = %e, "marker sink flush failed");
        }
        debug!(target: "graspkit::filter", markers = out.published, "markers published");
    }

    fn publish_arm_solutions(&self, out: &mut Publisher<'_>, c: &GraspCandidate, view: &RunView<'_>) {
        let Some(solutions) = c.collision_free_solution().or(c.ik_solution()) else {
            return;
        };
        for (pose, color) in [
            (PoseKind::Pregrasp, MarkerColor::Orange),
            (PoseKind::Grasp, MarkerColor::White),
        ] {
            if let Some(joints) = solutions.get(pose) {
                out.publish(Marker::ArmState {
                    candidate: c.id(),
                    spheres: view.arm.robot_state(joints).spheres,
                    color,
                });
            }
        }
    }

    /// Contacts of the arm at the pose that failed the collision check, placed
    /// with the solution IK feasibility found for that pose.
    fn publish_contacts(&self, out: &mut Publisher<'_>, c: &GraspCandidate, outcome: &FilterOutcome, view: &RunView<'_>) {
        let Some((_, reason)) = c.status().rejection() else {
            return;
        };
        let Some(pose) = colliding_pose(reason) else {
            return;
        };
        let Some(joints) = c.ik_solution().and_then(|s| s.get(pose)) else {
            return;
        };
        let state = view.arm.robot_state(joints);
        let color = MarkerColor::for_status(&c.status());
        for contact in view.collision.contacts(&state, &outcome.scene, self.max_contacts) {
            debug!(
                target: "graspkit::filter",
                candidate = %c.id(),
                %pose,
                link = %contact.link,
                body = %contact.body,
                "collision contact"
            );
            out.publish(Marker::Contact {
                candidate: c.id(),
                link: contact.link,
                position: contact.position,
                color,
            });
        }
    }
}

fn colliding_pose(reason: RejectReason) -> Option<PoseKind> {
    match reason {
        RejectReason::PregraspPoseCollision => Some(PoseKind::Pregrasp),
        RejectReason::GraspPoseCollision => Some(PoseKind::Grasp),
        RejectReason::LiftPoseCollision => Some(PoseKind::Lift),
        _ => None,
    }
}

/// Publishes markers, logging the first failure only.
struct Publisher<'a> {
    sink: &'a dyn MarkerSink,
    run_id: Uuid,
    published: usize,
    failed: bool,
}

impl Publisher<'_> {
    fn publish(&mut self, marker: Marker) {
        match self.sink.publish(MarkerEvent::new(self.run_id, marker)) {
            Ok(()) => self.published += 1,
            Err(_) if self.failed => {}
            Err(VizError::NoSubscribers) => {
                self.failed = true;
                debug!(target: "graspkit::filter", "no marker subscribers");
            }
            Err(e) => {
                self.failed = true;
                warn!(target: "graspkit::filter", error = %e, "marker publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterPipelineConfig;
    use crate::fixtures::{example_config, example_scene, gantry_robot, three_candidates};
    use crate::pipeline::{CancelToken, GraspFilter};
    use graspkit_scene::SceneCollisionChecker;
    use graspkit_types::{CandidateId, StageKind};
    use graspkit_viz::{MarkerBus, MarkerLog};

    fn run_with(config: FilterPipelineConfig, candidates: Vec<GraspCandidate>) -> (FilterOutcome, Vec<Marker>) {
        let log = Arc::new(MarkerLog::new());
        let reporter = Reporter::new(config.visualization).with_sink(log.clone());
        let filter = GraspFilter::new(config, &gantry_robot(), Arc::new(SceneCollisionChecker::default()))
            .unwrap()
            .with_reporter(reporter);
        let outcome = filter
            .run(candidates, &example_scene(), Some(1), &CancelToken::new())
            .unwrap();
        let markers = log.events().into_iter().map(|e| e.marker).collect();
        (outcome, markers)
    }

    #[test]
    fn no_flags_no_markers() {
        let (_, markers) = run_with(example_config(), three_candidates());
        assert!(markers.is_empty());
    }

    #[test]
    fn arrows_are_coloured_by_status() {
        let mut config = example_config();
        config.visualization.show_filtered_grasps = true;
        let (_, markers) = run_with(config, three_candidates());
        let colors: Vec<MarkerColor> = markers.iter().map(Marker::color).collect();
        assert_eq!(colors, vec![MarkerColor::Magenta, MarkerColor::Green, MarkerColor::Pink]);
        assert!(markers.iter().all(|m| m.namespace() == "filtered_grasps"));
    }

    #[test]
    fn cutting_planes_and_arm_solutions() {
        let mut config = example_config();
        config.visualization.show_cutting_planes = true;
        config.visualization.show_filtered_arm_solutions = true;
        let (_, markers) = run_with(config, three_candidates());

        let planes = markers.iter().filter(|m| matches!(m, Marker::CuttingPlane { .. })).count();
        assert_eq!(planes, 1);
        let arm: Vec<&Marker> = markers.iter().filter(|m| matches!(m, Marker::ArmState { .. })).collect();
        assert_eq!(arm.len(), 2);
        assert_eq!(arm[0].color(), MarkerColor::Orange);
        assert_eq!(arm[1].color(), MarkerColor::White);
        match arm[0] {
            Marker::ArmState { candidate, spheres, .. } => {
                assert_eq!(*candidate, CandidateId(2));
                assert!(spheres.iter().any(|s| s.link == "palm"));
            }
            other => panic!("unexpected marker {other:?}"),
        }
    }

    #[test]
    fn contacts_shown_only_when_nothing_is_valid() {
        let mut config = example_config();
        config.visualization.show_grasp_filter_collision_if_failed = true;

        let (_, with_valid) = run_with(config.clone(), three_candidates());
        assert!(with_valid.is_empty());

        let only_colliding = three_candidates().into_iter().filter(|c| c.id() == CandidateId(3)).collect();
        let (outcome, markers) = run_with(config, only_colliding);
        assert_eq!(
            outcome.candidates[0].status().rejection(),
            Some((StageKind::IkWithCollision, RejectReason::LiftPoseCollision))
        );
        assert!(!markers.is_empty());
        for m in &markers {
            match m {
                Marker::Contact { link, color, .. } => {
                    assert_eq!(link, "palm");
                    assert_eq!(*color, MarkerColor::Pink);
                }
                other => panic!("unexpected marker {other:?}"),
            }
        }
    }

    #[test]
    fn marker_failures_never_fail_the_run() {
        let mut config = example_config();
        config.visualization.show_filtered_grasps = true;
        config.visualization.statistics_verbose = true;
        let bus = Arc::new(MarkerBus::new(4));
        let reporter = Reporter::new(config.visualization).with_sink(bus);
        let filter = GraspFilter::new(config, &gantry_robot(), Arc::new(SceneCollisionChecker::default()))
            .unwrap()
            .with_reporter(reporter);
        let outcome = filter
            .run(three_candidates(), &example_scene(), None, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.statistics.valid, 1);
    }
}
