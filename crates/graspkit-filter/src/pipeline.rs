//! [`GraspFilter`] – the filter pipeline orchestrator.
//!
//! A run takes a set of candidates and an immutable scene snapshot and
//! returns every candidate with a terminal status, plus [`RunStatistics`].
//!
//! # Run lifecycle
//!
//! 1. Empty input returns at once with zeroed statistics.
//! 2. If a target object is configured, a derived snapshot allowing contact
//!    between the gripper links and that object is built.
//! 3. Inputs that are already terminal are set aside unchanged.
//! 4. A rayon pool of `worker_count` threads is started; each worker takes
//!    its own [`KinematicSolver`] and pops candidates from a shared queue
//!    until it is empty.
//! 5. Per-worker tallies are merged after every worker has joined, the
//!    results are sorted by id and handed to the [`Reporter`].
//!
//! Cancellation is checked between candidates.  Candidates popped after the
//! [`CancelToken`] fires are rejected as `cancelled` at the first configured
//! stage.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use graspkit_kinematics::{ArmContext, KinematicSolver, RobotModel};
use graspkit_scene::{CollisionChecker, PlanningSceneSnapshot};
use graspkit_types::{CandidateId, GraspCandidate, GraspError, JointState, RejectReason, StageKind};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::FilterPipelineConfig;
use crate::report::{Reporter, RunView};
use crate::stages::{FilterStage, StageContext};
use crate::stats::{RunStatistics, WorkerTally};

// ────────────────────────────────────────────────────────────────────────────
// CancelToken
// ────────────────────────────────────────────────────────────────────────────

/// Shared cancellation flag.  Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one set by a Ctrl-C handler.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FilterOutcome
// ────────────────────────────────────────────────────────────────────────────

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Every input candidate exactly once, ordered by id.
    pub candidates: Vec<GraspCandidate>,
    pub statistics: RunStatistics,
    /// Snapshot the run was evaluated against, including any allowed
    /// contacts added for the target object.
    pub scene: PlanningSceneSnapshot,
}

impl FilterOutcome {
    pub fn valid(&self) -> impl Iterator<Item = &GraspCandidate> {
        self.candidates.iter().filter(|c| c.status().is_valid())
    }

    /// Valid candidates, best score first.
    pub fn valid_sorted(&self) -> Vec<&GraspCandidate> {
        let mut valid: Vec<&GraspCandidate> = self.valid().collect();
        valid.sort_by(|a, b| b.score().total_cmp(&a.score()));
        valid
    }

    /// Consume the outcome, keeping only valid candidates, best score first.
    pub fn into_valid(self) -> Vec<GraspCandidate> {
        let mut valid: Vec<GraspCandidate> = self
            .candidates
            .into_iter()
            .filter(|c| c.status().is_valid())
            .collect();
        valid.sort_by(|a, b| b.score().total_cmp(&a.score()));
        valid
    }

    pub fn get(&self, id: CandidateId) -> Option<&GraspCandidate> {
        self.candidates
            .binary_search_by_key(&id, |c| c.id())
            .ok()
            .map(|i| &self.candidates[i])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GraspFilter
// ────────────────────────────────────────────────────────────────────────────

/// A validated, reusable filter pipeline.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use graspkit_filter::{CancelToken, FilterPipelineConfig, GraspFilter};
/// use graspkit_geometry::Pose;
/// use graspkit_kinematics::gantry::CartesianGantry;
/// use graspkit_kinematics::{EndEffectorGroup, PlanningGroup, RobotModel};
/// use graspkit_scene::{PlanningScene, SceneCollisionChecker};
///
/// let gantry = Arc::new(CartesianGantry::default());
/// let mut robot = RobotModel::new("gantry", "world");
/// robot.set_frame("world", "gantry_base", Pose::identity());
/// robot.add_planning_group(PlanningGroup {
///     name: "arm".into(),
///     base_frame: "gantry_base".into(),
///     kinematics: gantry.clone(),
///     solvers: gantry,
/// });
/// robot.add_end_effector(EndEffectorGroup {
///     name: "hand".into(),
///     parent_group: "arm".into(),
///     links: Vec::new(),
/// });
///
/// let filter = GraspFilter::new(
///     FilterPipelineConfig::default(),
///     &robot,
///     Arc::new(SceneCollisionChecker::default()),
/// ).unwrap();
///
/// let scene = PlanningScene::new("world").snapshot();
/// let outcome = filter.run(Vec::new(), &scene, None, &CancelToken::new()).unwrap();
/// assert!(outcome.candidates.is_empty());
/// assert_eq!(outcome.statistics.attempted, 0);
/// ```
pub struct GraspFilter {
    config: FilterPipelineConfig,
    arm: ArmContext,
    collision: Arc<dyn CollisionChecker>,
    stages: Vec<FilterStage>,
    seed: JointState,
    reporter: Reporter,
}

impl std::fmt::Debug for GraspFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraspFilter")
            .field("arm", &self.arm)
            .field("stages", &self.stage_kinds())
            .finish()
    }
}

/// What one worker hands back when the queue runs dry.
struct WorkerReport {
    candidates: Vec<GraspCandidate>,
    tally: WorkerTally,
}

impl GraspFilter {
    /// Validate `config` against `robot` and build the stage chain.
    ///
    /// # Errors
    ///
    /// Any [`GraspError`] returned by [`FilterPipelineConfig::validate`].
    pub fn new(
        config: FilterPipelineConfig,
        robot: &RobotModel,
        collision: Arc<dyn CollisionChecker>,
    ) -> Result<Self, GraspError> {
        let (arm, seed) = config.validate(robot)?;
        let stages = config
            .stages
            .iter()
            .map(|kind| FilterStage::from_config(*kind, &config))
            .collect();
        let reporter = Reporter::new(config.visualization);

        info!(
            target: "graspkit::filter",
            planning_group = %arm.planning_group,
            end_effector = %arm.end_effector,
            gripper = %config.gripper_type,
            stages = config.stages.len(),
            "grasp filter configured"
        );

        Ok(Self {
            config,
            arm,
            collision,
            stages,
            seed,
            reporter,
        })
    }

    /// Replace the reporter, e.g. to attach a marker sink.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &FilterPipelineConfig {
        &self.config
    }

    pub fn arm(&self) -> &ArmContext {
        &self.arm
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(FilterStage::kind).collect()
    }

    /// Filter `candidates` against `scene`.
    ///
    /// `worker_count` of `None` uses the available parallelism.  The count is
    /// capped at the number of candidates to process and forced to one when
    /// `collision_verbose` is set.
    ///
    /// # Errors
    ///
    /// - [`GraspError::UnknownObject`] when the configured target object is
    ///   not in `scene`.
    /// - [`GraspError::WorkerPool`] when the worker threads cannot be
    ///   started.
    ///
    /// Rejections, solver timeouts and cancellation are never errors; they
    /// are recorded on the candidates.
    pub fn run(
        &self,
        candidates: Vec<GraspCandidate>,
        scene: &PlanningSceneSnapshot,
        worker_count: Option<usize>,
        cancel: &CancelToken,
    ) -> Result<FilterOutcome, GraspError> {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let kinds = self.stage_kinds();
        let mut statistics = RunStatistics::empty(&kinds);
        statistics.total = candidates.len();

        let span = info_span!(
            target: "graspkit::filter",
            "grasp_filter_run",
            %run_id,
            candidates = candidates.len(),
            workers = tracing::field::Empty
        );
        let _entered = span.enter();

        if candidates.is_empty() {
            debug!(target: "graspkit::filter", "no candidates to filter");
            return Ok(FilterOutcome {
                run_id,
                started_at,
                candidates,
                statistics,
                scene: scene.clone(),
            });
        }

        let scene = match &self.config.target_object_id {
            Some(object) => scene.with_allowed_contacts(object, &self.arm.ee_link_names())?,
            None => scene.clone(),
        };

        let (mut finished, pending): (Vec<GraspCandidate>, Vec<GraspCandidate>) =
            candidates.into_iter().partition(|c| c.status().is_terminal());
        statistics.passed_through = finished.len();
        if !finished.is_empty() {
            debug!(
                target: "graspkit::filter",
                count = finished.len(),
                "passing through candidates with a final status"
            );
        }

        let workers = resolve_worker_count(
            worker_count,
            pending.len(),
            self.config.visualization.collision_verbose,
        );
        statistics.worker_count = workers;
        span.record("workers", workers);

        if workers > 0 {
            for report in self.dispatch(pending, &scene, workers, cancel)? {
                finished.extend(report.candidates);
                statistics.absorb(report.tally);
            }
        }

        finished.sort_by_key(|c| c.id());
        statistics.duration = started.elapsed();

        info!(
            target: "graspkit::filter",
            total = statistics.total,
            attempted = statistics.attempted,
            valid = statistics.valid,
            cancelled = statistics.cancelled,
            elapsed_ms = statistics.elapsed_ms(),
            "grasp filter run complete"
        );
        if statistics.valid == 0 && statistics.attempted > 0 {
            warn!(target: "graspkit::filter", "no valid grasps found");
        }

        let outcome = FilterOutcome {
            run_id,
            started_at,
            candidates: finished,
            statistics,
            scene,
        };
        self.reporter.report(
            &outcome,
            &RunView {
                arm: &self.arm,
                collision: self.collision.as_ref(),
                cutting_planes: &self.config.cutting_planes,
            },
        );
        Ok(outcome)
    }

    /// Start the pool, drain `pending` and wait for every worker.
    fn dispatch(
        &self,
        pending: Vec<GraspCandidate>,
        scene: &PlanningSceneSnapshot,
        workers: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<WorkerReport>, GraspError> {
        // One solver per worker, built before any worker starts.
        let solvers: Vec<Mutex<Option<Box<dyn KinematicSolver>>>> = (0..workers)
            .map(|_| Mutex::new(Some(self.arm.new_solver())))
            .collect();
        let queue = Mutex::new(VecDeque::from(pending));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("grasp-filter-{i}"))
            .build()
            .map_err(|e| GraspError::WorkerPool(e.to_string()))?;

        Ok(pool.broadcast(|ctx| self.worker_loop(ctx.index(), &queue, &solvers, scene, cancel)))
    }

    fn worker_loop(
        &self,
        index: usize,
        queue: &Mutex<VecDeque<GraspCandidate>>,
        solvers: &[Mutex<Option<Box<dyn KinematicSolver>>>],
        scene: &PlanningSceneSnapshot,
        cancel: &CancelToken,
    ) -> WorkerReport {
        let kinds = self.stage_kinds();
        let mut tally = WorkerTally::new(&kinds);
        let mut done = Vec::new();

        let owned = solvers
            .get(index)
            .and_then(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).take());
        let mut solver = owned.unwrap_or_else(|| self.arm.new_solver());
        debug!(target: "graspkit::filter", worker = index, solver = solver.name(), "worker started");

        let mut ctx = StageContext {
            arm: &self.arm,
            scene,
            collision: self.collision.as_ref(),
            solver: solver.as_mut(),
            seed: &self.seed,
            timeout: self.config.ik.timeout(),
            collision_verbose: self.config.visualization.collision_verbose,
        };

        loop {
            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some(mut candidate) = next else {
                break;
            };

            if cancel.is_cancelled() {
                if let Some(first) = kinds.first() {
                    candidate.mark_rejected(*first, RejectReason::Cancelled);
                }
                tally.cancelled += 1;
                tally.reject(RejectReason::Cancelled);
            } else {
                self.filter_candidate(&mut candidate, &mut ctx, &mut tally);
            }
            done.push(candidate);
        }

        debug!(target: "graspkit::filter", worker = index, processed = done.len(), "worker finished");
        WorkerReport {
            candidates: done,
            tally,
        }
    }

    /// Run the stage chain on one candidate, stopping at the first rejection.
    fn filter_candidate(&self, candidate: &mut GraspCandidate, ctx: &mut StageContext<'_>, tally: &mut WorkerTally) {
        tally.attempted += 1;
        for (i, stage) in self.stages.iter().enumerate() {
            let kind = stage.kind();
            tally.stages[i].attempted += 1;
            match stage.evaluate(candidate, ctx) {
                Ok(()) => {
                    tally.stages[i].passed += 1;
                    candidate.mark_passed(kind);
                }
                Err(reason) => {
                    tally.stages[i].failed += 1;
                    tally.reject(reason);
                    candidate.mark_rejected(kind, reason);
                    debug!(
                        target: "graspkit::superdebug",
                        candidate = %candidate.id(),
                        stage = %kind,
                        %reason,
                        "candidate rejected"
                    );
                    return;
                }
            }
        }
        tally.valid += 1;
        candidate.mark_valid();
    }
}

fn resolve_worker_count(requested: Option<usize>, pending: usize, collision_verbose: bool) -> usize {
    if pending == 0 {
        return 0;
    }
    if collision_verbose {
        return 1;
    }
    let wanted = requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    });
    wanted.clamp(1, pending)
}
