//! Run statistics.
//!
//! Workers count into their own [`WorkerTally`]; the orchestrator merges the
//! tallies single-threaded after every worker has joined.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use graspkit_types::{RejectReason, StageKind};
use serde::Serialize;

/// Counters for one configured stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTally {
    pub stage: StageKind,
    pub attempted: usize,
    pub passed: usize,
    pub failed: usize,
}

impl StageTally {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            attempted: 0,
            passed: 0,
            failed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct RunStatistics {
    /// Candidates handed to the run.
    pub total: usize,
    /// Candidates that entered the stage chain (excludes cancelled and
    /// already-terminal inputs).
    pub attempted: usize,
    /// Already-terminal inputs returned unchanged.
    pub passed_through: usize,
    pub cancelled: usize,
    pub valid: usize,
    /// One entry per configured stage, in pipeline order.
    pub stages: Vec<StageTally>,
    pub reasons: BTreeMap<RejectReason, usize>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub worker_count: usize,
}

impl RunStatistics {
    /// Zeroed statistics for a pipeline made of `stages`.
    pub fn empty(stages: &[StageKind]) -> Self {
        Self {
            stages: stages.iter().copied().map(StageTally::new).collect(),
            ..Self::default()
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageTally> {
        self.stages.iter().find(|t| t.stage == kind)
    }

    /// Number of candidates that passed `kind`; zero if the stage is not
    /// configured.
    pub fn passed(&self, kind: StageKind) -> usize {
        self.stage(kind).map_or(0, |t| t.passed)
    }

    pub fn rejected(&self) -> usize {
        self.reasons.values().sum()
    }

    /// Wall-clock run time in milliseconds, sub-millisecond part kept.
    pub fn elapsed_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    pub(crate) fn absorb(&mut self, tally: WorkerTally) {
        self.attempted += tally.attempted;
        self.cancelled += tally.cancelled;
        self.valid += tally.valid;
        for (own, theirs) in self.stages.iter_mut().zip(tally.stages) {
            own.attempted += theirs.attempted;
            own.passed += theirs.passed;
            own.failed += theirs.failed;
        }
        for (reason, n) in tally.reasons {
            *self.reasons.entry(reason).or_insert(0) += n;
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} candidates, {} attempted, {} valid, {} cancelled, {} passed through ({} workers, {:.1} ms)",
            self.total,
            self.attempted,
            self.valid,
            self.cancelled,
            self.passed_through,
            self.worker_count,
            self.elapsed_ms()
        )?;
        writeln!(f, "{:<26} {:>9} {:>7} {:>7}", "stage", "attempted", "passed", "failed")?;
        for t in &self.stages {
            writeln!(
                f,
                "{:<26} {:>9} {:>7} {:>7}",
                t.stage.name(),
                t.attempted,
                t.passed,
                t.failed
            )?;
        }
        for (reason, n) in &self.reasons {
            writeln!(f, "  {:<24} {n:>7}", reason.as_str())?;
        }
        Ok(())
    }
}

/// Per-worker counters, merged into [`RunStatistics`] after join.
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkerTally {
    pub attempted: usize,
    pub cancelled: usize,
    pub valid: usize,
    pub stages: Vec<StageTally>,
    pub reasons: BTreeMap<RejectReason, usize>,
}

impl WorkerTally {
    pub fn new(stages: &[StageKind]) -> Self {
        Self {
            stages: stages.iter().copied().map(StageTally::new).collect(),
            ..Self::default()
        }
    }

    pub fn reject(&mut self, reason: RejectReason) {
        *self.reasons.entry(reason).or_insert(0) += 1;
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGES: [StageKind; 2] = [StageKind::CuttingPlane, StageKind::IkFeasibility];

    #[test]
    fn empty_statistics_are_zeroed() {
        let stats = RunStatistics::empty(&STAGES);
        assert_eq!(stats.stages.len(), 2);
        assert_eq!(stats.passed(StageKind::CuttingPlane), 0);
        assert_eq!(stats.passed(StageKind::IkWithCollision), 0);
        assert!(stats.stage(StageKind::IkWithCollision).is_none());
        assert_eq!(stats.rejected(), 0);
    }

    #[test]
    fn worker_tallies_merge() {
        let mut stats = RunStatistics::empty(&STAGES);
        for passed in [1, 2] {
            let mut tally = WorkerTally::new(&STAGES);
            tally.attempted = 2;
            tally.stages[0].attempted = 2;
            tally.stages[0].passed = passed;
            tally.stages[0].failed = 2 - passed;
            tally.reject(RejectReason::CuttingPlane);
            stats.absorb(tally);
        }
        assert_eq!(stats.attempted, 4);
        assert_eq!(stats.passed(StageKind::CuttingPlane), 3);
        assert_eq!(stats.stage(StageKind::CuttingPlane).unwrap().failed, 1);
        assert_eq!(stats.reasons[&RejectReason::CuttingPlane], 2);
    }

    #[test]
    fn display_lists_every_stage() {
        let mut stats = RunStatistics::empty(&STAGES);
        stats.reasons.insert(RejectReason::LiftUnreachable, 1);
        let text = stats.to_string();
        assert!(text.contains("CuttingPlaneFilter"));
        assert!(text.contains("IKFeasibilityFilter"));
        assert!(text.contains("lift_unreachable"));
    }

    #[test]
    fn serializes_duration_in_milliseconds() {
        let stats = RunStatistics {
            duration: Duration::from_millis(250),
            ..RunStatistics::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["duration"], 250.0);
    }

    #[test]
    fn elapsed_ms_keeps_fractions() {
        let stats = RunStatistics {
            duration: Duration::from_micros(1_750),
            ..RunStatistics::default()
        };
        assert!((stats.elapsed_ms() - 1.75).abs() < 1e-9);

        let fast = RunStatistics {
            duration: Duration::from_micros(400),
            ..RunStatistics::default()
        };
        assert!(fast.elapsed_ms() > 0.0);
    }
}
