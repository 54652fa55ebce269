//! `graspkit-filter` – the grasp filter pipeline.
//!
//! # Modules
//!
//! - [`config`] – [`FilterPipelineConfig`] and its parts: cutting planes,
//!   approach and orientation constraints, IK settings, visualization flags.
//! - [`stages`] – [`FilterStage`], the closed set of filter stages.
//! - [`pipeline`] – [`GraspFilter`], the parallel orchestrator, with
//!   [`CancelToken`] and [`FilterOutcome`].
//! - [`stats`] – [`RunStatistics`] aggregated after every run.
//! - [`report`] – [`Reporter`]: statistics logging and debug markers.

pub mod config;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod stats;

#[cfg(test)]
mod fixtures;

pub use config::{
    ApproachConstraint, CuttingPlane, DesiredOrientation, FilterPipelineConfig, IkSettings, PlaneSide,
    VisualizationFlags,
};
pub use pipeline::{CancelToken, FilterOutcome, GraspFilter};
pub use report::{Reporter, RunView};
pub use stages::{FilterStage, StageContext};
pub use stats::{RunStatistics, StageTally};
