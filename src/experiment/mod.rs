//! Experiment controller.
//!
//! Repeats a simulation for one parameter setting until every published
//! metric has a tight enough 95% confidence interval, then records the
//! cycle's means and moves on to the next value of the dependent variable.

pub mod controller;
pub mod output;
pub mod runner;
pub mod state;
pub mod stats;

pub use controller::{DiscardReason, ExperimentController, RunOutcome};
pub use output::CycleSummary;
pub use runner::{ProcessRunner, RunError, RunInvocation, SimulationRunner};
pub use state::{CyclePhase, ExperimentState, RunRecord, StopReason};
pub use stats::{check_confidence, ConfidenceReport, Metric, MetricSummary, StatsError};
