//! State of one experiment cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::stats::ConfidenceReport;
use crate::tpa::record::ResultRecord;

/// One accepted run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Attempt index the run was launched with (`{rng_run}`)
    pub run_index: u32,
    pub dependent_value: f64,
    pub record: ResultRecord,
}

/// Why a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Every metric passed the confidence check
    ConfidenceReached,
    /// The run cap was reached first
    MaxRunsReached,
    /// Too many launches without enough accepted runs
    AttemptsExhausted,
    /// Single-shot mode, no confidence check
    SingleRun,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::ConfidenceReached => "confidence reached",
            StopReason::MaxRunsReached => "maximum number of runs reached",
            StopReason::AttemptsExhausted => "maximum number of attempts reached",
            StopReason::SingleRun => "single run",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    Init,
    MinimumSampling,
    ConfidenceCheck,
    Running,
    Done(StopReason),
}

impl CyclePhase {
    pub fn is_done(&self) -> bool {
        matches!(self, CyclePhase::Done(_))
    }
}

/// Cycle-scoped run history and counters
#[derive(Debug, Clone)]
pub struct ExperimentState {
    pub cycle: u32,
    pub dependent_value: f64,
    pub phase: CyclePhase,
    pub history: Vec<RunRecord>,
    /// Launches so far, accepted or not
    pub attempts: u32,
    pub discarded: u32,
    pub last_report: Option<ConfidenceReport>,
}

impl Default for ExperimentState {
    fn default() -> Self {
        Self {
            cycle: 0,
            dependent_value: 0.0,
            phase: CyclePhase::Init,
            history: Vec::new(),
            attempts: 0,
            discarded: 0,
            last_report: None,
        }
    }
}

impl ExperimentState {
    /// Clear everything for a new cycle
    pub fn reset(&mut self, cycle: u32, dependent_value: f64) {
        *self = Self {
            cycle,
            dependent_value,
            ..Self::default()
        };
    }

    pub fn accepted(&self) -> usize {
        self.history.len()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.phase {
            CyclePhase::Done(reason) => Some(reason),
            _ => None,
        }
    }
}
