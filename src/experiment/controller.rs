//! Sequential run manager.
//!
//! A cycle launches runs for one value of the dependent variable until the
//! confidence check passes for every metric or a limit is hit:
//!
//! ```text
//! Init -> MinimumSampling (5 accepted runs) -> ConfidenceCheck
//!              ^                                 |       |
//!              +---- Running <------ fail -------+       +-- pass / cap --> Done
//! ```
//!
//! Discarded runs (timeout, missing or malformed record, failed sanity
//! check) never enter the history and do not count towards the minimum or
//! the cap, only towards the attempt guard.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre::{Context, Result};

use super::output::{self, CycleSummary, SummaryMetadata};
use super::runner::{RunError, RunInvocation, SimulationRunner};
use super::state::{CyclePhase, ExperimentState, RunRecord, StopReason};
use super::stats::{self, MIN_SAMPLE_RUNS};
use crate::config::ExperimentConfig;
use crate::tpa::record::ResultRecord;
use crate::utils::template;

/// Why a run was left out of the history
#[derive(Debug)]
pub enum DiscardReason {
    Failed(RunError),
    /// Parsed but failed the sanity check
    Rejected(ResultRecord),
}

#[derive(Debug)]
pub enum RunOutcome {
    Accepted(RunRecord),
    Discarded(DiscardReason),
}

pub struct ExperimentController<R: SimulationRunner> {
    config: ExperimentConfig,
    runner: R,
    state: ExperimentState,
    cycle_started: Option<Instant>,
    last_run_duration: Option<Duration>,
}

impl<R: SimulationRunner> ExperimentController<R> {
    pub fn new(config: ExperimentConfig, runner: R) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.output.directory).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                config.output.directory.display()
            )
        })?;
        Ok(Self {
            config,
            runner,
            state: ExperimentState::default(),
            cycle_started: None,
            last_run_duration: None,
        })
    }

    pub fn state(&self) -> &ExperimentState {
        &self.state
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Init: clear the history for a new cycle
    pub fn start_cycle(&mut self, dependent_value: f64) {
        let cycle = self.state.cycle + 1;
        self.state.reset(cycle, dependent_value);
        self.state.phase = CyclePhase::MinimumSampling;
        self.cycle_started = Some(Instant::now());
        self.last_run_duration = None;
        log::info!(
            "Cycle {}: {} = {} (up to {} runs)",
            cycle,
            self.config.dependent_label(),
            dependent_value,
            self.config.runs.effective_max_runs()
        );
    }

    fn invocation(&self, rng_run: u32) -> Result<RunInvocation> {
        let values = self.config.placeholder_values(self.state.dependent_value, rng_run);
        let args = self
            .config
            .simulation
            .args
            .iter()
            .map(|arg| template::expand(arg, &values))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RunInvocation {
            program: PathBuf::from(&self.config.simulation.program),
            args,
            working_dir: self.config.simulation.working_dir.clone(),
            result_file: self.config.simulation.result_path(),
            timeout: self.config.simulation.timeout,
            rng_run,
        })
    }

    /// Consecutive launches are separated by the configured pause
    fn pause_between_runs(&self) {
        let pause = self.config.simulation.pause;
        if self.state.attempts > 0 && !pause.is_zero() {
            thread::sleep(pause);
        }
    }

    /// Launch a single run and record its outcome. Does not advance the
    /// phase.
    pub fn run_once(&mut self) -> Result<RunOutcome> {
        self.pause_between_runs();

        self.state.attempts += 1;
        let rng_run = self.state.attempts;
        let invocation = self.invocation(rng_run)?;

        let launched = Instant::now();
        let result = self.runner.run(&invocation);
        self.last_run_duration = Some(launched.elapsed());

        let outcome = match result {
            Ok(record) if record.is_sane() => {
                let run = RunRecord {
                    run_index: rng_run,
                    dependent_value: self.state.dependent_value,
                    record,
                };
                self.state.history.push(run);
                output::write_runs_table(
                    &self.config.output.runs_table_path(),
                    self.config.dependent_label(),
                    &self.state.history,
                )?;
                log::info!(
                    "Run {} accepted ({} accepted): {}",
                    rng_run,
                    self.state.accepted(),
                    record.encode()
                );
                RunOutcome::Accepted(run)
            }
            Ok(record) => {
                self.state.discarded += 1;
                log::warn!(
                    "Run {} discarded, record failed sanity check: {}",
                    rng_run,
                    record.encode()
                );
                RunOutcome::Discarded(DiscardReason::Rejected(record))
            }
            Err(e) => {
                self.state.discarded += 1;
                log::warn!("Run {} discarded: {}", rng_run, error_chain(&e));
                RunOutcome::Discarded(DiscardReason::Failed(e))
            }
        };

        self.log_progress();
        Ok(outcome)
    }

    fn log_progress(&self) {
        let elapsed = self.cycle_started.map(|s| s.elapsed()).unwrap_or_default();
        let last = self.last_run_duration.unwrap_or_default();
        let remaining_runs = (self.config.runs.effective_max_runs() as usize)
            .saturating_sub(self.state.accepted());
        let estimate = last.as_secs_f64() * remaining_runs as f64;
        log::info!(
            "Cycle {} progress: elapsed {:.1}s, last run {:.1}s, at most {:.0}s remaining",
            self.state.cycle,
            elapsed.as_secs_f64(),
            last.as_secs_f64(),
            estimate
        );
    }

    /// Decide the next phase from the current history
    fn evaluate(&mut self) -> CyclePhase {
        let accepted = self.state.accepted();
        let limits = &self.config.runs;

        let phase = if limits.is_single_shot() {
            if accepted >= 1 {
                CyclePhase::Done(StopReason::SingleRun)
            } else {
                CyclePhase::MinimumSampling
            }
        } else if accepted < MIN_SAMPLE_RUNS {
            CyclePhase::MinimumSampling
        } else {
            self.state.phase = CyclePhase::ConfidenceCheck;
            match stats::check_confidence(&self.state.history) {
                Ok(report) => {
                    for m in &report.metrics {
                        log::debug!(
                            "{:>8}: mean {:.3}, sd {:.3}, margin {:.3}, target {:.3} -> {}",
                            m.metric.label(),
                            m.mean,
                            m.std_dev,
                            m.margin,
                            m.target,
                            if m.passed { "pass" } else { "fail" }
                        );
                    }
                    let passed = report.all_passed();
                    if !passed {
                        let failing: Vec<&str> = report.failing().map(|m| m.label()).collect();
                        log::info!(
                            "Confidence not reached after {} runs: {}",
                            accepted,
                            failing.join(", ")
                        );
                    }
                    self.state.last_report = Some(report);
                    if passed {
                        CyclePhase::Done(StopReason::ConfidenceReached)
                    } else if accepted >= limits.effective_max_runs() as usize {
                        CyclePhase::Done(StopReason::MaxRunsReached)
                    } else {
                        CyclePhase::Running
                    }
                }
                Err(e) => {
                    log::warn!("{}", e);
                    CyclePhase::Running
                }
            }
        };

        match phase {
            CyclePhase::Done(_) => phase,
            _ if self.state.attempts >= limits.max_attempts => {
                log::warn!(
                    "Giving up after {} attempts with {} accepted runs",
                    self.state.attempts,
                    accepted
                );
                CyclePhase::Done(StopReason::AttemptsExhausted)
            }
            _ => phase,
        }
    }

    /// Run once and advance the state machine
    pub fn step(&mut self) -> Result<CyclePhase> {
        if let CyclePhase::Init = self.state.phase {
            let value = self.state.dependent_value;
            self.start_cycle(value);
        }
        if self.state.phase.is_done() {
            return Ok(self.state.phase);
        }
        self.run_once()?;
        self.state.phase = self.evaluate();
        Ok(self.state.phase)
    }

    /// Close the cycle: append the means row and optionally write the summary
    pub fn finish_cycle(&mut self) -> Result<CycleSummary> {
        let stop_reason = self.state.stop_reason().unwrap_or(StopReason::AttemptsExhausted);
        let label = self.config.dependent_label().to_string();
        output::append_means_row(
            &self.config.output.means_table_path(),
            &label,
            self.state.dependent_value,
            &self.state.history,
        )?;

        let elapsed = self.cycle_started.map(|s| s.elapsed()).unwrap_or_default();
        let summary = CycleSummary {
            metadata: SummaryMetadata {
                generated_at: CycleSummary::timestamp(),
                traffic_type: self.config.traffic_type,
                route_optimization: self.config.route_optimization,
                dependent_label: label,
                dependent_value: self.state.dependent_value,
            },
            cycle: self.state.cycle,
            stop_reason,
            accepted_runs: self.state.accepted(),
            attempts: self.state.attempts,
            discarded_runs: self.state.discarded,
            elapsed_secs: elapsed.as_secs_f64(),
            confidence: self.state.last_report.clone(),
            runs: self.state.history.clone(),
        };
        if self.config.output.summary_json {
            output::write_cycle_summary(&self.config.output.directory, &summary)?;
        }

        log::info!(
            "Cycle {} done ({}): {} accepted, {} discarded, {:.1}s",
            summary.cycle,
            stop_reason,
            summary.accepted_runs,
            summary.discarded_runs,
            summary.elapsed_secs
        );
        Ok(summary)
    }

    /// One full cycle for a dependent variable value
    pub fn run_cycle(&mut self, dependent_value: f64) -> Result<CycleSummary> {
        self.start_cycle(dependent_value);
        while !self.step()?.is_done() {}
        self.finish_cycle()
    }

    /// Every cycle of the configured sweep
    pub fn run_experiment(&mut self) -> Result<Vec<CycleSummary>> {
        let values = self.config.cycle_values();
        let mut summaries = Vec::with_capacity(values.len());
        for value in values {
            summaries.push(self.run_cycle(value)?);
        }
        Ok(summaries)
    }
}

fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
