//! Experiment cycles driven through the public API.

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::Path;

use mipv6sim::config::ExperimentConfig;
use mipv6sim::config_loader::load_config;
use mipv6sim::experiment::{
    CyclePhase, ExperimentController, ProcessRunner, RunError, RunInvocation, SimulationRunner,
    StopReason,
};
use mipv6sim::tpa::ResultRecord;
use tempfile::{tempdir, NamedTempFile};

/// Hands out prepared results in order
struct FakeRunner {
    results: VecDeque<Result<ResultRecord, RunError>>,
    launches: u32,
}

impl FakeRunner {
    fn new(results: Vec<Result<ResultRecord, RunError>>) -> Self {
        Self {
            results: results.into(),
            launches: 0,
        }
    }
}

impl SimulationRunner for FakeRunner {
    fn run(&mut self, _invocation: &RunInvocation) -> Result<ResultRecord, RunError> {
        self.launches += 1;
        self.results.pop_front().unwrap_or_else(|| {
            Err(RunError::Timeout {
                timeout: std::time::Duration::from_secs(1),
            })
        })
    }
}

fn record(throughput: f64) -> ResultRecord {
    format!("{:.2}*2.00*45.00*3.00*1.20*86*1500*1470*30*120", throughput)
        .parse()
        .unwrap()
}

fn config(dir: &Path, max_runs: u32) -> ExperimentConfig {
    let yaml = r#"
simulation:
  program: "sim"
  args: ["--velocity={velocity}", "--RngRun={rng_run}"]
  pause: 0s
traffic_type: VOIP
parameters:
  velocity: 20
dependent_variable:
  parameter: velocity
  label: "V[k/h]"
runs:
  max_runs: @MAX@
output:
  directory: "@DIR@"
  summary_json: true
"#
    .replace("@MAX@", &max_runs.to_string())
    .replace("@DIR@", &dir.display().to_string());
    let config: ExperimentConfig = serde_yaml::from_str(&yaml).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn sequential_stop_at_sixth_run() {
    let dir = tempdir().unwrap();
    let throughputs = [100.0, 100.0, 100.0, 100.0, 115.0, 103.0, 100.0, 100.0];
    let runner = FakeRunner::new(throughputs.iter().map(|&t| Ok(record(t))).collect());
    let mut ctl = ExperimentController::new(config(dir.path(), 50), runner).unwrap();

    let summary = ctl.run_cycle(20.0).unwrap();
    assert_eq!(summary.stop_reason, StopReason::ConfidenceReached);
    assert_eq!(summary.accepted_runs, 6);
    assert_eq!(ctl.runner().launches, 6);

    let report = summary.confidence.as_ref().unwrap();
    assert_eq!(report.runs, 6);
    assert!(report.all_passed());

    let runs = fs::read_to_string(ctl.config().output.runs_table_path()).unwrap();
    assert_eq!(runs.lines().count(), 7);
    assert!(runs.lines().nth(6).unwrap().starts_with("6\t20\t103.00\t"));

    let means = fs::read_to_string(ctl.config().output.means_table_path()).unwrap();
    let lines: Vec<&str> = means.lines().collect();
    assert_eq!(
        lines,
        vec![
            "#V[k/h]\tT[Kbps]\tPl[%]\tD[ms]\tJ[ms]\tH[s]\tR",
            "20.00\t103.00\t2.00\t45.00\t3.00\t1.20\t86"
        ]
    );

    assert!(dir.path().join("cycle_001_summary.json").exists());
}

#[test]
fn identical_runs_stop_after_minimum() {
    let dir = tempdir().unwrap();
    let runner = FakeRunner::new((0..10).map(|_| Ok(record(250.0))).collect());
    let mut ctl = ExperimentController::new(config(dir.path(), 100), runner).unwrap();
    let summary = ctl.run_cycle(20.0).unwrap();
    assert_eq!(summary.stop_reason, StopReason::ConfidenceReached);
    assert_eq!(summary.accepted_runs, 5);
}

#[test]
fn discarded_runs_do_not_count() {
    let dir = tempdir().unwrap();
    let timeout = || {
        Err(RunError::Timeout {
            timeout: std::time::Duration::from_secs(1200),
        })
    };
    let results = vec![
        Ok(record(200.0)),
        timeout(),
        Ok(record(200.0)),
        Err(RunError::MissingResult { path: "tempresults.txt".into() }),
        Ok(record(200.0)),
        Ok("-1.00*2.00*45.00*3.00*1.20*86*1500*1470*30*120".parse().unwrap()),
        Ok(record(200.0)),
        Ok(record(200.0)),
    ];
    let mut ctl =
        ExperimentController::new(config(dir.path(), 20), FakeRunner::new(results)).unwrap();
    ctl.start_cycle(20.0);

    let mut phases = Vec::new();
    loop {
        let phase = ctl.step().unwrap();
        phases.push(phase);
        if phase.is_done() {
            break;
        }
    }
    assert_eq!(phases.len(), 8);
    assert!(phases[..7].iter().all(|p| *p == CyclePhase::MinimumSampling));
    assert_eq!(ctl.state().accepted(), 5);
    assert_eq!(ctl.state().discarded, 3);
    let indices: Vec<u32> = ctl.state().history.iter().map(|r| r.run_index).collect();
    assert_eq!(indices, vec![1, 3, 5, 7, 8]);
}

#[test]
fn run_cap_reached_with_noisy_metrics() {
    let dir = tempdir().unwrap();
    let noisy = [50.0, 150.0, 60.0, 140.0, 70.0, 130.0, 55.0, 145.0];
    let runner = FakeRunner::new(noisy.iter().map(|&t| Ok(record(t))).collect());
    let mut ctl = ExperimentController::new(config(dir.path(), 3), runner).unwrap();
    let summary = ctl.run_cycle(20.0).unwrap();
    // max_runs 3 is clamped to 6
    assert_eq!(summary.stop_reason, StopReason::MaxRunsReached);
    assert_eq!(summary.accepted_runs, 6);
}

#[test]
fn sweep_appends_one_means_row_per_cycle() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path(), 1);
    cfg.dependent_variable.as_mut().unwrap().sweep = Some(mipv6sim::config::Sweep {
        first: 10.0,
        last: 30.0,
        increment: 10.0,
    });
    let runner = FakeRunner::new((0..3).map(|i| Ok(record(100.0 + i as f64))).collect());
    let mut ctl = ExperimentController::new(cfg, runner).unwrap();

    let summaries = ctl.run_experiment().unwrap();
    assert_eq!(summaries.len(), 3);
    assert!(summaries.iter().all(|s| s.stop_reason == StopReason::SingleRun));

    let means = fs::read_to_string(ctl.config().output.means_table_path()).unwrap();
    let rows: Vec<&str> = means.lines().skip(1).collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with("10.00\t100.00"));
    assert!(rows[2].starts_with("30.00\t102.00"));
}

#[test]
fn process_runner_end_to_end() {
    let dir = tempdir().unwrap();
    let yaml = r#"
simulation:
  program: "sh"
  args:
    - "-c"
    - 'echo "10{rng_run}.00*1.00*40.00*2.00*1.50*88*1000*990*10*100" > tempresults.txt'
  timeout: 30s
  pause: 0s
traffic_type: UDPCBR
runs:
  max_runs: 10
output:
  directory: "out"
"#;
    let mut file = NamedTempFile::new_in(dir.path()).unwrap();
    write!(file, "{}", yaml).unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.simulation.working_dir, dir.path().join("."));
    let mut ctl = ExperimentController::new(config, ProcessRunner::new()).unwrap();
    let summary = ctl.run_cycle(0.0).unwrap();

    // 101..105: margin well inside 5% of the mean
    assert_eq!(summary.stop_reason, StopReason::ConfidenceReached);
    assert_eq!(summary.accepted_runs, 5);
    assert_eq!(summary.runs[4].record.throughput, 105.0);

    let runs_path = dir.path().join("out").join("till_last_run_results.txt");
    let runs = fs::read_to_string(runs_path).unwrap();
    assert!(runs.starts_with("#RngRun\tRun\tT[Kbps]"));
    assert_eq!(runs.lines().count(), 6);
}
