//! Experiment configuration.
//!
//! One YAML file describes the simulation command, the traffic under test,
//! the swept dependent variable and the run limits of every cycle.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tpa::classifier::{AnalyzerConfig, TrafficProfile};
use crate::tpa::types::TrafficType;
use crate::utils::template;

/// Placeholder filled with the 1-based attempt index of the cycle
pub const RNG_RUN_PLACEHOLDER: &str = "rng_run";
/// Placeholder filled with the numeric traffic type code
pub const TRAFFIC_TYPE_PLACEHOLDER: &str = "traffic_type";

pub const MIN_SEQUENTIAL_RUNS: u32 = 6;
pub const MAX_RUNS_LIMIT: u32 = 100;
/// Upper bound on the number of cycles a sweep may produce
pub const MAX_SWEEP_CYCLES: u32 = 10_000;

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_result_file() -> PathBuf {
    PathBuf::from("tempresults.txt")
}

fn default_timeout() -> Duration {
    Duration::from_secs(20 * 60)
}

fn default_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_max_runs() -> u32 {
    MAX_RUNS_LIMIT
}

fn default_max_attempts() -> u32 {
    200
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_runs_table() -> String {
    "till_last_run_results.txt".to_string()
}

fn default_means_table() -> String {
    "results_mean.txt".to_string()
}

/// Top-level experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub simulation: SimulationConfig,
    pub traffic_type: TrafficType,
    #[serde(default)]
    pub route_optimization: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_variable: Option<DependentVariable>,
    #[serde(default)]
    pub runs: RunLimits,
    #[serde(default)]
    pub output: OutputConfig,
}

/// How to launch one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Interchange record written by the analyzer, relative to `working_dir`
    #[serde(default = "default_result_file")]
    pub result_file: PathBuf,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Pause between consecutive runs
    #[serde(default = "default_pause", with = "humantime_serde")]
    pub pause: Duration,
}

impl SimulationConfig {
    pub fn result_path(&self) -> PathBuf {
        if self.result_file.is_absolute() {
            self.result_file.clone()
        } else {
            self.working_dir.join(&self.result_file)
        }
    }
}

/// Scalar simulation parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Text(s) => s.trim().parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// The independent variable recorded with every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependentVariable {
    /// Key of `parameters`
    pub parameter: String,
    /// Column heading in the output tables, e.g. `V[k/h]`
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<Sweep>,
}

/// Range of values visited one cycle at a time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub first: f64,
    pub last: f64,
    pub increment: f64,
}

impl Sweep {
    /// Values from `first` to `last` inclusive
    pub fn values(&self) -> Vec<f64> {
        // Tolerate accumulated rounding on the last step
        let epsilon = self.increment.abs() * 1e-9;
        let mut values = Vec::new();
        let mut step = 0u32;
        loop {
            let v = self.first + step as f64 * self.increment;
            if v > self.last + epsilon {
                break;
            }
            values.push(v);
            step += 1;
        }
        values
    }
}

/// Run limits of one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLimits {
    /// 1 runs a single simulation; anything else is clamped to [6, 100]
    #[serde(default = "default_max_runs")]
    pub max_runs: u32,
    /// Launches per cycle, accepted or not, before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_runs: default_max_runs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RunLimits {
    pub fn is_single_shot(&self) -> bool {
        self.max_runs == 1
    }

    pub fn effective_max_runs(&self) -> u32 {
        if self.is_single_shot() {
            1
        } else {
            self.max_runs.clamp(MIN_SEQUENTIAL_RUNS, MAX_RUNS_LIMIT)
        }
    }
}

/// Where the tables go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_runs_table")]
    pub runs_table: String,
    #[serde(default = "default_means_table")]
    pub means_table: String,
    /// Write a JSON summary per cycle
    #[serde(default)]
    pub summary_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            runs_table: default_runs_table(),
            means_table: default_means_table(),
            summary_json: false,
        }
    }
}

impl OutputConfig {
    pub fn runs_table_path(&self) -> PathBuf {
        self.directory.join(&self.runs_table)
    }

    pub fn means_table_path(&self) -> PathBuf {
        self.directory.join(&self.means_table)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid simulation configuration: {0}")]
    InvalidSimulation(String),
    #[error("Invalid traffic configuration: {0}")]
    InvalidTraffic(String),
    #[error("Invalid dependent variable: {0}")]
    InvalidDependentVariable(String),
    #[error("Invalid run limits: {0}")]
    InvalidRuns(String),
    #[error("Invalid output configuration: {0}")]
    InvalidOutput(String),
}

impl ExperimentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.simulation.program.trim().is_empty() {
            return Err(ValidationError::InvalidSimulation(
                "program cannot be empty".to_string(),
            ));
        }
        if self.simulation.timeout.is_zero() {
            return Err(ValidationError::InvalidSimulation(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.simulation.result_file.as_os_str().is_empty() {
            return Err(ValidationError::InvalidSimulation(
                "result_file cannot be empty".to_string(),
            ));
        }

        self.validate_traffic()?;
        self.validate_templates()?;
        self.validate_dependent_variable()?;

        if self.runs.max_attempts == 0 {
            return Err(ValidationError::InvalidRuns(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.runs.max_attempts < self.runs.effective_max_runs() {
            return Err(ValidationError::InvalidRuns(format!(
                "max_attempts ({}) is lower than max_runs ({})",
                self.runs.max_attempts,
                self.runs.effective_max_runs()
            )));
        }

        if self.output.runs_table.is_empty() || self.output.means_table.is_empty() {
            return Err(ValidationError::InvalidOutput(
                "table file names cannot be empty".to_string(),
            ));
        }
        if self.output.runs_table == self.output.means_table {
            return Err(ValidationError::InvalidOutput(
                "runs_table and means_table must differ".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_traffic(&self) -> Result<(), ValidationError> {
        TrafficProfile::try_from(self.traffic_type)
            .map_err(|e| ValidationError::InvalidTraffic(e.to_string()))?;
        if self.route_optimization && self.traffic_type != TrafficType::Ping {
            return Err(ValidationError::InvalidTraffic(format!(
                "route optimization is only analysed for PING, not {}",
                self.traffic_type
            )));
        }
        Ok(())
    }

    fn validate_templates(&self) -> Result<(), ValidationError> {
        for name in [RNG_RUN_PLACEHOLDER, TRAFFIC_TYPE_PLACEHOLDER] {
            if self.parameters.contains_key(name) {
                return Err(ValidationError::InvalidSimulation(format!(
                    "parameter '{}' is reserved",
                    name
                )));
            }
        }
        for arg in &self.simulation.args {
            for name in template::placeholders(arg) {
                let known = name == RNG_RUN_PLACEHOLDER
                    || name == TRAFFIC_TYPE_PLACEHOLDER
                    || self.parameters.contains_key(name);
                if !known {
                    return Err(ValidationError::InvalidSimulation(format!(
                        "unknown placeholder {{{}}} in argument '{}'",
                        name, arg
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_dependent_variable(&self) -> Result<(), ValidationError> {
        let Some(dep) = &self.dependent_variable else {
            return Ok(());
        };
        if dep.label.trim().is_empty() {
            return Err(ValidationError::InvalidDependentVariable(
                "label cannot be empty".to_string(),
            ));
        }
        let value = self.parameters.get(&dep.parameter).ok_or_else(|| {
            ValidationError::InvalidDependentVariable(format!(
                "'{}' is not one of the parameters",
                dep.parameter
            ))
        })?;
        if value.as_f64().is_none() {
            return Err(ValidationError::InvalidDependentVariable(format!(
                "'{}' must be numeric, got '{}'",
                dep.parameter, value
            )));
        }
        if let Some(sweep) = &dep.sweep {
            let fields = [
                ("first", sweep.first),
                ("last", sweep.last),
                ("increment", sweep.increment),
            ];
            if let Some((name, v)) = fields.iter().find(|(_, v)| !v.is_finite()) {
                return Err(ValidationError::InvalidDependentVariable(format!(
                    "sweep {} must be a finite number, got {}",
                    name, v
                )));
            }
            if !(sweep.increment > 0.0) {
                return Err(ValidationError::InvalidDependentVariable(
                    "sweep increment must be positive".to_string(),
                ));
            }
            if sweep.last < sweep.first {
                return Err(ValidationError::InvalidDependentVariable(format!(
                    "sweep last ({}) is below first ({})",
                    sweep.last, sweep.first
                )));
            }
            let cycles = ((sweep.last - sweep.first) / sweep.increment).floor() + 1.0;
            if cycles > MAX_SWEEP_CYCLES as f64 {
                return Err(ValidationError::InvalidDependentVariable(format!(
                    "sweep spans {} cycles, at most {} allowed",
                    cycles, MAX_SWEEP_CYCLES
                )));
            }
        }
        Ok(())
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            route_optimization: self.route_optimization,
            ..AnalyzerConfig::new(self.traffic_type)
        }
    }

    /// Values of the dependent variable, one per cycle. Without a
    /// dependent variable there is a single cycle recorded as 0.
    pub fn cycle_values(&self) -> Vec<f64> {
        match &self.dependent_variable {
            Some(DependentVariable { sweep: Some(sweep), .. }) => sweep.values(),
            Some(dep) => vec![self
                .parameters
                .get(&dep.parameter)
                .and_then(ParamValue::as_f64)
                .unwrap_or_default()],
            None => vec![0.0],
        }
    }

    /// Heading of the dependent variable column
    pub fn dependent_label(&self) -> &str {
        self.dependent_variable
            .as_ref()
            .map(|d| d.label.as_str())
            .unwrap_or("Run")
    }

    /// Placeholder values for one launch
    pub fn placeholder_values(
        &self,
        dependent_value: f64,
        rng_run: u32,
    ) -> BTreeMap<String, String> {
        let mut values: BTreeMap<String, String> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        if let Some(dep) = &self.dependent_variable {
            values.insert(dep.parameter.clone(), dependent_value.to_string());
        }
        values.insert(RNG_RUN_PLACEHOLDER.to_string(), rng_run.to_string());
        values.insert(
            TRAFFIC_TYPE_PLACEHOLDER.to_string(),
            self.traffic_type.code().to_string(),
        );
        values
    }

    /// Resolve `working_dir` and `output.directory` against the directory
    /// holding the configuration file
    pub fn resolve_relative_paths(&mut self, base: &Path) {
        if self.simulation.working_dir.is_relative() {
            self.simulation.working_dir = base.join(&self.simulation.working_dir);
        }
        if self.output.directory.is_relative() {
            self.output.directory = base.join(&self.output.directory);
        }
    }
}
