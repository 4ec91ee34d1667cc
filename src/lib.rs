//! # Mipv6sim - Traffic analysis and run control for Mobile IPv6 handover simulations
//!
//! This library measures application traffic in a simulated Mobile IPv6
//! handover scenario and repeats the simulation until the measurements are
//! statistically stable.
//!
//! ## Overview
//!
//! Two halves cooperate through a one-line result file:
//!
//! - The **traffic analyzer** (`tpa`) observes packets inside one simulation
//!   run, pairs sent and received packets by sequence number and computes
//!   throughput, packet loss, delay, jitter, handover time and an R-value.
//! - The **experiment controller** (`experiment`) launches the simulation
//!   again and again, reads each run's record and stops once the 95%
//!   confidence interval of every metric is within 5% of its mean.
//!
//! ## Architecture
//!
//! - `tpa`: packet classification, event recording, metrics, result record
//! - `experiment`: confidence statistics, run state machine, process runner,
//!   output tables
//! - `config`: typed YAML experiment configuration
//! - `config_loader`: configuration loading and CLI overrides
//! - `utils`: program resolution and argument templates
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use mipv6sim::config_loader;
//! use mipv6sim::experiment::{ExperimentController, ProcessRunner};
//!
//! let config = config_loader::load_config(Path::new("experiment.yaml"))?;
//! let mut controller = ExperimentController::new(config, ProcessRunner::new())?;
//! for summary in controller.run_experiment()? {
//!     println!("{} runs, {}", summary.accepted_runs, summary.stop_reason);
//! }
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! simulation:
//!   program: "./waf"
//!   args: ["--run", "mipv6 --velocity={velocity} --RngRun={rng_run} --traffic={traffic_type}"]
//!   working_dir: "/opt/ns-3-dce"
//!   timeout: "20m"
//! traffic_type: VOIP
//! parameters:
//!   velocity: 20
//! dependent_variable:
//!   parameter: velocity
//!   label: "V[k/h]"
//!   sweep: { first: 10, last: 50, increment: 10 }
//! runs:
//!   max_runs: 30
//! ```
//!
//! ## Error Handling
//!
//! Library errors are `thiserror` enums; orchestration code returns
//! `color_eyre::eyre::Result` with context attached.

pub mod config;
pub mod config_loader;
pub mod experiment;
pub mod tpa;
pub mod utils;
