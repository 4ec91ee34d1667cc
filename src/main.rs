use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::{Path, PathBuf};

use mipv6sim::config::ExperimentConfig;
use mipv6sim::config_loader::{self, CliOverrides};
use mipv6sim::experiment::{output, ExperimentController, ProcessRunner};
use mipv6sim::utils::{self, template};

/// Repeated Mobile IPv6 handover simulations with confidence-interval stopping
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every cycle of the experiment
    Run {
        /// Path to the experiment configuration YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the run cap (1 = single run)
        #[arg(long)]
        max_runs: Option<u32>,

        /// Override the output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Show the simulation's own output
        #[arg(long)]
        show_output: bool,
    },

    /// Validate the configuration and print the first launch of each cycle
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Archive the means table under a timestamped name and clear the tables
    Archive {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

fn load(config: &Path, overrides: &CliOverrides) -> Result<ExperimentConfig> {
    let mut config = config_loader::load_config(config)?;
    config_loader::apply_overrides(&mut config, overrides)?;
    Ok(config)
}

/// Replace the configured program with its resolved, executable path
fn resolve_program(config: &mut ExperimentConfig) -> Result<()> {
    let simulation = &config.simulation;
    let resolved = utils::validate_program_spec(&simulation.program, &simulation.working_dir)
        .wrap_err_with(|| format!("Cannot use simulation program '{}'", simulation.program))?;
    info!("Simulation program: {}", resolved.display());
    config.simulation.program = resolved.display().to_string();
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    match args.command {
        Command::Run {
            config,
            max_runs,
            output_dir,
            show_output,
        } => {
            let mut config = load(&config, &CliOverrides { max_runs, output_dir })?;
            resolve_program(&mut config)?;

            let runner = ProcessRunner::new().with_output(show_output);
            let mut controller = ExperimentController::new(config, runner)?;
            let summaries = controller.run_experiment()?;

            for s in &summaries {
                info!(
                    "{} = {}: {} accepted / {} attempts ({})",
                    s.metadata.dependent_label,
                    s.metadata.dependent_value,
                    s.accepted_runs,
                    s.attempts,
                    s.stop_reason
                );
            }
            info!(
                "Means table: {}",
                controller.config().output.means_table_path().display()
            );
        }
        Command::Check { config } => {
            let mut config = load(&config, &CliOverrides::default())?;
            resolve_program(&mut config)?;
            for value in config.cycle_values() {
                let values = config.placeholder_values(value, 1);
                let args = config
                    .simulation
                    .args
                    .iter()
                    .map(|a| template::expand(a, &values))
                    .collect::<Result<Vec<_>, _>>()?;
                println!("{} {}", config.simulation.program, args.join(" "));
            }
            info!("Configuration OK");
        }
        Command::Archive { config, output_dir } => {
            let config = load(
                &config,
                &CliOverrides {
                    max_runs: None,
                    output_dir,
                },
            )?;
            match output::archive_results(&config.output, &chrono::Local::now())? {
                Some(path) => info!("Archived results to {}", path.display()),
                None => info!("Nothing to archive"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "mipv6sim",
            "run",
            "--config",
            "experiment.yaml",
            "--max-runs",
            "1",
        ]);
        match args.command {
            Command::Run { config, max_runs, output_dir, show_output } => {
                assert_eq!(config, PathBuf::from("experiment.yaml"));
                assert_eq!(max_runs, Some(1));
                assert_eq!(output_dir, None);
                assert!(!show_output);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_global_log_level() {
        let args = Args::parse_from(["mipv6sim", "check", "-c", "e.yaml", "--log-level", "debug"]);
        assert_eq!(args.log_level, "debug");
        assert!(matches!(args.command, Command::Check { .. }));
    }
}
