use crate::config::ExperimentConfig;
use color_eyre::eyre::{Context, Result};
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Load, resolve and validate an experiment configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<ExperimentConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open configuration {}", config_path.display()))?;

    let mut config: ExperimentConfig = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse configuration {}", config_path.display()))?;

    // Relative directories are taken from the configuration file location
    let base = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.resolve_relative_paths(&base);

    config.validate()?;

    info!(
        "Experiment: {} traffic, {} cycle(s), up to {} runs each",
        config.traffic_type,
        config.cycle_values().len(),
        config.runs.effective_max_runs()
    );

    Ok(config)
}

/// CLI arguments that override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_runs: Option<u32>,
    pub output_dir: Option<PathBuf>,
}

/// Apply CLI overrides to a loaded configuration
pub fn apply_overrides(config: &mut ExperimentConfig, overrides: &CliOverrides) -> Result<()> {
    if let Some(max_runs) = overrides.max_runs {
        info!("Overriding max_runs: {} -> {}", config.runs.max_runs, max_runs);
        config.runs.max_runs = max_runs;
    }

    if let Some(dir) = &overrides.output_dir {
        info!("Overriding output directory: {}", dir.display());
        config.output.directory = dir.clone();
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}
