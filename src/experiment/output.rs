//! Result tables, cycle summaries and the results archive.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use super::state::{RunRecord, StopReason};
use super::stats::{self, ConfidenceReport, Metric};
use crate::config::OutputConfig;
use crate::tpa::types::TrafficType;

/// Header of the per-cycle run table
pub fn runs_table_header(label: &str) -> String {
    format!("#RngRun\t{}\tT[Kbps]\tPl[%]\tD[ms]\tJ[ms]\tH[s]\tR\tNs\tNr\tNd\tT[s]", label)
}

/// Header of the cross-cycle means table
pub fn means_table_header(label: &str) -> String {
    let metrics: Vec<&str> = Metric::ALL.iter().map(|m| m.label()).collect();
    format!("#{}\t{}", label, metrics.join("\t"))
}

fn runs_table_row(run: &RunRecord) -> String {
    let r = &run.record;
    format!(
        "{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{}\t{}\t{}\t{}\t{}",
        run.run_index,
        run.dependent_value,
        r.throughput,
        r.packet_loss,
        r.delay,
        r.jitter,
        r.handover,
        r.r_value,
        r.sent,
        r.received,
        r.dropped,
        r.duration
    )
}

/// Rewrite the run table with every accepted run of the cycle
pub fn write_runs_table(path: &Path, label: &str, history: &[RunRecord]) -> Result<()> {
    let mut content = runs_table_header(label);
    content.push('\n');
    for run in history {
        let _ = writeln!(content, "{}", runs_table_row(run));
    }
    fs::write(path, content)
        .with_context(|| format!("Failed to write run table to {}", path.display()))?;
    log::debug!("Run table written to {} ({} runs)", path.display(), history.len());
    Ok(())
}

/// Means row of one cycle: R rounded to an integer, the dependent value
/// and the rest to 2 decimals
pub fn means_row(dependent_value: f64, history: &[RunRecord]) -> Option<String> {
    let means = stats::metric_means(history)?;
    let mut row = format!("{:.2}", dependent_value);
    for (metric, mean) in Metric::ALL.iter().zip(means) {
        match metric {
            Metric::RValue => {
                let _ = write!(row, "\t{}", mean.round() as i64);
            }
            _ => {
                let _ = write!(row, "\t{:.2}", mean);
            }
        }
    }
    Some(row)
}

/// Append the cycle's means row, writing the header first if the table is
/// new. Returns false when there was nothing to append.
pub fn append_means_row(
    path: &Path,
    label: &str,
    dependent_value: f64,
    history: &[RunRecord],
) -> Result<bool> {
    let Some(row) = means_row(dependent_value, history) else {
        log::warn!("No accepted runs, nothing appended to {}", path.display());
        return Ok(false);
    };

    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open means table {}", path.display()))?;
    if needs_header {
        writeln!(file, "{}", means_table_header(label))
            .with_context(|| format!("Failed to write means table header to {}", path.display()))?;
    }
    writeln!(file, "{}", row)
        .with_context(|| format!("Failed to append to means table {}", path.display()))?;

    log::info!("Means row appended to {}", path.display());
    Ok(true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub generated_at: String,
    pub traffic_type: TrafficType,
    pub route_optimization: bool,
    pub dependent_label: String,
    pub dependent_value: f64,
}

/// JSON report of one finished cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub metadata: SummaryMetadata,
    pub cycle: u32,
    pub stop_reason: StopReason,
    pub accepted_runs: usize,
    pub attempts: u32,
    pub discarded_runs: u32,
    pub elapsed_secs: f64,
    pub confidence: Option<ConfidenceReport>,
    pub runs: Vec<RunRecord>,
}

impl CycleSummary {
    pub fn timestamp() -> String {
        Utc::now().to_rfc3339()
    }
}

pub fn summary_path(directory: &Path, cycle: u32) -> PathBuf {
    directory.join(format!("cycle_{:03}_summary.json", cycle))
}

pub fn write_cycle_summary(directory: &Path, summary: &CycleSummary) -> Result<PathBuf> {
    let path = summary_path(directory, summary.cycle);
    let json = serde_json::to_string_pretty(summary)
        .context("Failed to serialize cycle summary to JSON")?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write cycle summary to {}", path.display()))?;
    log::info!("Cycle summary written to {}", path.display());
    Ok(path)
}

/// Name of the archived means table
pub fn archive_name(at: &DateTime<Local>) -> String {
    format!("results_mean_{}.txt", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Copy the means table to a timestamped file and remove the working
/// tables so the next experiment starts from scratch
pub fn archive_results(output: &OutputConfig, at: &DateTime<Local>) -> Result<Option<PathBuf>> {
    let means = output.means_table_path();
    let archived = if means.exists() {
        let target = output.directory.join(archive_name(at));
        fs::copy(&means, &target).with_context(|| {
            format!("Failed to archive {} to {}", means.display(), target.display())
        })?;
        fs::remove_file(&means).with_context(|| format!("Failed to remove {}", means.display()))?;
        log::info!("Means table archived to {}", target.display());
        Some(target)
    } else {
        log::warn!("No means table at {}, nothing to archive", means.display());
        None
    };

    let runs = output.runs_table_path();
    if runs.exists() {
        fs::remove_file(&runs).with_context(|| format!("Failed to remove {}", runs.display()))?;
        log::info!("Removed {}", runs.display());
    }

    Ok(archived)
}
