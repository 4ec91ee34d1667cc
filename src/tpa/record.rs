//! Single-run result record exchanged between the analyzer and the
//! experiment controller, plus the human-readable renderings of a run.
//!
//! The record is one line of ten `*`-separated fields:
//!
//! ```text
//! Th[Kbps]*Pl[%]*D[ms]*J[ms]*H[s]*R*Ns*Nr*Nd*T[s]
//! ```
//!
//! Floats carry two decimals, R and the duration are rounded integers.
//! A metric the analyzer could not compute is written as `-1`.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use super::metrics::{MetricValue, RunMetrics};

pub const FIELD_SEPARATOR: char = '*';
pub const FIELD_COUNT: usize = 10;
pub const UNAVAILABLE: f64 = -1.0;

/// Column headings shared by the run table and the column print-out
pub const COLUMN_LABELS: [&str; FIELD_COUNT] =
    ["Th[Kbps]", "Pl[%]", "D[ms]", "J[ms]", "H[s]", "R", "Ns", "Nr", "Nd", "T[s]"];

pub const THROUGHPUT_SERIES_HEADER: &str = "#Time_interval Throughput[Kbps]";

/// Errors reading a result record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Result record is empty")]
    Empty,

    #[error("Result record has {found} fields, expected 10")]
    FieldCount { found: usize },

    #[error("Invalid value '{value}' in field {field}")]
    InvalidField { field: &'static str, value: String },

    #[error("Result record could not be read: {0}")]
    Unreadable(String),
}

/// Parsed single-run result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub throughput: f64,
    pub packet_loss: f64,
    pub delay: f64,
    pub jitter: f64,
    pub handover: f64,
    pub r_value: i64,
    pub sent: i64,
    pub received: i64,
    pub dropped: i64,
    pub duration: i64,
}

fn or_unavailable(value: &MetricValue) -> f64 {
    value.as_ref().copied().unwrap_or(UNAVAILABLE)
}

impl ResultRecord {
    /// Round metrics to the precision carried by the record
    pub fn from_metrics(metrics: &RunMetrics) -> Self {
        let round2 = |v: f64| (v * 100.0).round() / 100.0;
        Self {
            throughput: round2(or_unavailable(&metrics.throughput)),
            packet_loss: round2(or_unavailable(&metrics.packet_loss)),
            delay: round2(or_unavailable(&metrics.delay)),
            jitter: round2(or_unavailable(&metrics.jitter)),
            handover: round2(or_unavailable(&metrics.handover)),
            r_value: metrics
                .r_value
                .map(|r| r.round() as i64)
                .unwrap_or(UNAVAILABLE as i64),
            sent: metrics.sent as i64,
            received: metrics.received as i64,
            dropped: metrics.dropped(),
            duration: metrics
                .duration
                .map(|d| d.round() as i64)
                .unwrap_or(UNAVAILABLE as i64),
        }
    }

    /// Encode as a single line without trailing separator or newline
    pub fn encode(&self) -> String {
        format!(
            "{:.2}*{:.2}*{:.2}*{:.2}*{:.2}*{}*{}*{}*{}*{}",
            self.throughput,
            self.packet_loss,
            self.delay,
            self.jitter,
            self.handover,
            self.r_value,
            self.sent,
            self.received,
            self.dropped,
            self.duration
        )
    }

    /// Check the record describes a usable run: loss and handover not
    /// negative, delay, jitter and R strictly positive, throughput present,
    /// every float finite
    pub fn is_sane(&self) -> bool {
        [self.throughput, self.packet_loss, self.delay, self.jitter, self.handover]
            .iter()
            .all(|v| v.is_finite())
            && self.throughput >= 0.0
            && self.packet_loss >= 0.0
            && self.delay > 0.0
            && self.jitter > 0.0
            && self.handover >= 0.0
            && self.r_value > 0
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.encode())
            .with_context(|| format!("Failed to write result record to {}", path.display()))?;
        log::info!("Result record written to {}", path.display());
        Ok(())
    }
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value.trim().parse().map_err(|_| RecordError::InvalidField {
        field,
        value: value.to_string(),
    })
}

impl FromStr for ResultRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        if line.is_empty() {
            return Err(RecordError::Empty);
        }
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != FIELD_COUNT {
            return Err(RecordError::FieldCount { found: fields.len() });
        }
        Ok(Self {
            throughput: parse_field("throughput", fields[0])?,
            packet_loss: parse_field("packet_loss", fields[1])?,
            delay: parse_field("delay", fields[2])?,
            jitter: parse_field("jitter", fields[3])?,
            handover: parse_field("handover", fields[4])?,
            r_value: parse_field("r_value", fields[5])?,
            sent: parse_field("sent", fields[6])?,
            received: parse_field("received", fields[7])?,
            dropped: parse_field("dropped", fields[8])?,
            duration: parse_field("duration", fields[9])?,
        })
    }
}

/// Column-aligned rendering of one run, optionally with headings
pub fn format_table(record: &ResultRecord, with_labels: bool) -> String {
    const WIDTHS: [usize; FIELD_COUNT] = [10, 8, 8, 8, 8, 8, 8, 8, 8, 8];

    let mut out = String::new();
    if with_labels {
        for (label, width) in COLUMN_LABELS.iter().zip(WIDTHS) {
            let _ = write!(out, "{:<width$}", label, width = width);
        }
        out.push('\n');
    }
    let values = [
        format!("{:.2}", record.throughput),
        format!("{:.2}", record.packet_loss),
        format!("{:.2}", record.delay),
        format!("{:.2}", record.jitter),
        format!("{:.2}", record.handover),
        record.r_value.to_string(),
        record.sent.to_string(),
        record.received.to_string(),
        record.dropped.to_string(),
        record.duration.to_string(),
    ];
    for (value, width) in values.iter().zip(WIDTHS) {
        let _ = write!(out, "{:<width$}", value, width = width);
    }
    out.push('\n');
    out
}

/// Write the per-second throughput series
pub fn write_throughput_series(series: &[(u64, u64)], path: &Path) -> Result<()> {
    let mut content = String::from(THROUGHPUT_SERIES_HEADER);
    content.push('\n');
    for (second, kbps) in series {
        let _ = writeln!(content, "{}\t{}", second, kbps);
    }
    fs::write(path, content)
        .with_context(|| format!("Failed to write throughput series to {}", path.display()))?;
    log::info!("Throughput series written to {}", path.display());
    Ok(())
}
