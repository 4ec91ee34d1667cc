//! Packet trace replay.
//!
//! A trace is a text file with one observation per line:
//!
//! ```text
//! # direction  time_ms  frame bytes (hex)
//! tx   1000.0   60000000...
//! rx   1041.2   60000000...
//! ctl 20000.0   10000000...
//! ```
//!
//! Replaying a trace drives a [`RunContext`] exactly like live simulator
//! callbacks would.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use color_eyre::eyre::{Context, Result};
use regex::Regex;

use super::context::RunContext;
use super::types::SimTimeMs;

/// Match: "<tx|rx|ctl> <time_ms> <hex bytes>"
static TRACE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(tx|rx|ctl)\s+([0-9]+(?:\.[0-9]*)?)\s+([0-9a-fA-F]*)$")
        .expect("Invalid trace line regex")
});

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Line {line}: expected '<tx|rx|ctl> <time_ms> <hex>'")]
    Syntax { line: usize },

    #[error("Line {line}: invalid hex payload")]
    Hex {
        line: usize,
        #[source]
        source: hex::FromHexError,
    },

    #[error("Line {line}: time {time} ms goes backwards")]
    OutOfOrder { line: usize, time: SimTimeMs },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Sent,
    Received,
    Control,
}

impl FromStr for TraceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tx" => Ok(Self::Sent),
            "rx" => Ok(Self::Received),
            "ctl" => Ok(Self::Control),
            _ => Err(()),
        }
    }
}

/// One line of a trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub time_ms: SimTimeMs,
    pub frame: Vec<u8>,
}

/// Parse one trace line. Blank lines and `#` comments yield `None`.
pub fn parse_line(text: &str, line: usize) -> Result<Option<TraceEntry>, TraceError> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }
    let caps = TRACE_LINE.captures(text).ok_or(TraceError::Syntax { line })?;
    let kind = caps[1].parse().map_err(|_| TraceError::Syntax { line })?;
    let time_ms = caps[2].parse().map_err(|_| TraceError::Syntax { line })?;
    let frame = hex::decode(&caps[3]).map_err(|source| TraceError::Hex { line, source })?;
    Ok(Some(TraceEntry { kind, time_ms, frame }))
}

/// Parse a whole trace, rejecting timestamps that go backwards
pub fn parse_trace<R: BufRead>(reader: R) -> Result<Vec<TraceEntry>> {
    let mut entries = Vec::new();
    let mut last_time = f64::NEG_INFINITY;
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let text = line.with_context(|| format!("Failed to read trace line {}", line_no))?;
        if let Some(entry) = parse_line(&text, line_no)? {
            if entry.time_ms < last_time {
                return Err(TraceError::OutOfOrder {
                    line: line_no,
                    time: entry.time_ms,
                }
                .into());
            }
            last_time = entry.time_ms;
            entries.push(entry);
        }
    }
    Ok(entries)
}

pub fn load_trace(path: &Path) -> Result<Vec<TraceEntry>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open trace {}", path.display()))?;
    let entries = parse_trace(BufReader::new(file))
        .with_context(|| format!("Failed to parse trace {}", path.display()))?;
    log::info!("Loaded {} trace entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Feed trace entries into the run context
pub fn replay(ctx: &mut RunContext, entries: &[TraceEntry]) {
    for entry in entries {
        match entry.kind {
            TraceKind::Sent => {
                ctx.on_packet_sent(&entry.frame, entry.time_ms);
            }
            TraceKind::Received => {
                ctx.on_packet_received(&entry.frame, entry.time_ms);
            }
            TraceKind::Control => {
                ctx.on_control_packet(&entry.frame, entry.time_ms);
            }
        }
    }
}
