//! Traffic performance analysis of a recorded packet trace.
//!
//! Feeds a `tx|rx|ctl <time_ms> <hex>` trace through the analyzer as if the
//! simulator were calling it, then writes the one-line result record and,
//! on request, the throughput series and the column table.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, Context, Result};

use mipv6sim::config_loader;
use mipv6sim::tpa::context::{RunContext, RunOutputs};
use mipv6sim::tpa::headers::parse_mac;
use mipv6sim::tpa::trace;
use mipv6sim::tpa::types::LinkFraming;
use mipv6sim::tpa::{AnalyzerConfig, ControlRules, TrafficType};

#[derive(Parser)]
#[command(name = "tpa-replay")]
#[command(about = "Traffic performance analysis of a recorded packet trace")]
#[command(version)]
struct Cli {
    /// Trace file
    trace: PathBuf,

    /// Take traffic type and route optimization from an experiment configuration
    #[arg(short, long, conflicts_with_all = ["traffic", "route_optimization"])]
    config: Option<PathBuf>,

    /// Traffic type name (PING, UDPCBR, VOIP, VIDEO_S) or code (1-5)
    #[arg(short, long, default_value = "PING")]
    traffic: TrafficType,

    /// Analyse route-optimized traffic (PING only)
    #[arg(long)]
    route_optimization: bool,

    /// Received packets still carry an Ethernet header
    #[arg(long)]
    received_ethernet: bool,

    /// Where to write the result record
    #[arg(short, long, default_value = "tempresults.txt")]
    result_file: PathBuf,

    /// Also write the per-second throughput series
    #[arg(long)]
    throughput_file: Option<PathBuf>,

    /// Print the column table
    #[arg(long)]
    table: bool,

    /// Omit the column headings from the table
    #[arg(long, requires = "table")]
    no_labels: bool,

    /// MAC address of the mobile node
    #[arg(long, default_value = "00:00:00:00:00:10")]
    mobile_node_mac: String,

    /// Control frames up to this time are ignored
    #[arg(long, default_value = "16000")]
    warmup_ms: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mobile_node_mac = parse_mac(&cli.mobile_node_mac)
        .ok_or_else(|| eyre!("Invalid MAC address: {}", cli.mobile_node_mac))?;
    let rules = ControlRules {
        warmup_ms: cli.warmup_ms,
        mobile_node_mac,
        ..ControlRules::default()
    };

    let mut analyzer = match &cli.config {
        Some(path) => config_loader::load_config(path)?.analyzer_config(),
        None => AnalyzerConfig {
            route_optimization: cli.route_optimization,
            ..AnalyzerConfig::new(cli.traffic)
        },
    };
    if cli.received_ethernet {
        analyzer.received_framing = Some(LinkFraming::Ethernet);
    }

    let entries = trace::load_trace(&cli.trace)?;
    let mut ctx = RunContext::with_capacity(&analyzer, rules, entries.len() / 2)
        .wrap_err("Invalid analyzer configuration")?;
    trace::replay(&mut ctx, &entries);

    let report = ctx.finish();
    log::info!("Result record: {}", report.record.encode());

    report.emit(&RunOutputs {
        result_file: Some(cli.result_file),
        throughput_file: cli.throughput_file,
        print_table: cli.table,
        column_labels: !cli.no_labels,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["tpa-replay", "ping.trace"]);
        assert_eq!(cli.traffic, TrafficType::Ping);
        assert_eq!(cli.result_file, PathBuf::from("tempresults.txt"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_config_conflicts_with_traffic() {
        let parsed =
            Cli::try_parse_from(["tpa-replay", "t.trace", "-c", "e.yaml", "--traffic", "VOIP"]);
        assert!(parsed.is_err());
        let cli = Cli::try_parse_from(["tpa-replay", "t.trace", "--config", "e.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("e.yaml")));
    }
}
