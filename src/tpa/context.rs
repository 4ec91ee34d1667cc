//! Run-scoped analyzer state.
//!
//! A `RunContext` is created when a simulation run starts, receives the
//! simulator's packet callbacks in timestamp order and is consumed by
//! [`RunContext::finish`] when the run ends.

use std::path::PathBuf;

use color_eyre::eyre::Result;

use super::classifier::{AnalyzerConfig, Classifier, ClassifierError};
use super::control::{ControlMatch, ControlRecorder, ControlRules};
use super::metrics::{self, RunMetrics};
use super::record::{self, ResultRecord};
use super::types::{ControlEvents, ReceivedEvent, SentEvent, SimTimeMs};

/// Counters of packets handed to the analyzer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservationCounts {
    pub sent_observed: usize,
    pub received_observed: usize,
    pub control_observed: usize,
}

/// Event store and classifier for one simulation run
#[derive(Debug)]
pub struct RunContext {
    classifier: Classifier,
    control: ControlRecorder,
    sent: Vec<SentEvent>,
    received: Vec<ReceivedEvent>,
    counts: ObservationCounts,
}

impl RunContext {
    pub fn new(config: &AnalyzerConfig, rules: ControlRules) -> Result<Self, ClassifierError> {
        Self::with_capacity(config, rules, 0)
    }

    /// `expected_packets` preallocates the event stores; it is not a limit
    pub fn with_capacity(
        config: &AnalyzerConfig,
        rules: ControlRules,
        expected_packets: usize,
    ) -> Result<Self, ClassifierError> {
        let classifier = Classifier::new(config)?;
        log::info!(
            "Analyzing {} traffic (route optimization: {})",
            config.traffic_type,
            config.route_optimization
        );
        Ok(Self {
            classifier,
            control: ControlRecorder::new(rules),
            sent: Vec::with_capacity(expected_packets),
            received: Vec::with_capacity(expected_packets),
            counts: ObservationCounts::default(),
        })
    }

    /// "Packet sent" callback
    pub fn on_packet_sent(&mut self, packet: &[u8], now: SimTimeMs) -> bool {
        self.counts.sent_observed += 1;
        match self.classifier.classify_sent(packet, now) {
            Some(event) => {
                self.sent.push(event);
                true
            }
            None => false,
        }
    }

    /// "Packet received" callback
    pub fn on_packet_received(&mut self, packet: &[u8], now: SimTimeMs) -> bool {
        self.counts.received_observed += 1;
        match self.classifier.classify_received(packet, now) {
            Some(event) => {
                self.received.push(event);
                true
            }
            None => false,
        }
    }

    /// "Control packet observed" callback
    pub fn on_control_packet(&mut self, frame: &[u8], now: SimTimeMs) -> Option<ControlMatch> {
        self.counts.control_observed += 1;
        self.control.observe(frame, now)
    }

    pub fn sent_events(&self) -> &[SentEvent] {
        &self.sent
    }

    pub fn received_events(&self) -> &[ReceivedEvent] {
        &self.received
    }

    pub fn control_events(&self) -> ControlEvents {
        self.control.events()
    }

    pub fn counts(&self) -> ObservationCounts {
        self.counts
    }

    /// "Run end" trigger
    pub fn finish(self) -> RunReport {
        let metrics = RunMetrics::compute(&self.sent, &self.received, &self.control.events());
        log::info!(
            "Run finished: {} sent / {} received data packets ({} / {} observed)",
            self.sent.len(),
            self.received.len(),
            self.counts.sent_observed,
            self.counts.received_observed
        );
        RunReport {
            record: ResultRecord::from_metrics(&metrics),
            metrics,
            received: self.received,
            counts: self.counts,
        }
    }
}

/// Where the outputs of a finished run go
#[derive(Debug, Clone, Default)]
pub struct RunOutputs {
    pub result_file: Option<PathBuf>,
    pub throughput_file: Option<PathBuf>,
    /// Print the column table to stdout
    pub print_table: bool,
    pub column_labels: bool,
}

/// Everything computed at the end of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub metrics: RunMetrics,
    pub record: ResultRecord,
    pub received: Vec<ReceivedEvent>,
    pub counts: ObservationCounts,
}

impl RunReport {
    /// Per-second throughput, only built when asked for
    pub fn throughput_series(&self) -> Vec<(u64, u64)> {
        metrics::throughput_series(&self.received)
    }

    pub fn emit(&self, outputs: &RunOutputs) -> Result<()> {
        if outputs.print_table {
            print!("{}", record::format_table(&self.record, outputs.column_labels));
        }
        if let Some(path) = &outputs.result_file {
            self.record.write_to(path)?;
        }
        if let Some(path) = &outputs.throughput_file {
            record::write_throughput_series(&self.throughput_series(), path)?;
        }
        Ok(())
    }
}
