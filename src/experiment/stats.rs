//! Confidence-interval stopping rule.
//!
//! After every accepted run each published metric is checked on its own:
//! the 95% error margin `1.96 * s / sqrt(N)` must not exceed 5% of the
//! metric's mean. Packet loss and jitter are allowed an extra 0.05 of
//! slack. The cycle may stop once every metric passes.

use serde::{Deserialize, Serialize};

use super::state::RunRecord;
use crate::tpa::record::ResultRecord;

/// z-value of a two-sided 95% confidence interval
pub const Z_95: f64 = 1.96;
/// Target interval as a fraction of the mean
pub const TARGET_FRACTION: f64 = 0.05;
/// Slack subtracted from the margin of the relaxed metrics
pub const RELAXATION: f64 = 0.05;
/// Accepted runs collected before the first confidence check
pub const MIN_SAMPLE_RUNS: usize = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatsError {
    #[error("Confidence check needs at least 2 runs, got {runs}")]
    TooFewRuns { runs: usize },
}

/// The six metrics published per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Throughput,
    PacketLoss,
    Delay,
    Jitter,
    Handover,
    RValue,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Throughput,
        Metric::PacketLoss,
        Metric::Delay,
        Metric::Jitter,
        Metric::Handover,
        Metric::RValue,
    ];

    /// Column heading in the output tables
    pub fn label(self) -> &'static str {
        match self {
            Metric::Throughput => "T[Kbps]",
            Metric::PacketLoss => "Pl[%]",
            Metric::Delay => "D[ms]",
            Metric::Jitter => "J[ms]",
            Metric::Handover => "H[s]",
            Metric::RValue => "R",
        }
    }

    pub fn value(self, record: &ResultRecord) -> f64 {
        match self {
            Metric::Throughput => record.throughput,
            Metric::PacketLoss => record.packet_loss,
            Metric::Delay => record.delay,
            Metric::Jitter => record.jitter,
            Metric::Handover => record.handover,
            Metric::RValue => record.r_value as f64,
        }
    }

    /// Noisy low-magnitude metrics checked with `margin - 0.05 <= target`
    pub fn is_relaxed(self) -> bool {
        matches!(self, Metric::PacketLoss | Metric::Jitter)
    }
}

/// Confidence statistics of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: Metric,
    pub mean: f64,
    pub std_dev: f64,
    /// 5% of the mean
    pub target: f64,
    /// 95% error margin
    pub margin: f64,
    pub passed: bool,
}

/// Result of one confidence check over the accepted runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub runs: usize,
    pub metrics: Vec<MetricSummary>,
}

impl ConfidenceReport {
    pub fn all_passed(&self) -> bool {
        self.metrics.iter().all(|m| m.passed)
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.metric == metric)
    }

    pub fn failing(&self) -> impl Iterator<Item = Metric> + '_ {
        self.metrics.iter().filter(|m| !m.passed).map(|m| m.metric)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (N-1 denominator)
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

pub fn summarize(metric: Metric, values: &[f64]) -> Result<MetricSummary, StatsError> {
    let runs = values.len();
    let (mean, std_dev) = match (mean(values), sample_std_dev(values)) {
        (Some(m), Some(s)) => (m, s),
        _ => return Err(StatsError::TooFewRuns { runs }),
    };
    let target = TARGET_FRACTION * mean;
    let margin = Z_95 * std_dev / (runs as f64).sqrt();
    let passed = if metric.is_relaxed() {
        margin - RELAXATION <= target
    } else {
        margin <= target
    };
    Ok(MetricSummary {
        metric,
        mean,
        std_dev,
        target,
        margin,
        passed,
    })
}

/// Run the per-metric check over the accepted run history
pub fn check_confidence(history: &[RunRecord]) -> Result<ConfidenceReport, StatsError> {
    let metrics = Metric::ALL
        .into_iter()
        .map(|metric| {
            let values: Vec<f64> = history.iter().map(|r| metric.value(&r.record)).collect();
            summarize(metric, &values)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ConfidenceReport {
        runs: history.len(),
        metrics,
    })
}

/// Mean of every metric, in `Metric::ALL` order
pub fn metric_means(history: &[RunRecord]) -> Option<[f64; 6]> {
    if history.is_empty() {
        return None;
    }
    let mut means = [0.0; 6];
    for (slot, metric) in means.iter_mut().zip(Metric::ALL) {
        let values: Vec<f64> = history.iter().map(|r| metric.value(&r.record)).collect();
        *slot = mean(&values)?;
    }
    Some(means)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(throughput: f64) -> ResultRecord {
        ResultRecord {
            throughput,
            packet_loss: 1.5,
            delay: 40.0,
            jitter: 2.0,
            handover: 1.2,
            r_value: 88,
            sent: 1000,
            received: 985,
            dropped: 15,
            duration: 100,
        }
    }

    fn history(throughputs: &[f64]) -> Vec<RunRecord> {
        throughputs
            .iter()
            .enumerate()
            .map(|(i, &t)| RunRecord {
                run_index: i as u32 + 1,
                dependent_value: 20.0,
                record: record(t),
            })
            .collect()
    }

    #[test]
    fn test_sample_std_dev() {
        assert_eq!(sample_std_dev(&[1.0]), None);
        let s = sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((s - 2.138).abs() < 1e-3);
    }

    #[test]
    fn test_identical_runs_pass_immediately() {
        let report = check_confidence(&history(&[100.0; 5])).unwrap();
        assert_eq!(report.runs, 5);
        assert!(report.metrics.iter().all(|m| m.std_dev == 0.0 && m.margin == 0.0));
        assert!(report.all_passed());
    }

    #[test]
    fn test_margin_against_target() {
        // mean 103, s = sqrt(45), margin 5.88 > target 5.15
        let report = check_confidence(&history(&[100.0, 100.0, 100.0, 100.0, 115.0])).unwrap();
        let th = report.get(Metric::Throughput).unwrap();
        assert!((th.mean - 103.0).abs() < 1e-9);
        assert!((th.target - 5.15).abs() < 1e-9);
        assert!((th.margin - 1.96 * 45f64.sqrt() / 5f64.sqrt()).abs() < 1e-9);
        assert!(!th.passed);
        assert_eq!(report.failing().collect::<Vec<_>>(), vec![Metric::Throughput]);

        // One more run near the mean: s = 6, margin 4.80 <= 5.15
        let report =
            check_confidence(&history(&[100.0, 100.0, 100.0, 100.0, 115.0, 103.0])).unwrap();
        assert!(report.all_passed());
    }

    #[test]
    fn test_relaxed_rule_only_for_loss_and_jitter() {
        // margin 0.0196 against a target of 0.0005 only passes with the slack
        let values = [0.0, 0.0, 0.0, 0.0, 0.05];
        let margin = Z_95 * sample_std_dev(&values).unwrap() / 5f64.sqrt();
        assert!(margin > 0.0 && margin <= RELAXATION);

        for metric in Metric::ALL {
            let summary = summarize(metric, &values).unwrap();
            assert_eq!(summary.passed, metric.is_relaxed(), "{:?}", metric);
        }
    }

    #[test]
    fn test_too_few_runs() {
        assert_eq!(
            check_confidence(&history(&[1.0])),
            Err(StatsError::TooFewRuns { runs: 1 })
        );
    }

    #[test]
    fn test_metric_means() {
        assert_eq!(metric_means(&[]), None);
        let means = metric_means(&history(&[100.0, 110.0])).unwrap();
        assert_eq!(means, [105.0, 1.5, 40.0, 2.0, 1.2, 88.0]);
    }
}
