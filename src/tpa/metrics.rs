//! Traffic performance metrics for one run.
//!
//! All calculators are pure functions over the recorded events. A metric
//! that cannot be computed yields a `MetricError` instead of NaN.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{ControlEvents, ReceivedEvent, SentEvent};

/// A metric whose preconditions were not met
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MetricError {
    #[error(
        "Insufficient data: throughput needs at least 2 received packets spread over time, \
         got {received}"
    )]
    Throughput { received: usize },

    #[error("Insufficient data: packet loss needs at least one sent packet")]
    PacketLoss,

    #[error("Insufficient data: no sent packet was matched to a received packet")]
    Delay,

    #[error("Insufficient data: jitter needs at least 3 delay samples, got {samples}")]
    Jitter { samples: usize },

    #[error("Insufficient data: R-value needs both delay and packet loss")]
    RValue,

    #[error("Insufficient data: handover start or finish was never observed")]
    Handover,
}

/// Outcome of a single metric calculation
pub type MetricValue = Result<f64, MetricError>;

/// Matched delay count differs from the received packet count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMismatch {
    pub matched: usize,
    pub received: usize,
}

/// Per-packet end-to-end delays in sent order
#[derive(Debug, Clone, PartialEq)]
pub struct DelaySamples {
    pub samples: Vec<f64>,
    pub mismatch: Option<SequenceMismatch>,
}

/// Aggregate metrics of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Kbps
    pub throughput: MetricValue,
    /// Percent
    pub packet_loss: MetricValue,
    /// Milliseconds
    pub delay: MetricValue,
    /// Milliseconds
    pub jitter: MetricValue,
    /// Seconds
    pub handover: MetricValue,
    pub r_value: MetricValue,
    pub sent: usize,
    pub received: usize,
    /// Seconds between first and last received packet
    pub duration: Option<f64>,
    pub sequence_mismatch: Option<SequenceMismatch>,
}

impl RunMetrics {
    /// Compute every metric from a finished run
    pub fn compute(
        sent: &[SentEvent],
        received: &[ReceivedEvent],
        control: &ControlEvents,
    ) -> Self {
        let delays = end_to_end_delays(sent, received);
        if let Some(m) = delays.mismatch {
            log::warn!(
                "Sequence mismatch: {} delays matched for {} received packets",
                m.matched,
                m.received
            );
        }

        let packet_loss = packet_loss(sent.len(), received.len());
        let delay = average_delay(&delays.samples);
        let r_value = match (delay, packet_loss) {
            (Ok(d), Ok(pl)) => Ok(r_value(d, pl)),
            _ => Err(MetricError::RValue),
        };

        Self {
            throughput: throughput(received),
            packet_loss,
            delay,
            jitter: average_jitter(&delays.samples),
            handover: handover_delay(control),
            r_value,
            sent: sent.len(),
            received: received.len(),
            duration: traffic_duration(received),
            sequence_mismatch: delays.mismatch,
        }
    }

    /// Sent packets that never arrived
    pub fn dropped(&self) -> i64 {
        self.sent as i64 - self.received as i64
    }
}

/// Received throughput in Kbps over the span between the first and last
/// received packet (in arrival order)
pub fn throughput(received: &[ReceivedEvent]) -> MetricValue {
    let (first, last) = match (received.first(), received.last()) {
        (Some(f), Some(l)) if received.len() >= 2 => (f, l),
        _ => return Err(MetricError::Throughput { received: received.len() }),
    };
    let span_s = (last.received_time - first.received_time) / 1000.0;
    if span_s <= 0.0 {
        return Err(MetricError::Throughput { received: received.len() });
    }
    let bytes: u64 = received.iter().map(|r| r.size_bytes as u64).sum();
    Ok((bytes as f64 * 8.0 / 1024.0) / span_s)
}

/// Percentage of sent packets that were not received
pub fn packet_loss(sent: usize, received: usize) -> MetricValue {
    if sent == 0 {
        return Err(MetricError::PacketLoss);
    }
    Ok((sent as f64 - received as f64) / sent as f64 * 100.0)
}

/// Pair each sent packet with the first received packet carrying the same
/// sequence id. Unmatched sent packets were lost and contribute nothing.
pub fn end_to_end_delays(sent: &[SentEvent], received: &[ReceivedEvent]) -> DelaySamples {
    let samples: Vec<f64> = sent
        .iter()
        .filter_map(|s| {
            received
                .iter()
                .find(|r| r.sequence_id == s.sequence_id)
                .map(|r| r.received_time - s.sent_time)
        })
        .collect();

    let mismatch = (samples.len() != received.len()).then_some(SequenceMismatch {
        matched: samples.len(),
        received: received.len(),
    });

    DelaySamples { samples, mismatch }
}

pub fn average_delay(delays: &[f64]) -> MetricValue {
    if delays.is_empty() {
        return Err(MetricError::Delay);
    }
    Ok(delays.iter().sum::<f64>() / delays.len() as f64)
}

/// Absolute differences of consecutive delays. The difference between the
/// first two samples is a startup transient and is left out.
pub fn jitter_samples(delays: &[f64]) -> Result<Vec<f64>, MetricError> {
    if delays.len() < 3 {
        return Err(MetricError::Jitter { samples: delays.len() });
    }
    Ok(delays[1..].windows(2).map(|w| (w[1] - w[0]).abs()).collect())
}

pub fn average_jitter(delays: &[f64]) -> MetricValue {
    let jitter = jitter_samples(delays)?;
    Ok(jitter.iter().sum::<f64>() / jitter.len() as f64)
}

/// Simplified E-model voice quality estimate
pub fn r_value(avg_delay_ms: f64, packet_loss_pct: f64) -> f64 {
    let loss_impairment = 22.0 * (1.0 + 0.22 * packet_loss_pct).ln();
    if avg_delay_ms / 2.0 < 165.0 {
        92.68 - loss_impairment
    } else {
        92.68 - (0.1 * avg_delay_ms / 2.0 - 15.9) - loss_impairment
    }
}

/// Handover duration in seconds
pub fn handover_delay(control: &ControlEvents) -> MetricValue {
    match (control.handover_start, control.handover_finish) {
        (Some(start), Some(finish)) => Ok((finish - start) / 1000.0),
        _ => Err(MetricError::Handover),
    }
}

/// Seconds between the first and last received packet
pub fn traffic_duration(received: &[ReceivedEvent]) -> Option<f64> {
    let first = received.first()?;
    let last = received.last()?;
    Some((last.received_time - first.received_time) / 1000.0)
}

/// Received Kbps per whole-second bucket: bucket `k` (1-based) covers
/// receive times in `[k-1, k)` seconds. Empty seconds up to the last busy
/// one are reported as 0.
pub fn throughput_series(received: &[ReceivedEvent]) -> Vec<(u64, u64)> {
    let mut bytes: BTreeMap<u64, u64> = BTreeMap::new();
    for r in received.iter().filter(|r| r.received_time.is_finite() && r.received_time >= 0.0) {
        let sec = (r.received_time / 1000.0).floor() as u64;
        *bytes.entry(sec).or_default() += r.size_bytes as u64;
    }
    let Some(&last) = bytes.keys().next_back() else {
        return Vec::new();
    };
    (0..=last)
        .map(|sec| (sec + 1, bytes.get(&sec).copied().unwrap_or(0) * 8 / 1024))
        .collect()
}
