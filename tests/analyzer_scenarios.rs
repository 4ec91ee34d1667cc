//! End-to-end analyzer scenarios over the public API.

use std::fs;

use mipv6sim::tpa::context::RunOutputs;
use mipv6sim::tpa::metrics::{self, RunMetrics};
use mipv6sim::tpa::trace;
use mipv6sim::tpa::{
    AnalyzerConfig, ControlEvents, ControlRules, MetricError, ReceivedEvent, ResultRecord,
    RunContext, SentEvent, TrafficType,
};
use tempfile::tempdir;

fn sent(id: u32, t: f64) -> SentEvent {
    SentEvent {
        sequence_id: id,
        sent_time: t,
    }
}

fn received(id: u32, t: f64, size: u32) -> ReceivedEvent {
    ReceivedEvent {
        sequence_id: id,
        received_time: t,
        size_bytes: size,
    }
}

/// Ethernet + IPv6 + ICMPv6 echo, 64 bytes of ICMPv6
fn echo_frame(icmp_type: u8, seq: u16) -> Vec<u8> {
    let mut icmp = vec![0u8; 64];
    icmp[0] = icmp_type;
    icmp[6..8].copy_from_slice(&seq.to_be_bytes());

    let mut ip = vec![0u8; 40];
    ip[0] = 0x60;
    ip[4..6].copy_from_slice(&(icmp.len() as u16).to_be_bytes());
    ip[6] = 58;
    ip[7] = 64;
    ip.extend_from_slice(&icmp);

    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&[0x86, 0xdd]);
    frame.extend_from_slice(&ip);
    frame
}

#[test]
fn scenario_a_ping() {
    let s = [sent(1, 1000.0), sent(2, 2000.0)];
    let r = [received(1, 1050.0, 64), received(2, 2060.0, 64)];
    let m = RunMetrics::compute(&s, &r, &ControlEvents::default());

    assert_eq!(m.delay, Ok(55.0));
    assert_eq!(m.packet_loss, Ok(0.0));
    let expected = (128.0 * 8.0 / 1024.0) / 1.01;
    assert!((m.throughput.unwrap() - expected).abs() < 1e-9);
    assert!((m.throughput.unwrap() - 0.99).abs() < 0.005);
    // Two delay samples are not enough for jitter
    assert_eq!(m.jitter, Err(MetricError::Jitter { samples: 2 }));
}

#[test]
fn scenario_b_loss_without_handover() {
    let s: Vec<SentEvent> = (1..=10).map(|i| sent(i, i as f64 * 100.0)).collect();
    let r: Vec<ReceivedEvent> =
        (1..=7).map(|i| received(i, i as f64 * 100.0 + 30.0, 200)).collect();
    let m = RunMetrics::compute(&s, &r, &ControlEvents::default());

    assert_eq!(m.packet_loss, Ok(30.0));
    assert_eq!(m.handover, Err(MetricError::Handover));
    assert_eq!(m.dropped(), 3);
    assert_eq!(m.sequence_mismatch, None);

    let record = ResultRecord::from_metrics(&m);
    assert_eq!(record.handover, -1.0);
    assert!(!record.is_sane());
}

#[test]
fn scenario_c_r_value() {
    let r = metrics::r_value(100.0, 2.0);
    assert_eq!(r, 92.68 - 22.0 * (1.0 + 0.22 * 2.0f64).ln());
    assert!((r - 84.66).abs() < 0.01);

    // Second branch once half the delay reaches 165 ms
    let r = metrics::r_value(400.0, 0.0);
    assert_eq!(r, 92.68 - (0.1 * 400.0 / 2.0 - 15.9));
}

#[test]
fn metrics_are_idempotent() {
    let s: Vec<SentEvent> = (1..=20).map(|i| sent(i, i as f64 * 20.0)).collect();
    let r: Vec<ReceivedEvent> = (1..=20)
        .filter(|i| i % 4 != 0)
        .map(|i| received(i, i as f64 * 20.0 + 40.0 + (i % 3) as f64, 172))
        .collect();
    let control = ControlEvents {
        handover_start: Some(20_000.0),
        handover_finish: Some(21_250.0),
    };
    let first = RunMetrics::compute(&s, &r, &control);
    let second = RunMetrics::compute(&s, &r, &control);
    assert_eq!(first, second);
    assert_eq!(
        ResultRecord::from_metrics(&first).encode(),
        ResultRecord::from_metrics(&second).encode()
    );
    assert_eq!(first.handover, Ok(1.25));
}

#[test]
fn ping_trace_to_result_file() {
    let dir = tempdir().unwrap();
    let mut text = String::from("# ping over a handover\n");
    for seq in 1..=5u16 {
        let t = seq as f64 * 1000.0;
        text.push_str(&format!("tx {} {}\n", t, hex::encode(echo_frame(128, seq))));
        if seq != 3 {
            text.push_str(&format!("rx {} {}\n", t + 40.0, hex::encode(echo_frame(129, seq))));
        }
    }
    let trace_path = dir.path().join("ping.trace");
    fs::write(&trace_path, text).unwrap();

    let entries = trace::load_trace(&trace_path).unwrap();
    let config = AnalyzerConfig::new(TrafficType::Ping);
    let mut ctx = RunContext::new(&config, ControlRules::default()).unwrap();
    trace::replay(&mut ctx, &entries);
    assert_eq!(ctx.counts().sent_observed, 5);
    assert_eq!(ctx.received_events().len(), 4);

    let report = ctx.finish();
    let result = dir.path().join("tempresults.txt");
    let series = dir.path().join("Throughput.txt");
    report
        .emit(&RunOutputs {
            result_file: Some(result.clone()),
            throughput_file: Some(series.clone()),
            ..RunOutputs::default()
        })
        .unwrap();

    let record: ResultRecord = fs::read_to_string(&result).unwrap().parse().unwrap();
    assert_eq!(record.packet_loss, 20.0);
    assert_eq!(record.delay, 40.0);
    assert_eq!((record.sent, record.received, record.dropped), (5, 4, 1));
    assert_eq!(record.duration, 4);
    // No jitter variation and no handover: not a usable run
    assert!(!record.is_sane());

    let series = fs::read_to_string(&series).unwrap();
    assert!(series.starts_with("#Time_interval Throughput[Kbps]\n"));
    assert_eq!(series.lines().count(), 1 + 6);
}

#[test]
fn tcp_cbr_rejected_before_any_packet() {
    let config = AnalyzerConfig::new(TrafficType::TcpCbr);
    let err = RunContext::new(&config, ControlRules::default()).unwrap_err();
    assert!(err.to_string().contains("TCPCBR"));
}
