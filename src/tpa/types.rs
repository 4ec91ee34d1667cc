//! Core data types for traffic performance analysis.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Simulation timestamp in milliseconds since simulation start
pub type SimTimeMs = f64;

/// Traffic generator used by the simulated scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficType {
    /// ICMPv6 echo request/reply
    #[serde(rename = "PING")]
    Ping,
    /// Constant bit rate UDP with sequence/timestamp payload
    #[serde(rename = "UDPCBR")]
    UdpCbr,
    /// Constant bit rate TCP (not analysable)
    #[serde(rename = "TCPCBR")]
    TcpCbr,
    /// Voice over UDP with sequence/timestamp payload
    #[serde(rename = "VOIP")]
    Voip,
    /// Trace-driven UDP video streaming
    #[serde(rename = "VIDEO_S")]
    VideoStream,
}

impl TrafficType {
    pub const ALL: [TrafficType; 5] = [
        TrafficType::Ping,
        TrafficType::UdpCbr,
        TrafficType::TcpCbr,
        TrafficType::Voip,
        TrafficType::VideoStream,
    ];

    /// Numeric code the simulation script expects on its command line
    pub fn code(self) -> u8 {
        match self {
            TrafficType::Ping => 1,
            TrafficType::UdpCbr => 2,
            TrafficType::TcpCbr => 3,
            TrafficType::Voip => 4,
            TrafficType::VideoStream => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            TrafficType::Ping => "PING",
            TrafficType::UdpCbr => "UDPCBR",
            TrafficType::TcpCbr => "TCPCBR",
            TrafficType::Voip => "VOIP",
            TrafficType::VideoStream => "VIDEO_S",
        }
    }
}

impl fmt::Display for TrafficType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TrafficType {
    type Err = String;

    /// Accepts either the traffic name ("VOIP") or its numeric code ("4")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code)
                .ok_or_else(|| format!("Unknown traffic type code: {}", code));
        }
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown traffic type: {}", s))
    }
}

/// Direction of an observed packet relative to the tracked flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

/// Link-layer framing present on the bytes handed to the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFraming {
    /// Ethernet II header (CSMA device traces)
    Ethernet,
    /// Link header already removed before the trace point
    Stripped,
}

/// A data packet leaving the source application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentEvent {
    pub sequence_id: u32,
    pub sent_time: SimTimeMs,
}

/// A data packet arriving at the sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceivedEvent {
    pub sequence_id: u32,
    pub received_time: SimTimeMs,
    pub size_bytes: u32,
}

/// Handover signalling timestamps for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlEvents {
    /// Association response addressed to the mobile node
    pub handover_start: Option<SimTimeMs>,
    /// Binding acknowledgement / mobility-header solicitation after movement
    pub handover_finish: Option<SimTimeMs>,
}
