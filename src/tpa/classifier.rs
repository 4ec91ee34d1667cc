//! Flow classification.
//!
//! Decides whether an observed packet belongs to the tracked application
//! flow and extracts its sequence identifier. The strategy is chosen once
//! per run from the configured traffic type; TCP CBR has no strategy and is
//! rejected when the classifier is built.

use super::headers::{self, next_header, ExtensionHeader, Icmpv6Echo, Ipv6Header, SeqTsHeader};
use super::types::{Direction, LinkFraming, ReceivedEvent, SentEvent, SimTimeMs, TrafficType};

/// Packets at or below this size are routing/ND/MIPv6 control chatter
/// (a VoIP data packet is 80 IPv6-in-IPv6 + 8 UDP + 172 payload bytes)
pub const CONTROL_SIZE_THRESHOLD: usize = 200;

/// 802.11 data header plus LLC/SNAP removed before the receive trace point
pub const RECEIVED_SIZE_CORRECTION: u32 = 32;

/// Errors raised while building a classifier
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Traffic type {0} is not supported by the analyzer")]
    UnsupportedTrafficType(TrafficType),

    #[error("Route optimization is only analysed for PING traffic, not {0}")]
    RouteOptimizationUnsupported(TrafficType),
}

/// Analyzer settings fixed for the duration of one run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub traffic_type: TrafficType,
    pub route_optimization: bool,
    /// Framing on sent packets; `None` uses the traffic type default
    pub sent_framing: Option<LinkFraming>,
    /// Framing on received packets; `None` uses the traffic type default
    pub received_framing: Option<LinkFraming>,
}

impl AnalyzerConfig {
    pub fn new(traffic_type: TrafficType) -> Self {
        Self {
            traffic_type,
            route_optimization: false,
            sent_framing: None,
            received_framing: None,
        }
    }
}

/// Classification strategy, one per analysable traffic type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficProfile {
    Ping,
    UdpCbr,
    Voip,
    VideoStream,
}

impl TryFrom<TrafficType> for TrafficProfile {
    type Error = ClassifierError;

    fn try_from(traffic_type: TrafficType) -> Result<Self, Self::Error> {
        match traffic_type {
            TrafficType::Ping => Ok(TrafficProfile::Ping),
            TrafficType::UdpCbr => Ok(TrafficProfile::UdpCbr),
            TrafficType::Voip => Ok(TrafficProfile::Voip),
            TrafficType::VideoStream => Ok(TrafficProfile::VideoStream),
            TrafficType::TcpCbr => Err(ClassifierError::UnsupportedTrafficType(traffic_type)),
        }
    }
}

impl TrafficProfile {
    /// Framing observed at the trace points used by the handover scenario.
    /// Echo replies are captured on the correspondent's CSMA device, data
    /// packets on the mobile node's Wi-Fi MAC after header removal.
    pub fn default_framing(self, direction: Direction) -> LinkFraming {
        match (self, direction) {
            (_, Direction::Sent) => LinkFraming::Ethernet,
            (TrafficProfile::Ping, Direction::Received) => LinkFraming::Ethernet,
            (_, Direction::Received) => LinkFraming::Stripped,
        }
    }

    fn size_prefilter(self) -> bool {
        matches!(self, TrafficProfile::UdpCbr | TrafficProfile::Voip)
    }
}

/// Per-run packet classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    profile: TrafficProfile,
    sent_framing: LinkFraming,
    received_framing: LinkFraming,
}

impl Classifier {
    pub fn new(config: &AnalyzerConfig) -> Result<Self, ClassifierError> {
        let profile = TrafficProfile::try_from(config.traffic_type)?;
        if config.route_optimization && profile != TrafficProfile::Ping {
            return Err(ClassifierError::RouteOptimizationUnsupported(config.traffic_type));
        }
        Ok(Self {
            profile,
            sent_framing: config
                .sent_framing
                .unwrap_or_else(|| profile.default_framing(Direction::Sent)),
            received_framing: config
                .received_framing
                .unwrap_or_else(|| profile.default_framing(Direction::Received)),
        })
    }

    pub fn profile(&self) -> TrafficProfile {
        self.profile
    }

    /// Classify an outbound packet
    pub fn classify_sent(&self, packet: &[u8], now: SimTimeMs) -> Option<SentEvent> {
        let sequence_id = self.sequence_id(packet, self.sent_framing, Direction::Sent)?;
        Some(SentEvent {
            sequence_id,
            sent_time: now,
        })
    }

    /// Classify an inbound packet
    pub fn classify_received(&self, packet: &[u8], now: SimTimeMs) -> Option<ReceivedEvent> {
        let sequence_id = self.sequence_id(packet, self.received_framing, Direction::Received)?;
        let wire_size = u32::try_from(packet.len()).ok()?;
        let size_bytes = match self.profile {
            TrafficProfile::Ping => wire_size,
            _ => wire_size + RECEIVED_SIZE_CORRECTION,
        };
        Some(ReceivedEvent {
            sequence_id,
            received_time: now,
            size_bytes,
        })
    }

    fn sequence_id(
        &self,
        packet: &[u8],
        framing: LinkFraming,
        direction: Direction,
    ) -> Option<u32> {
        if self.profile.size_prefilter() && packet.len() <= CONTROL_SIZE_THRESHOLD {
            return None;
        }
        let network = match framing {
            LinkFraming::Ethernet => headers::strip_ethernet(packet)?,
            LinkFraming::Stripped => packet,
        };
        match self.profile {
            TrafficProfile::Ping => echo_sequence(network, direction),
            TrafficProfile::UdpCbr | TrafficProfile::Voip => {
                let (_, transport) = headers::parse_ipv6_decapsulated(network)?;
                udp_sequence(transport)
            }
            TrafficProfile::VideoStream => {
                let (ip, transport) = headers::parse_ipv6_decapsulated(network)?;
                if ip.next_header != next_header::UDP {
                    return None;
                }
                udp_sequence(transport)
            }
        }
    }
}

/// Echo request on the way out, echo reply on the way back. A route
/// optimization extension header (type 2 routing or home address
/// destination option) is skipped when present.
fn echo_sequence(network: &[u8], direction: Direction) -> Option<u32> {
    let (ip, mut rest) = Ipv6Header::parse(network)?;
    let mut next = ip.next_header;
    if next == next_header::ROUTING || next == next_header::DESTINATION_OPTIONS {
        let (ext, after) = ExtensionHeader::parse(rest)?;
        next = ext.next_header;
        rest = after;
    }
    if next != next_header::ICMPV6 {
        return None;
    }
    let echo = Icmpv6Echo::parse(rest)?;
    let wanted = match direction {
        Direction::Sent => headers::ICMPV6_ECHO_REQUEST,
        Direction::Received => headers::ICMPV6_ECHO_REPLY,
    };
    (echo.icmp_type == wanted).then_some(echo.sequence as u32)
}

fn udp_sequence(transport: &[u8]) -> Option<u32> {
    let payload = headers::strip_udp(transport)?;
    SeqTsHeader::parse(payload).map(|h| h.sequence)
}
