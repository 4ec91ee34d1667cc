//! Handover timing from control-plane frames.
//!
//! Frames are matched on their exact size and a few header fields. Matching
//! starts only after a warm-up period so the initial association of the
//! mobile node is not mistaken for a handover.

use super::headers::{self, next_header, Ipv6Header, WifiMacHeader};
use super::types::{ControlEvents, SimTimeMs};

/// Frame-matching rules for the handover scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRules {
    /// Frames at or before this time are ignored
    pub warmup_ms: SimTimeMs,
    /// MAC address of the mobile node
    pub mobile_node_mac: [u8; 6],
    pub assoc_response_size: usize,
    /// Binding acknowledgement after moving to a foreign network
    pub binding_ack_size: usize,
    /// Binding acknowledgement returning home; shares its size with
    /// router solicitations, so the next header is checked too
    pub home_binding_ack_size: usize,
}

impl Default for ControlRules {
    fn default() -> Self {
        Self {
            warmup_ms: 16_000.0,
            mobile_node_mac: [0x00, 0x00, 0x00, 0x00, 0x00, 0x10],
            assoc_response_size: 50,
            binding_ack_size: 116,
            home_binding_ack_size: 92,
        }
    }
}

/// What a control frame was recognised as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMatch {
    HandoverStart,
    HandoverFinish,
}

/// Records the first handover start and the first finish following it
#[derive(Debug, Clone, Default)]
pub struct ControlRecorder {
    rules: ControlRules,
    events: ControlEvents,
}

impl ControlRecorder {
    pub fn new(rules: ControlRules) -> Self {
        Self {
            rules,
            events: ControlEvents::default(),
        }
    }

    pub fn events(&self) -> ControlEvents {
        self.events
    }

    /// Observe a control frame. Returns what was recorded, if anything.
    pub fn observe(&mut self, frame: &[u8], now: SimTimeMs) -> Option<ControlMatch> {
        if now <= self.rules.warmup_ms {
            return None;
        }
        match self.rules.match_frame(frame)? {
            ControlMatch::HandoverStart if self.events.handover_start.is_none() => {
                self.events.handover_start = Some(now);
                log::debug!("Handover start at {:.3} ms", now);
                Some(ControlMatch::HandoverStart)
            }
            ControlMatch::HandoverFinish
                if self.events.handover_start.is_some() && self.events.handover_finish.is_none() =>
            {
                self.events.handover_finish = Some(now);
                log::debug!("Handover finish at {:.3} ms", now);
                Some(ControlMatch::HandoverFinish)
            }
            _ => None,
        }
    }
}

impl ControlRules {
    fn match_frame(&self, frame: &[u8]) -> Option<ControlMatch> {
        let size = frame.len();
        if size == self.assoc_response_size {
            let (mac, _) = WifiMacHeader::parse(frame)?;
            if mac.is_assoc_response() && mac.addr1 == self.mobile_node_mac {
                return Some(ControlMatch::HandoverStart);
            }
            return None;
        }
        if size == self.binding_ack_size {
            return Some(ControlMatch::HandoverFinish);
        }
        if size == self.home_binding_ack_size {
            let (_, rest) = WifiMacHeader::parse(frame)?;
            let rest = headers::strip_llc_snap(rest)?;
            let (ip, _) = Ipv6Header::parse(rest)?;
            if ip.next_header == next_header::MOBILITY {
                return Some(ControlMatch::HandoverFinish);
            }
        }
        None
    }
}
