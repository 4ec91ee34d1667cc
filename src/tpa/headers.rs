//! Minimal wire-format views over the headers the analyzer needs.
//!
//! Only the fields used for flow classification are decoded. Every parser
//! takes a byte slice and returns the decoded header together with the
//! remaining payload, or `None` when the slice is too short.

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;
pub const LLC_SNAP_HEADER_LEN: usize = 8;
pub const ICMPV6_ECHO_LEN: usize = 8;
pub const SEQ_TS_LEN: usize = 12;

/// IPv6 next-header values
pub mod next_header {
    pub const UDP: u8 = 17;
    pub const IPV6: u8 = 41;
    pub const ROUTING: u8 = 43;
    pub const ICMPV6: u8 = 58;
    pub const DESTINATION_OPTIONS: u8 = 60;
    pub const MOBILITY: u8 = 135;
}

pub const ICMPV6_ECHO_REQUEST: u8 = 128;
pub const ICMPV6_ECHO_REPLY: u8 = 129;

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Strip an Ethernet II header
pub fn strip_ethernet(bytes: &[u8]) -> Option<&[u8]> {
    bytes.get(ETHERNET_HEADER_LEN..)
}

/// Fixed IPv6 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub next_header: u8,
}

impl Ipv6Header {
    pub fn parse(bytes: &[u8]) -> Option<(Self, &[u8])> {
        if bytes.len() < IPV6_HEADER_LEN || bytes[0] >> 4 != 6 {
            return None;
        }
        let header = Self { next_header: bytes[6] };
        Some((header, &bytes[IPV6_HEADER_LEN..]))
    }
}

/// Generic IPv6 extension header (routing, destination options)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionHeader {
    pub next_header: u8,
    /// Total header length in bytes
    pub length: usize,
}

impl ExtensionHeader {
    pub fn parse(bytes: &[u8]) -> Option<(Self, &[u8])> {
        if bytes.len() < 2 {
            return None;
        }
        // Hdr Ext Len counts 8-octet units beyond the first 8 octets
        let length = (bytes[1] as usize + 1) * 8;
        let rest = bytes.get(length..)?;
        Some((
            Self {
                next_header: bytes[0],
                length,
            },
            rest,
        ))
    }
}

/// Parse an IPv6 header and, if present, one level of IPv6-in-IPv6
/// encapsulation. Returns the innermost header.
pub fn parse_ipv6_decapsulated(bytes: &[u8]) -> Option<(Ipv6Header, &[u8])> {
    let (outer, rest) = Ipv6Header::parse(bytes)?;
    if outer.next_header == next_header::IPV6 {
        Ipv6Header::parse(rest)
    } else {
        Some((outer, rest))
    }
}

/// Strip a UDP header
pub fn strip_udp(bytes: &[u8]) -> Option<&[u8]> {
    bytes.get(UDP_HEADER_LEN..)
}

/// ICMPv6 echo request/reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv6Echo {
    pub icmp_type: u8,
    pub sequence: u16,
}

impl Icmpv6Echo {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ICMPV6_ECHO_LEN {
            return None;
        }
        Some(Self {
            icmp_type: bytes[0],
            sequence: be_u16(bytes, 6),
        })
    }
}

/// Sequence number carried at the start of the application payload. The
/// send timestamp that follows it is not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqTsHeader {
    pub sequence: u32,
}

impl SeqTsHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SEQ_TS_LEN {
            return None;
        }
        Some(Self {
            sequence: be_u32(bytes, 0),
        })
    }
}

/// 802.11 frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiFrameType {
    Management,
    Control,
    Data,
    Extension,
}

pub const WIFI_SUBTYPE_ASSOC_RESPONSE: u8 = 1;

/// 802.11 MAC header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiMacHeader {
    pub frame_type: WifiFrameType,
    pub subtype: u8,
    pub addr1: [u8; 6],
}

impl WifiMacHeader {
    pub fn parse(bytes: &[u8]) -> Option<(Self, &[u8])> {
        if bytes.len() < 10 {
            return None;
        }
        let fc0 = bytes[0];
        let fc1 = bytes[1];
        let frame_type = match (fc0 >> 2) & 0b11 {
            0 => WifiFrameType::Management,
            1 => WifiFrameType::Control,
            2 => WifiFrameType::Data,
            _ => WifiFrameType::Extension,
        };
        let subtype = fc0 >> 4;
        let to_ds = fc1 & 0x01 != 0;
        let from_ds = fc1 & 0x02 != 0;

        let mut length = 24;
        if frame_type == WifiFrameType::Data {
            if to_ds && from_ds {
                length += 6;
            }
            // QoS data subtypes carry a 2-byte QoS control field
            if subtype & 0x08 != 0 {
                length += 2;
            }
        }
        let rest = bytes.get(length..)?;

        let mut addr1 = [0u8; 6];
        addr1.copy_from_slice(&bytes[4..10]);

        Some((
            Self {
                frame_type,
                subtype,
                addr1,
            },
            rest,
        ))
    }

    pub fn is_assoc_response(&self) -> bool {
        self.frame_type == WifiFrameType::Management && self.subtype == WIFI_SUBTYPE_ASSOC_RESPONSE
    }
}

/// Strip an LLC/SNAP header
pub fn strip_llc_snap(bytes: &[u8]) -> Option<&[u8]> {
    bytes.get(LLC_SNAP_HEADER_LEN..)
}

/// Parse a MAC address written as "aa:bb:cc:dd:ee:ff"
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.trim().split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
pub(crate) mod build {
    //! Packet builders shared by the analyzer tests.

    use super::*;

    pub fn ethernet(payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0u8; ETHERNET_HEADER_LEN];
        v[12] = 0x86;
        v[13] = 0xdd;
        v.extend_from_slice(payload);
        v
    }

    pub fn ipv6(next: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0u8; IPV6_HEADER_LEN];
        v[0] = 0x60;
        v[4..6].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        v[6] = next;
        v[7] = 64;
        v.extend_from_slice(payload);
        v
    }

    pub fn extension(next: u8, units: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0u8; (units as usize + 1) * 8];
        v[0] = next;
        v[1] = units;
        v.extend_from_slice(payload);
        v
    }

    pub fn udp(payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0u8; UDP_HEADER_LEN];
        v[0..2].copy_from_slice(&49153u16.to_be_bytes());
        v[2..4].copy_from_slice(&9u16.to_be_bytes());
        v[4..6].copy_from_slice(&((payload.len() + UDP_HEADER_LEN) as u16).to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    pub fn seq_ts(seq: u32, padding: usize) -> Vec<u8> {
        let mut v = seq.to_be_bytes().to_vec();
        v.extend_from_slice(&0u64.to_be_bytes());
        v.extend(std::iter::repeat(0u8).take(padding));
        v
    }

    pub fn echo(icmp_type: u8, seq: u16) -> Vec<u8> {
        let mut v = vec![icmp_type, 0, 0, 0, 0, 1];
        v.extend_from_slice(&seq.to_be_bytes());
        v.extend_from_slice(&[0u8; 56]);
        v
    }

    pub fn wifi(fc0: u8, addr1: [u8; 6], payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0u8; 24];
        v[0] = fc0;
        v[4..10].copy_from_slice(&addr1);
        v.extend_from_slice(payload);
        v
    }

    /// Pad or truncate to an exact frame size
    pub fn sized(mut v: Vec<u8>, size: usize) -> Vec<u8> {
        v.resize(size, 0);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::build;
    use super::*;

    #[test]
    fn test_ipv6_parse_rejects_short_and_wrong_version() {
        assert!(Ipv6Header::parse(&[0x60; 39]).is_none());
        let mut pkt = build::ipv6(next_header::UDP, &[]);
        pkt[0] = 0x40;
        assert!(Ipv6Header::parse(&pkt).is_none());
    }

    #[test]
    fn test_decapsulation_returns_inner_header() {
        let inner = build::ipv6(next_header::UDP, &build::udp(&[1, 2, 3]));
        let outer = build::ipv6(next_header::IPV6, &inner);
        let (hdr, rest) = parse_ipv6_decapsulated(&outer).unwrap();
        assert_eq!(hdr.next_header, next_header::UDP);
        assert_eq!(rest.len(), UDP_HEADER_LEN + 3);
        assert_eq!(strip_udp(rest), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_extension_header_length_units() {
        let ext = build::extension(next_header::ICMPV6, 2, &[9, 9]);
        let (hdr, rest) = ExtensionHeader::parse(&ext).unwrap();
        assert_eq!(hdr.length, 24);
        assert_eq!(hdr.next_header, next_header::ICMPV6);
        assert_eq!(rest, &[9, 9]);
    }

    #[test]
    fn test_seq_ts_and_echo() {
        let payload = build::seq_ts(0xdead_beef, 4);
        assert_eq!(SeqTsHeader::parse(&payload).unwrap().sequence, 0xdead_beef);
        assert!(SeqTsHeader::parse(&payload[..11]).is_none());

        let echo = build::echo(ICMPV6_ECHO_REPLY, 513);
        let parsed = Icmpv6Echo::parse(&echo).unwrap();
        assert_eq!(parsed.icmp_type, ICMPV6_ECHO_REPLY);
        assert_eq!(parsed.sequence, 513);
    }

    #[test]
    fn test_wifi_header_lengths() {
        let mgmt = build::wifi(0x10, [0, 0, 0, 0, 0, 0x10], &[]);
        let (hdr, rest) = WifiMacHeader::parse(&mgmt).unwrap();
        assert!(hdr.is_assoc_response());
        assert!(rest.is_empty());

        // QoS data frame
        let mut qos = vec![0x88, 0x00];
        qos.extend_from_slice(&[0u8; 30]);
        let (hdr, rest) = WifiMacHeader::parse(&qos).unwrap();
        assert_eq!(hdr.frame_type, WifiFrameType::Data);
        assert_eq!(rest.len(), 6);

        // Four-address data frame
        let mut wds = vec![0x08, 0x03];
        wds.extend_from_slice(&[0u8; 32]);
        let (_, rest) = WifiMacHeader::parse(&wds).unwrap();
        assert_eq!(rest.len(), 4);
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(parse_mac("00:00:00:00:00:10"), Some([0, 0, 0, 0, 0, 0x10]));
        assert_eq!(parse_mac("00:00:00:00:00"), None);
        assert_eq!(parse_mac("00:00:00:00:00:10:11"), None);
        assert_eq!(parse_mac("zz:00:00:00:00:10"), None);
    }
}
