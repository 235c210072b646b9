// Shared packet types and IP/L4 parsers.
//
// Used by both capture paths: NFLOG delivers raw L3 frames, libpcap delivers
// whatever the interface's link type dictates. Parses IPv4/IPv6 + TCP/UDP/ICMP
// headers from raw capture buffers into a small per-packet summary.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Data link type
// ---------------------------------------------------------------------------

/// Data link type of a capture device.
///
/// Determines the link-layer framing used by the capture source, which
/// affects where the IP header starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Ethernet (DLT_EN10MB = 1): 14-byte header, EtherType at offset 12.
    Ethernet,
    /// Raw IP (DLT_RAW = 12): no link-layer header, IP starts at offset 0.
    /// Also the framing of NFLOG payloads.
    Raw,
    /// Null/Loopback (DLT_NULL = 0): 4-byte AF header in host byte order.
    Null,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// Ethernet
const ETH_HLEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

// IPv4
const IPV4_MIN_HLEN: usize = 20;
const IPV4_PROTO_OFFSET: usize = 9;
const IPV4_FLAGS_FRAG_OFFSET: usize = 6;
const IPV4_SRC_OFFSET: usize = 12;
const IPV4_DST_OFFSET: usize = 16;

// IPv6
const IPV6_HLEN: usize = 40;
const IPV6_NEXT_HDR_OFFSET: usize = 6;
const IPV6_SRC_OFFSET: usize = 8;
const IPV6_DST_OFFSET: usize = 24;

// L4 protocol numbers
const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_ICMPV6: u8 = 58;

// IPv6 extension header protocol numbers
const EXT_HOP_BY_HOP: u8 = 0;
const EXT_ROUTING: u8 = 43;
const EXT_FRAGMENT: u8 = 44;
const EXT_DEST_OPTIONS: u8 = 60;

// TCP/UDP port header length (src_port + dst_port = 4 bytes)
const L4_PORT_HLEN: usize = 4;

const UDP_HLEN: usize = 8;

// ---------------------------------------------------------------------------
// Protocol tags
// ---------------------------------------------------------------------------

/// Transport-layer protocol of a captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// PacketSummary
// ---------------------------------------------------------------------------

/// Summarized information extracted from a single captured packet.
#[derive(Debug, Clone)]
pub struct PacketSummary {
    /// Capture timestamp; wall-clock now when the capture layer did not
    /// stamp the packet.
    pub time: DateTime<Utc>,
    /// Transport-layer protocol.
    pub protocol: Protocol,
    /// Source IP address (v4 or v6).
    pub src_ip: IpAddr,
    /// Source port (`None` for ICMP).
    pub src_port: Option<u16>,
    /// Destination IP address (v4 or v6).
    pub dst_ip: IpAddr,
    /// Destination port (`None` for ICMP).
    pub dst_port: Option<u16>,
    /// Application-layer identifier; empty when nothing was decoded.
    pub l5_proto: &'static str,
}

impl PacketSummary {
    /// The remote `host:port` the packet came from.
    ///
    /// Renders exactly like [`std::net::SocketAddr`] (IPv6 bracketed) so the
    /// string can be used as a connection-map key against peer endpoints.
    pub fn remote_addr(&self) -> String {
        join_host_port(&self.src_ip, self.src_port)
    }

    /// The local `host:port` the packet was sent to.
    pub fn destination(&self) -> String {
        join_host_port(&self.dst_ip, self.dst_port)
    }
}

fn join_host_port(ip: &IpAddr, port: Option<u16>) -> String {
    let port = port.map(|p| p.to_string()).unwrap_or_default();
    match ip {
        IpAddr::V4(v4) => format!("{v4}:{port}"),
        IpAddr::V6(v6) => format!("[{v6}]:{port}"),
    }
}

// ---------------------------------------------------------------------------
// Single-packet parsing
// ---------------------------------------------------------------------------

/// Parses a single raw packet into a [`PacketSummary`].
///
/// Returns `None` if the packet is:
/// - Too short (truncated at any layer)
/// - Not IPv4 or IPv6 (e.g. ARP, VLAN-tagged)
/// - A non-first IPv4 fragment
/// - Using an unsupported transport protocol
pub fn parse_single_packet(data: &[u8], link_type: LinkType) -> Option<PacketSummary> {
    match link_type {
        LinkType::Ethernet => parse_ethernet_frame(data),
        LinkType::Raw => parse_raw_frame(data),
        LinkType::Null => parse_null_frame(data),
    }
}

/// Parse an Ethernet-framed packet (DLT_EN10MB).
pub fn parse_ethernet_frame(data: &[u8]) -> Option<PacketSummary> {
    if data.len() < ETH_HLEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([data[12], data[13]]);
    let l3_data = &data[ETH_HLEN..];

    match ethertype {
        ETHERTYPE_IPV4 => parse_ipv4(l3_data),
        ETHERTYPE_IPV6 => parse_ipv6(l3_data),
        _ => None,
    }
}

/// Parse a raw IP packet — no link-layer header, version from the first
/// nibble (`6` selects IPv6, everything else falls through to IPv4).
pub fn parse_raw_frame(data: &[u8]) -> Option<PacketSummary> {
    if data.is_empty() {
        return None;
    }
    match data[0] >> 4 {
        6 => parse_ipv6(data),
        _ => parse_ipv4(data),
    }
}

/// Parse a DLT_NULL framed packet — 4-byte AF header in host byte order.
pub fn parse_null_frame(data: &[u8]) -> Option<PacketSummary> {
    if data.len() < 4 {
        return None;
    }
    let af = u32::from_ne_bytes([data[0], data[1], data[2], data[3]]);
    let l3_data = &data[4..];
    match af {
        af if af == libc::AF_INET as u32 => parse_ipv4(l3_data),
        af if af == libc::AF_INET6 as u32 => parse_ipv6(l3_data),
        _ => None,
    }
}

/// Parse an IPv4 packet from the start of the IP header.
fn parse_ipv4(data: &[u8]) -> Option<PacketSummary> {
    if data.len() < IPV4_MIN_HLEN {
        return None;
    }

    let ihl = ((data[0] & 0x0F) as usize) * 4;
    if ihl < IPV4_MIN_HLEN || data.len() < ihl {
        return None;
    }

    // Fragment check: flags + fragment offset at bytes 6-7.
    let flags_frag = u16::from_be_bytes([
        data[IPV4_FLAGS_FRAG_OFFSET],
        data[IPV4_FLAGS_FRAG_OFFSET + 1],
    ]);
    if (flags_frag & 0x1FFF) != 0 {
        // Non-first fragment — skip.
        return None;
    }

    let proto_byte = data[IPV4_PROTO_OFFSET];

    let src_ip = IpAddr::V4(Ipv4Addr::new(
        data[IPV4_SRC_OFFSET],
        data[IPV4_SRC_OFFSET + 1],
        data[IPV4_SRC_OFFSET + 2],
        data[IPV4_SRC_OFFSET + 3],
    ));
    let dst_ip = IpAddr::V4(Ipv4Addr::new(
        data[IPV4_DST_OFFSET],
        data[IPV4_DST_OFFSET + 1],
        data[IPV4_DST_OFFSET + 2],
        data[IPV4_DST_OFFSET + 3],
    ));

    parse_l4(proto_byte, &data[ihl..], src_ip, dst_ip)
}

/// Skip IPv6 extension headers, returning `(final_next_hdr, offset_into_data)`.
///
/// `next_hdr` is the Next Header value from the fixed IPv6 header (or previous
/// extension header). `data` starts at the first byte after the fixed 40-byte
/// IPv6 header. Recognized extension headers: Hop-by-Hop (0), Routing (43),
/// Fragment (44), Destination Options (60).
fn skip_ipv6_extension_headers(mut next_hdr: u8, data: &[u8]) -> (u8, usize) {
    let mut offset = 0;
    loop {
        match next_hdr {
            EXT_HOP_BY_HOP | EXT_ROUTING | EXT_DEST_OPTIONS => {
                if offset + 2 > data.len() {
                    return (next_hdr, offset);
                }
                let hdr_ext_len = data[offset + 1] as usize;
                let total_len = (hdr_ext_len + 1) * 8;
                if offset + total_len > data.len() {
                    return (next_hdr, offset);
                }
                next_hdr = data[offset];
                offset += total_len;
            }
            EXT_FRAGMENT => {
                // Fragment header is always 8 bytes
                if offset + 8 > data.len() {
                    return (next_hdr, offset);
                }
                next_hdr = data[offset];
                offset += 8;
            }
            _ => return (next_hdr, offset),
        }
    }
}

/// Parse an IPv6 packet from the start of the IP header.
fn parse_ipv6(data: &[u8]) -> Option<PacketSummary> {
    if data.len() < IPV6_HLEN {
        return None;
    }

    let next_hdr = data[IPV6_NEXT_HDR_OFFSET];

    let src_bytes: [u8; 16] = data[IPV6_SRC_OFFSET..IPV6_SRC_OFFSET + 16]
        .try_into()
        .ok()?;
    let dst_bytes: [u8; 16] = data[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16]
        .try_into()
        .ok()?;

    let src_ip = IpAddr::V6(Ipv6Addr::from(src_bytes));
    let dst_ip = IpAddr::V6(Ipv6Addr::from(dst_bytes));

    let after_fixed = &data[IPV6_HLEN..];
    let (final_proto, ext_offset) = skip_ipv6_extension_headers(next_hdr, after_fixed);

    parse_l4(final_proto, &after_fixed[ext_offset..], src_ip, dst_ip)
}

/// Parse the transport layer (TCP/UDP/ICMP) and construct a [`PacketSummary`].
fn parse_l4(proto_byte: u8, l4_data: &[u8], src_ip: IpAddr, dst_ip: IpAddr) -> Option<PacketSummary> {
    match proto_byte {
        PROTO_TCP | PROTO_UDP => {
            if l4_data.len() < L4_PORT_HLEN {
                return None;
            }
            let src_port = u16::from_be_bytes([l4_data[0], l4_data[1]]);
            let dst_port = u16::from_be_bytes([l4_data[2], l4_data[3]]);
            let (protocol, l5_proto) = if proto_byte == PROTO_TCP {
                (Protocol::Tcp, "")
            } else {
                (Protocol::Udp, udp_l5_proto(l4_data))
            };
            Some(PacketSummary {
                time: Utc::now(),
                protocol,
                src_ip,
                src_port: Some(src_port),
                dst_ip,
                dst_port: Some(dst_port),
                l5_proto,
            })
        }
        PROTO_ICMP | PROTO_ICMPV6 => Some(PacketSummary {
            time: Utc::now(),
            protocol: Protocol::Icmp,
            src_ip,
            src_port: None,
            dst_ip,
            dst_port: None,
            l5_proto: "",
        }),
        _ => None,
    }
}

/// Application-layer tag for a UDP datagram.
///
/// All four WireGuard message types start with a one-byte type in 1..=4
/// followed by three reserved zero bytes.
fn udp_l5_proto(l4_data: &[u8]) -> &'static str {
    if l4_data.len() < UDP_HLEN {
        return "";
    }
    let payload = &l4_data[UDP_HLEN..];
    if payload.len() >= 4 && (1..=4).contains(&payload[0]) && payload[1..4] == [0, 0, 0] {
        return "WireGuard";
    }
    ""
}

// ===========================================================================
// Unit tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // PacketBuilder — helper for constructing raw test packets
    // -----------------------------------------------------------------------

    /// A builder for constructing raw Ethernet/IP/L4 packets for testing.
    struct PacketBuilder {
        src_mac: [u8; 6],
        dst_mac: [u8; 6],
        ethertype: u16,
        src_ipv4: Ipv4Addr,
        dst_ipv4: Ipv4Addr,
        src_ipv6: Ipv6Addr,
        dst_ipv6: Ipv6Addr,
        ip_version: u8,
        l4_proto: u8,
        src_port: u16,
        dst_port: u16,
        fragment_offset: u16,
        l4_payload: Vec<u8>,
        // IPv6 extension headers: (next_hdr_type, raw bytes incl. next_hdr + len)
        ipv6_ext_headers: Vec<(u8, Vec<u8>)>,
    }

    impl PacketBuilder {
        fn new() -> Self {
            Self {
                src_mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
                dst_mac: [0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB],
                ethertype: ETHERTYPE_IPV4,
                src_ipv4: Ipv4Addr::new(10, 0, 0, 1),
                dst_ipv4: Ipv4Addr::new(10, 0, 0, 2),
                src_ipv6: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1),
                dst_ipv6: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2),
                ip_version: 4,
                l4_proto: PROTO_UDP,
                src_port: 51820,
                dst_port: 3000,
                fragment_offset: 0,
                l4_payload: Vec::new(),
                ipv6_ext_headers: Vec::new(),
            }
        }

        fn ethertype(mut self, et: u16) -> Self {
            self.ethertype = et;
            self
        }

        fn ipv4(mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
            self.ip_version = 4;
            self.ethertype = ETHERTYPE_IPV4;
            self.src_ipv4 = src;
            self.dst_ipv4 = dst;
            self
        }

        fn ipv6(mut self, src: Ipv6Addr, dst: Ipv6Addr) -> Self {
            self.ip_version = 6;
            self.ethertype = ETHERTYPE_IPV6;
            self.src_ipv6 = src;
            self.dst_ipv6 = dst;
            self
        }

        fn protocol(mut self, proto: u8) -> Self {
            self.l4_proto = proto;
            self
        }

        fn ports(mut self, src: u16, dst: u16) -> Self {
            self.src_port = src;
            self.dst_port = dst;
            self
        }

        fn fragment_offset(mut self, offset: u16) -> Self {
            self.fragment_offset = offset;
            self
        }

        fn payload(mut self, bytes: Vec<u8>) -> Self {
            self.l4_payload = bytes;
            self
        }

        fn ipv6_ext_header(mut self, hdr_type: u8, raw: Vec<u8>) -> Self {
            self.ipv6_ext_headers.push((hdr_type, raw));
            self
        }

        /// Build raw packet bytes including the Ethernet header.
        fn build(&self) -> Vec<u8> {
            let mut pkt = Vec::new();
            pkt.extend_from_slice(&self.dst_mac);
            pkt.extend_from_slice(&self.src_mac);
            pkt.extend_from_slice(&self.ethertype.to_be_bytes());
            pkt.extend_from_slice(&self.build_l3());
            pkt
        }

        /// Build raw packet bytes starting at the IP header (NFLOG framing).
        fn build_l3(&self) -> Vec<u8> {
            let mut pkt = Vec::new();
            match self.ip_version {
                4 => self.build_ipv4(&mut pkt),
                6 => self.build_ipv6(&mut pkt),
                _ => {}
            }
            pkt
        }

        fn build_ipv4(&self, pkt: &mut Vec<u8>) {
            let l4_hdr = self.build_l4();
            let total_len = (IPV4_MIN_HLEN + l4_hdr.len()) as u16;

            pkt.push(0x45); // version 4, IHL 5
            pkt.push(0x00);
            pkt.extend_from_slice(&total_len.to_be_bytes());
            pkt.extend_from_slice(&0u16.to_be_bytes()); // identification
            pkt.extend_from_slice(&self.fragment_offset.to_be_bytes());
            pkt.push(64); // TTL
            pkt.push(self.l4_proto);
            pkt.extend_from_slice(&0u16.to_be_bytes()); // checksum
            pkt.extend_from_slice(&self.src_ipv4.octets());
            pkt.extend_from_slice(&self.dst_ipv4.octets());
            pkt.extend_from_slice(&l4_hdr);
        }

        fn build_ipv6(&self, pkt: &mut Vec<u8>) {
            let l4_hdr = self.build_l4();

            let mut ext_bytes = Vec::new();
            let mut ext_headers = self.ipv6_ext_headers.clone();
            for i in 0..ext_headers.len() {
                let next = if i + 1 < ext_headers.len() {
                    ext_headers[i + 1].0
                } else {
                    self.l4_proto
                };
                ext_headers[i].1[0] = next;
                ext_bytes.extend_from_slice(&ext_headers[i].1);
            }

            let payload_len = (ext_bytes.len() + l4_hdr.len()) as u16;
            let first_next_hdr = if let Some((hdr_type, _)) = ext_headers.first() {
                *hdr_type
            } else {
                self.l4_proto
            };

            pkt.push(0x60);
            pkt.push(0x00);
            pkt.push(0x00);
            pkt.push(0x00);
            pkt.extend_from_slice(&payload_len.to_be_bytes());
            pkt.push(first_next_hdr);
            pkt.push(64); // hop limit
            pkt.extend_from_slice(&self.src_ipv6.octets());
            pkt.extend_from_slice(&self.dst_ipv6.octets());
            pkt.extend_from_slice(&ext_bytes);
            pkt.extend_from_slice(&l4_hdr);
        }

        fn build_l4(&self) -> Vec<u8> {
            let mut l4 = Vec::new();
            match self.l4_proto {
                PROTO_TCP => {
                    l4.extend_from_slice(&self.src_port.to_be_bytes());
                    l4.extend_from_slice(&self.dst_port.to_be_bytes());
                    l4.extend_from_slice(&0u32.to_be_bytes()); // seq
                    l4.extend_from_slice(&0u32.to_be_bytes()); // ack
                    l4.push(0x50); // data offset 5
                    l4.push(0x02); // SYN
                    l4.extend_from_slice(&65535u16.to_be_bytes());
                    l4.extend_from_slice(&0u16.to_be_bytes()); // checksum
                    l4.extend_from_slice(&0u16.to_be_bytes()); // urgent
                }
                PROTO_UDP => {
                    l4.extend_from_slice(&self.src_port.to_be_bytes());
                    l4.extend_from_slice(&self.dst_port.to_be_bytes());
                    let udp_len = (UDP_HLEN + self.l4_payload.len()) as u16;
                    l4.extend_from_slice(&udp_len.to_be_bytes());
                    l4.extend_from_slice(&0u16.to_be_bytes()); // checksum
                }
                PROTO_ICMP | PROTO_ICMPV6 => {
                    l4.push(8); // type: echo request
                    l4.push(0);
                    l4.extend_from_slice(&0u16.to_be_bytes()); // checksum
                    l4.extend_from_slice(&0u32.to_be_bytes());
                }
                _ => {}
            }
            l4.extend_from_slice(&self.l4_payload);
            l4
        }
    }

    // WireGuard handshake initiation prefix: type 1 + 3 reserved zero bytes.
    fn wg_initiation_payload() -> Vec<u8> {
        let mut p = vec![0x01, 0x00, 0x00, 0x00];
        p.extend_from_slice(&[0xAB; 44]);
        p
    }

    #[test]
    fn ipv4_udp_ethernet() {
        let pkt = PacketBuilder::new()
            .ipv4(Ipv4Addr::new(192, 168, 1, 100), Ipv4Addr::new(10, 0, 0, 1))
            .ports(54321, 3000)
            .build();

        let s = parse_single_packet(&pkt, LinkType::Ethernet).unwrap();
        assert_eq!(s.protocol, Protocol::Udp);
        assert_eq!(s.src_ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(s.dst_ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(s.src_port, Some(54321));
        assert_eq!(s.dst_port, Some(3000));
    }

    #[test]
    fn ipv4_udp_raw_frame() {
        let pkt = PacketBuilder::new()
            .ipv4(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1))
            .ports(1111, 3000)
            .build_l3();

        let s = parse_single_packet(&pkt, LinkType::Raw).unwrap();
        assert_eq!(s.protocol, Protocol::Udp);
        assert_eq!(s.remote_addr(), "10.0.0.2:1111");
        assert_eq!(s.destination(), "10.0.0.1:3000");
    }

    #[test]
    fn ipv6_udp_raw_frame_dispatches_on_nibble() {
        let src = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let dst = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2);
        let pkt = PacketBuilder::new()
            .ipv6(src, dst)
            .ports(51820, 3000)
            .build_l3();

        let s = parse_single_packet(&pkt, LinkType::Raw).unwrap();
        assert_eq!(s.protocol, Protocol::Udp);
        assert_eq!(s.src_ip, IpAddr::V6(src));
        assert_eq!(s.remote_addr(), "[2001:db8::1]:51820");
        assert_eq!(s.destination(), "[2001:db8::2]:3000");
    }

    #[test]
    fn ipv4_tcp() {
        let pkt = PacketBuilder::new()
            .ipv4(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
            .protocol(PROTO_TCP)
            .ports(12345, 443)
            .build();

        let s = parse_single_packet(&pkt, LinkType::Ethernet).unwrap();
        assert_eq!(s.protocol, Protocol::Tcp);
        assert_eq!(s.src_port, Some(12345));
        assert_eq!(s.dst_port, Some(443));
        assert_eq!(s.l5_proto, "");
    }

    #[test]
    fn wireguard_payload_tagged() {
        let pkt = PacketBuilder::new()
            .ipv4(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1))
            .ports(51820, 3000)
            .payload(wg_initiation_payload())
            .build_l3();

        let s = parse_single_packet(&pkt, LinkType::Raw).unwrap();
        assert_eq!(s.l5_proto, "WireGuard");
    }

    #[test]
    fn non_wireguard_payload_untagged() {
        let pkt = PacketBuilder::new()
            .ipv4(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1))
            .ports(5353, 5353)
            .payload(vec![0x12, 0x34, 0x00, 0x20])
            .build_l3();

        let s = parse_single_packet(&pkt, LinkType::Raw).unwrap();
        assert_eq!(s.l5_proto, "");
    }

    #[test]
    fn icmp_has_no_ports() {
        let pkt = PacketBuilder::new()
            .ipv4(Ipv4Addr::new(192, 168, 0, 1), Ipv4Addr::new(8, 8, 4, 4))
            .protocol(PROTO_ICMP)
            .build();

        let s = parse_single_packet(&pkt, LinkType::Ethernet).unwrap();
        assert_eq!(s.protocol, Protocol::Icmp);
        assert_eq!(s.src_port, None);
        assert_eq!(s.dst_port, None);
        assert_eq!(s.remote_addr(), "192.168.0.1:");
    }

    #[test]
    fn truncated_less_than_ethernet() {
        let data = vec![0u8; 10];
        assert!(parse_single_packet(&data, LinkType::Ethernet).is_none());
    }

    #[test]
    fn arp_ethertype_rejected() {
        let pkt = PacketBuilder::new().ethertype(0x0806).build();
        assert!(parse_single_packet(&pkt, LinkType::Ethernet).is_none());
    }

    #[test]
    fn non_first_fragment_rejected() {
        let pkt = PacketBuilder::new()
            .ipv4(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
            .ports(80, 12345)
            .fragment_offset(185)
            .build();

        assert!(parse_single_packet(&pkt, LinkType::Ethernet).is_none());
    }

    #[test]
    fn ipv6_hop_by_hop_then_udp() {
        let src = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let dst = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2);
        let mut raw = vec![0u8; 8];
        raw[1] = 0; // hdr_ext_len = 0 → 8 bytes

        let pkt = PacketBuilder::new()
            .ipv6(src, dst)
            .ports(10000, 3000)
            .ipv6_ext_header(EXT_HOP_BY_HOP, raw)
            .build();

        let s = parse_single_packet(&pkt, LinkType::Ethernet).unwrap();
        assert_eq!(s.protocol, Protocol::Udp);
        assert_eq!(s.src_port, Some(10000));
        assert_eq!(s.dst_port, Some(3000));
    }
}
