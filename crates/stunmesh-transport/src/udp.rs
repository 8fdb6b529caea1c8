//! Pseudo-UDP framing for raw sockets.
//!
//! A raw `IPPROTO_UDP` socket hands us the UDP layer to build ourselves. The
//! header carries the WireGuard listen port as source so the NAT maps the
//! probe exactly like WireGuard traffic. The checksum is left at zero, which
//! IPv4 treats as "not computed"; on IPv6 the kernel fills it in (see
//! [`crate::raw`]).

use crate::AddressFamily;

/// Size of the UDP header.
pub const UDP_HEADER_LEN: usize = 8;

/// Fixed IPv6 header length (extension headers are not expected on replies).
pub const IPV6_HEADER_LEN: usize = 40;

/// UDP header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Header plus payload length
    pub length: u16,
    /// Checksum, zero when not computed
    pub checksum: u16,
}

impl UdpHeader {
    /// Frame `payload` behind a header from `src_port` to `dst_port`.
    ///
    /// Payloads that do not fit a UDP length field are truncated to fit.
    #[must_use]
    pub fn frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let payload = &payload[..payload.len().min(usize::from(u16::MAX) - UDP_HEADER_LEN)];
        let length = (UDP_HEADER_LEN + payload.len()) as u16;

        let mut out = Vec::with_capacity(usize::from(length));
        out.extend_from_slice(&src_port.to_be_bytes());
        out.extend_from_slice(&dst_port.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Parse the first eight bytes of `data`.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        let raw: &[u8; UDP_HEADER_LEN] = data.get(..UDP_HEADER_LEN)?.try_into().ok()?;
        Some(Self {
            src_port: u16::from_be_bytes([raw[0], raw[1]]),
            dst_port: u16::from_be_bytes([raw[2], raw[3]]),
            length: u16::from_be_bytes([raw[4], raw[5]]),
            checksum: u16::from_be_bytes([raw[6], raw[7]]),
        })
    }
}

/// Where the UDP header sits inside a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Bytes of link-layer header before the IP header
    pub link_header: usize,
    /// IP header present in the frame, if any
    pub ip_header: Option<AddressFamily>,
}

impl FrameLayout {
    /// Frame begins directly at the UDP header (Linux/Windows IPv6 raw sockets).
    pub const UDP_ONLY: Self = Self {
        link_header: 0,
        ip_header: None,
    };

    /// Frame begins at an IP header of `family` with no link header.
    #[must_use]
    pub const fn ip(family: AddressFamily) -> Self {
        Self {
            link_header: 0,
            ip_header: Some(family),
        }
    }

    /// Offset of the UDP header within `frame`, if the frame is long enough.
    #[must_use]
    pub fn udp_offset(&self, frame: &[u8]) -> Option<usize> {
        let ip_start = self.link_header;
        let ip_len = match self.ip_header {
            None => 0,
            Some(AddressFamily::V4) => usize::from(frame.get(ip_start)? & 0x0f) * 4,
            Some(AddressFamily::V6) => IPV6_HEADER_LEN,
        };
        let offset = ip_start + ip_len;
        (frame.len() >= offset + UDP_HEADER_LEN).then_some(offset)
    }
}

/// Split a captured frame into its UDP header and payload.
///
/// The payload is bounded by the UDP length field when it is smaller than
/// the captured data (Ethernet padding).
#[must_use]
pub fn split_frame(frame: &[u8], layout: FrameLayout) -> Option<(UdpHeader, &[u8])> {
    let offset = layout.udp_offset(frame)?;
    let header = UdpHeader::parse(&frame[offset..])?;
    let body = &frame[offset + UDP_HEADER_LEN..];
    let declared = usize::from(header.length).saturating_sub(UDP_HEADER_LEN);
    let body = if declared > 0 && declared < body.len() {
        &body[..declared]
    } else {
        body
    };
    Some((header, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let packet = UdpHeader::frame(51820, 3478, b"hello");
        assert_eq!(packet.len(), 13);
        assert_eq!(&packet[..2], &51820u16.to_be_bytes());
        assert_eq!(&packet[2..4], &3478u16.to_be_bytes());
        assert_eq!(&packet[4..6], &13u16.to_be_bytes());
        assert_eq!(&packet[6..8], &[0, 0]);
        assert_eq!(&packet[8..], b"hello");
    }

    #[test]
    fn test_parse_header() {
        let packet = UdpHeader::frame(1, 2, b"x");
        let header = UdpHeader::parse(&packet).unwrap();
        assert_eq!(header.src_port, 1);
        assert_eq!(header.dst_port, 2);
        assert_eq!(header.length, 9);
        assert_eq!(header.checksum, 0);
        assert!(UdpHeader::parse(&packet[..7]).is_none());
    }

    #[test]
    fn test_split_ipv4_with_options() {
        // IHL = 6 words (24 bytes) to exercise variable header length
        let mut frame = vec![0u8; 24];
        frame[0] = 0x46;
        frame.extend(UdpHeader::frame(3478, 51820, b"stun"));

        let (header, body) = split_frame(&frame, FrameLayout::ip(AddressFamily::V4)).unwrap();
        assert_eq!(header.dst_port, 51820);
        assert_eq!(body, b"stun");
    }

    #[test]
    fn test_split_ethernet_ipv6_with_padding() {
        let mut frame = vec![0u8; 14 + IPV6_HEADER_LEN];
        frame.extend(UdpHeader::frame(3478, 51820, b"ab"));
        frame.extend([0u8; 6]);

        let layout = FrameLayout {
            link_header: 14,
            ip_header: Some(AddressFamily::V6),
        };
        let (_, body) = split_frame(&frame, layout).unwrap();
        assert_eq!(body, b"ab");
    }

    #[test]
    fn test_split_udp_only() {
        let frame = UdpHeader::frame(3478, 51820, b"payload");
        let (header, body) = split_frame(&frame, FrameLayout::UDP_ONLY).unwrap();
        assert_eq!(header.src_port, 3478);
        assert_eq!(body, b"payload");
    }

    #[test]
    fn test_split_truncated() {
        let mut frame = vec![0x45u8; 20];
        frame.extend([0u8; 4]);
        assert!(split_frame(&frame, FrameLayout::ip(AddressFamily::V4)).is_none());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn split_never_panics(frame in prop::collection::vec(any::<u8>(), 0..128), link in 0usize..20) {
                for ip_header in [None, Some(AddressFamily::V4), Some(AddressFamily::V6)] {
                    let _ = split_frame(&frame, FrameLayout { link_header: link, ip_header });
                }
            }

            #[test]
            fn framed_payload_splits_back(src in any::<u16>(), dst in any::<u16>(), payload in prop::collection::vec(any::<u8>(), 0..256)) {
                let frame = UdpHeader::frame(src, dst, &payload);
                let (header, body) = split_frame(&frame, FrameLayout::UDP_ONLY).unwrap();
                prop_assert_eq!((header.src_port, header.dst_port), (src, dst));
                prop_assert_eq!(body, &payload[..]);
            }
        }
    }
}
