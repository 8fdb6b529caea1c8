//! ICMP echo probing.
//!
//! A probe sends one echo request and waits for an echo reply from the
//! target. Raw ICMP sockets are tried first; on Linux, unprivileged
//! `SOCK_DGRAM` ping sockets are used as a fallback, in which case the kernel
//! owns the identifier and replies arrive without an IP header.

use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

use crate::AddressFamily;
use crate::error::{TransportError, TransportResult};

/// Echo request payload.
pub const PING_PAYLOAD: &[u8] = b"stunmesh-ping";

/// Identifier carried by echo requests on raw sockets.
pub const PING_IDENTIFIER: u16 = 1;

/// Sequence number carried by echo requests.
pub const PING_SEQUENCE: u16 = 1;

const ICMP_HEADER_LEN: usize = 8;
const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV4_ECHO_REPLY: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// RFC 1071 internet checksum.
#[must_use]
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(u16::from_be_bytes([*hi, 0])),
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Build an echo request.
///
/// ICMPv6 checksums cover a pseudo-header only the kernel knows, so they are
/// left zero for the kernel to fill in.
#[must_use]
pub fn echo_request(family: AddressFamily, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let kind = match family {
        AddressFamily::V4 => ICMPV4_ECHO_REQUEST,
        AddressFamily::V6 => ICMPV6_ECHO_REQUEST,
    };
    let mut packet = Vec::with_capacity(ICMP_HEADER_LEN + payload.len());
    packet.extend_from_slice(&[kind, 0, 0, 0]);
    packet.extend_from_slice(&identifier.to_be_bytes());
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(payload);

    if family == AddressFamily::V4 {
        let sum = checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    packet
}

/// Fields of a received echo reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    /// Echo identifier
    pub identifier: u16,
    /// Echo sequence number
    pub sequence: u16,
}

/// Parse an echo reply, skipping an IPv4 header when `with_ip_header`.
#[must_use]
pub fn parse_echo_reply(family: AddressFamily, packet: &[u8], with_ip_header: bool) -> Option<EchoReply> {
    let icmp = if with_ip_header {
        let ihl = usize::from(packet.first()? & 0x0f) * 4;
        packet.get(ihl..)?
    } else {
        packet
    };
    let header = icmp.get(..ICMP_HEADER_LEN)?;
    let expected = match family {
        AddressFamily::V4 => ICMPV4_ECHO_REPLY,
        AddressFamily::V6 => ICMPV6_ECHO_REPLY,
    };
    if header[0] != expected || header[1] != 0 {
        return None;
    }
    Some(EchoReply {
        identifier: u16::from_be_bytes([header[4], header[5]]),
        sequence: u16::from_be_bytes([header[6], header[7]]),
    })
}

struct EchoSocket {
    socket: Socket,
    family: AddressFamily,
    with_ip_header: bool,
}

impl EchoSocket {
    fn open(family: AddressFamily) -> TransportResult<Self> {
        let (domain, protocol) = match family {
            AddressFamily::V4 => (Domain::IPV4, Protocol::ICMPV4),
            AddressFamily::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };

        match Socket::new(domain, Type::RAW, Some(protocol)) {
            Ok(socket) => Ok(Self {
                socket,
                family,
                with_ip_header: family == AddressFamily::V4,
            }),
            #[cfg(target_os = "linux")]
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                let socket = Socket::new(domain, Type::DGRAM, Some(protocol))
                    .map_err(|e| TransportError::opening("ICMP socket", e))?;
                Ok(Self {
                    socket,
                    family,
                    with_ip_header: false,
                })
            }
            Err(e) => Err(TransportError::opening("ICMP socket", e)),
        }
    }

    fn recv_from<'a>(&self, buf: &'a mut [MaybeUninit<u8>]) -> io::Result<(&'a [u8], Option<IpAddr>)> {
        let (n, from) = self.socket.recv_from(buf)?;
        // SAFETY: recv_from initialised the first `n` bytes.
        let data = unsafe { std::slice::from_raw_parts(buf.as_ptr().cast::<u8>(), n) };
        Ok((data, from.as_socket().map(|addr| addr.ip())))
    }
}

/// Send one echo request to `target` and wait up to `timeout` for a reply.
///
/// Returns `Ok(false)` on timeout. Replies from other hosts are ignored.
///
/// This call blocks; async callers should run it on a blocking thread.
pub fn ping(target: IpAddr, timeout: Duration) -> TransportResult<bool> {
    let family = AddressFamily::of(&target);
    let echo = EchoSocket::open(family)?;

    let request = echo_request(family, PING_IDENTIFIER, PING_SEQUENCE, PING_PAYLOAD);
    echo.socket
        .send_to(&request, &SockAddr::from(SocketAddr::new(target, 0)))?;

    let deadline = Instant::now() + timeout;
    let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        echo.socket
            .set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

        let (data, from) = match echo.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(false);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if from != Some(target) {
            continue;
        }
        if let Some(reply) = parse_echo_reply(echo.family, data, echo.with_ip_header) {
            trace!(%target, sequence = reply.sequence, "echo reply");
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_rfc1071_example() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn test_echo_request_v4_verifies() {
        let packet = echo_request(AddressFamily::V4, 1, 1, PING_PAYLOAD);
        assert_eq!(packet[0], 8);
        assert_eq!(&packet[4..8], &[0, 1, 0, 1]);
        assert_eq!(&packet[8..], PING_PAYLOAD);
        assert_eq!(checksum(&packet), 0);
    }

    #[test]
    fn test_echo_request_v6_leaves_checksum() {
        let packet = echo_request(AddressFamily::V6, 1, 1, b"");
        assert_eq!(packet, vec![128, 0, 0, 0, 0, 1, 0, 1]);
    }

    #[test]
    fn test_parse_reply_with_ip_header() {
        let mut packet = vec![0x45];
        packet.extend([0u8; 19]);
        packet.extend([0, 0, 0, 0, 0x12, 0x34, 0x00, 0x07]);

        let reply = parse_echo_reply(AddressFamily::V4, &packet, true).unwrap();
        assert_eq!(reply, EchoReply { identifier: 0x1234, sequence: 7 });
    }

    #[test]
    fn test_parse_rejects_requests_and_wrong_family() {
        let request = echo_request(AddressFamily::V4, 1, 1, b"");
        assert!(parse_echo_reply(AddressFamily::V4, &request, false).is_none());

        let reply = [129, 0, 0, 0, 0, 1, 0, 1];
        assert!(parse_echo_reply(AddressFamily::V6, &reply, false).is_some());
        assert!(parse_echo_reply(AddressFamily::V4, &reply, false).is_none());
        assert!(parse_echo_reply(AddressFamily::V6, &reply[..4], false).is_none());
    }
}
