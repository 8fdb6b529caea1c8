//! Windows capture: raw socket with userspace filtering.
//!
//! Winsock has no socket filter, so every UDP packet delivered to the raw
//! socket is inspected here.

use std::io::{self, Read};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use super::{CaptureParams, Datagram, MAX_FRAME, PacketCapture};
use crate::AddressFamily;
use crate::bpf::STUN_MAGIC_COOKIE;
use crate::error::{TransportError, TransportResult};
use crate::udp::{FrameLayout, split_frame};

/// Raw-socket capture filtered in userspace.
pub struct WindowsCapture {
    socket: Socket,
    layout: FrameLayout,
    local_port: u16,
}

fn is_stun_reply(payload: &[u8]) -> bool {
    payload
        .get(4..8)
        .is_some_and(|cookie| cookie == STUN_MAGIC_COOKIE.to_be_bytes())
}

impl PacketCapture for WindowsCapture {
    fn open(params: &CaptureParams) -> TransportResult<Self> {
        let (domain, bind, layout) = match params.family {
            AddressFamily::V4 => (
                Domain::IPV4,
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, params.local_port)),
                FrameLayout::ip(AddressFamily::V4),
            ),
            AddressFamily::V6 => (
                Domain::IPV6,
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, params.local_port)),
                FrameLayout::UDP_ONLY,
            ),
        };
        let socket = Socket::new(domain, Type::RAW, Some(Protocol::UDP))
            .map_err(|e| TransportError::opening("raw capture socket", e))?;
        socket.bind(&bind.into())?;

        debug!(port = params.local_port, family = %params.family, "raw capture socket bound");
        Ok(Self {
            socket,
            layout,
            local_port: params.local_port,
        })
    }

    fn next_datagram(&self, timeout: Duration) -> TransportResult<Option<Datagram>> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_FRAME];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket
                .set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

            let n = match (&self.socket).read(&mut buf) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if let Some((header, payload)) = split_frame(&buf[..n], self.layout) {
                if header.dst_port == self.local_port && is_stun_reply(payload) {
                    return Ok(Some(Datagram {
                        header,
                        payload: payload.to_vec(),
                    }));
                }
            }
        }
    }
}
