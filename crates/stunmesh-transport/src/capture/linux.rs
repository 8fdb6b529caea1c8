//! Linux capture: raw UDP socket with a kernel BPF filter.
//!
//! IPv4 raw sockets deliver the IP header; IPv6 raw sockets deliver the
//! packet starting at the UDP header.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace};

use super::{CaptureParams, Datagram, MAX_FRAME, PacketCapture};
use crate::AddressFamily;
use crate::bpf::{LinkType, StunFilter};
use crate::error::{TransportError, TransportResult};
use crate::raw::attach_filter;
use crate::udp::{FrameLayout, split_frame};

/// Raw-socket capture with `SO_ATTACH_FILTER`.
pub struct LinuxCapture {
    socket: Socket,
    layout: FrameLayout,
    local_port: u16,
}

impl PacketCapture for LinuxCapture {
    fn open(params: &CaptureParams) -> TransportResult<Self> {
        let (domain, ip_header) = match params.family {
            AddressFamily::V4 => (Domain::IPV4, Some(AddressFamily::V4)),
            AddressFamily::V6 => (Domain::IPV6, None),
        };
        let socket = Socket::new(domain, Type::RAW, Some(Protocol::UDP))
            .map_err(|e| TransportError::opening("raw capture socket", e))?;

        let filter = StunFilter {
            port: params.local_port,
            link: LinkType::None,
            ip_header,
        };
        attach_filter(&socket, &filter.program())?;

        debug!(port = params.local_port, family = %params.family, "attached STUN capture filter");
        Ok(Self {
            socket,
            layout: filter.layout(),
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

            match split_frame(&buf[..n], self.layout) {
                Some((header, payload)) if header.dst_port == self.local_port => {
                    return Ok(Some(Datagram {
                        header,
                        payload: payload.to_vec(),
                    }));
                }
                _ => trace!(len = n, "dropping frame that slipped past the filter"),
            }
        }
    }
}
