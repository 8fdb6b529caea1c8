//! One-shot STUN Binding discovery over a raw socket.
//!
//! The request leaves from the WireGuard listen port without binding it:
//! the session frames the UDP header itself and hands it to a raw
//! [`PacketSink`]. The reply is observed through a [`PacketCapture`] whose
//! filter already matched the destination port and magic cookie.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use stunmesh_transport::{PacketCapture, PacketSink, UdpHeader};
use tracing::{debug, trace};

use crate::error::DiscoveryError;
use crate::stun::{StunMessage, StunMessageClass};

/// Default reply deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A discovery session bound to one local port.
///
/// Blocking; run it on a blocking thread from async code. Dropping or
/// [`stop`](Self::stop)ping the session releases the capture, which joins any
/// capture workers before closing their handles.
pub struct StunSession<C: PacketCapture, S: PacketSink> {
    capture: C,
    sink: S,
    local_port: u16,
    timeout: Duration,
}

impl<C: PacketCapture, S: PacketSink> StunSession<C, S> {
    /// Create a session sending from `local_port`.
    pub fn new(capture: C, sink: S, local_port: u16) -> Self {
        Self {
            capture,
            sink,
            local_port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the reply deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one Binding Request to `server` and return the mapped address.
    ///
    /// No internal retry. Replies carrying a different transaction ID are
    /// ignored until the deadline.
    pub fn discover(&self, server: SocketAddr) -> Result<SocketAddr, DiscoveryError> {
        let request = StunMessage::binding_request();
        let datagram = UdpHeader::frame(self.local_port, server.port(), &request.encode());
        self.sink.send_datagram(&datagram, server.ip())?;
        trace!(%server, local_port = self.local_port, "sent STUN binding request");

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(reply) = self.capture.next_datagram(remaining)? else {
                break;
            };

            if StunMessage::peek_transaction_id(&reply.payload) != Some(request.transaction_id) {
                trace!(src_port = reply.header.src_port, "ignoring reply for another transaction");
                continue;
            }

            let response = StunMessage::decode(&reply.payload)?;
            return Self::mapped_address(server, &response);
        }

        Err(DiscoveryError::Timeout {
            server,
            timeout_ms: self.timeout.as_millis(),
        })
    }

    fn mapped_address(server: SocketAddr, response: &StunMessage) -> Result<SocketAddr, DiscoveryError> {
        match response.class {
            StunMessageClass::SuccessResponse => {}
            StunMessageClass::ErrorResponse => {
                let (code, reason) = response.error_code().unwrap_or((0, ""));
                return Err(DiscoveryError::ErrorResponse {
                    code,
                    reason: reason.to_string(),
                });
            }
            other => {
                return Err(DiscoveryError::Malformed(
                    crate::stun::StunError::InvalidMessageType(other.binding_type()),
                ));
            }
        }

        debug!(
            %server,
            mapped = ?response.mapped_address(),
            other = ?response.other_address(),
            software = ?response.software(),
            "STUN binding response"
        );

        response
            .xor_mapped_address()
            .ok_or(DiscoveryError::MissingXorMappedAddress(server))
    }

    /// Release the sink and capture, waiting for capture workers to exit.
    pub fn stop(self) {
        let Self { capture, sink, .. } = self;
        drop(capture);
        drop(sink);
    }
}
