//! Packet capture strategies for STUN replies.
//!
//! Each platform gets the cheapest reliable way to observe datagrams sent to
//! the WireGuard port without binding it:
//!
//! - **Linux**: raw UDP socket with a kernel BPF filter attached
//! - **macOS / FreeBSD**: one `/dev/bpf` device per eligible interface, the
//!   first interface to deliver the reply the session accepts wins
//! - **Windows**: raw socket with filtering in userspace
//!
//! All strategies hand back the UDP header and payload of frames that passed
//! the filter; link and IP framing is stripped.

use std::time::Duration;

use crate::AddressFamily;
use crate::error::TransportResult;
use crate::udp::UdpHeader;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxCapture as PlatformCapture;

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
mod bsd;
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub use bsd::BpfCapture as PlatformCapture;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsCapture as PlatformCapture;

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    windows
)))]
mod unsupported;
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    windows
)))]
pub use unsupported::UnsupportedCapture as PlatformCapture;

/// Largest frame read from a capture in one go.
pub const MAX_FRAME: usize = 65_536;

/// Parameters for opening a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureParams {
    /// Local (WireGuard listen) port replies are addressed to
    pub local_port: u16,
    /// Address family to capture
    pub family: AddressFamily,
    /// Interface never to capture on (the WireGuard interface itself)
    pub exclude_interface: Option<String>,
}

/// A UDP datagram observed by a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// UDP header
    pub header: UdpHeader,
    /// UDP payload
    pub payload: Vec<u8>,
}

/// Blocking capture of filtered UDP datagrams.
///
/// Implementations release every OS resource on drop; a capture that has
/// been dropped no longer holds sockets, devices or worker threads.
pub trait PacketCapture: Send + Sync + Sized + 'static {
    /// Open a capture matching STUN replies to `params.local_port`.
    fn open(params: &CaptureParams) -> TransportResult<Self>;

    /// Wait up to `timeout` for the next datagram.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing captured.
    fn next_datagram(&self, timeout: Duration) -> TransportResult<Option<Datagram>>;
}
