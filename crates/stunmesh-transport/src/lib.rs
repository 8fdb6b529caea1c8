//! # stunmesh Transport
//!
//! Raw packet plumbing for stunmesh.
//!
//! This crate provides:
//! - Raw IP sockets that send hand-framed UDP datagrams from any source port
//! - Classic BPF programs matching STUN replies for a given local port
//! - Per-platform capture strategies behind a single [`PacketCapture`] contract
//! - ICMP echo probing
//!
//! Sending STUN from a raw socket lets the daemon reuse the WireGuard listen
//! port as the source port without binding it, so the mapping discovered is
//! the one the WireGuard socket itself uses through the NAT.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bpf;
pub mod capture;
pub mod error;
pub mod icmp;
pub mod raw;
pub mod udp;

pub use capture::{CaptureParams, Datagram, PacketCapture, PlatformCapture};
pub use error::{TransportError, TransportResult};
pub use raw::{PacketSink, RawSocket};
pub use udp::UdpHeader;

use std::net::IpAddr;

/// IP address family of a socket or capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4
    V4,
    /// IPv6
    V6,
}

impl AddressFamily {
    /// Family of an address.
    #[must_use]
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Whether `ip` belongs to this family.
    #[must_use]
    pub fn matches(self, ip: &IpAddr) -> bool {
        Self::of(ip) == self
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => f.write_str("ipv4"),
            Self::V6 => f.write_str("ipv6"),
        }
    }
}
