//! Raw IP sockets for sending pseudo-UDP datagrams.

use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use crate::AddressFamily;
use crate::error::{TransportError, TransportResult};

/// Destination for hand-framed UDP datagrams.
///
/// Implemented by [`RawSocket`]; tests substitute an in-memory sink.
pub trait PacketSink: Send + Sync {
    /// Send a framed UDP datagram (header included) to `dst`.
    fn send_datagram(&self, datagram: &[u8], dst: IpAddr) -> TransportResult<usize>;
}

/// Raw `IPPROTO_UDP` socket. The kernel supplies the IP header.
pub struct RawSocket {
    socket: Socket,
    family: AddressFamily,
}

// Offset of the checksum field inside the UDP header.
#[cfg(unix)]
const UDP_CHECKSUM_OFFSET: libc::c_int = 6;

#[cfg(target_os = "linux")]
const IPV6_CHECKSUM: libc::c_int = libc::IPV6_CHECKSUM;
#[cfg(all(unix, not(target_os = "linux")))]
const IPV6_CHECKSUM: libc::c_int = 26;

impl RawSocket {
    /// Open a raw UDP socket for `family`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PermissionDenied`] without raw socket
    /// privileges.
    pub fn open(family: AddressFamily) -> TransportResult<Self> {
        let domain = match family {
            AddressFamily::V4 => Domain::IPV4,
            AddressFamily::V6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::RAW, Some(Protocol::UDP))
            .map_err(|e| TransportError::opening("raw UDP socket", e))?;

        #[cfg(unix)]
        if family == AddressFamily::V6 {
            // IPv6 forbids a zero UDP checksum; have the kernel compute it.
            set_int_option(&socket, libc::IPPROTO_IPV6, IPV6_CHECKSUM, UDP_CHECKSUM_OFFSET)?;
        }

        // The send socket never reads; keep the kernel from queueing every
        // UDP packet on the host for it.
        #[cfg(target_os = "linux")]
        attach_filter(&socket, &[crate::bpf::Instruction { code: crate::bpf::RET_K, jt: 0, jf: 0, k: 0 }])?;

        debug!(%family, "opened raw UDP send socket");
        Ok(Self { socket, family })
    }

    /// Address family of this socket.
    #[must_use]
    pub fn family(&self) -> AddressFamily {
        self.family
    }
}

impl PacketSink for RawSocket {
    fn send_datagram(&self, datagram: &[u8], dst: IpAddr) -> TransportResult<usize> {
        let addr = SockAddr::from(SocketAddr::new(dst, 0));
        Ok(self.socket.send_to(datagram, &addr)?)
    }
}

#[cfg(unix)]
pub(crate) fn set_int_option(
    socket: &Socket,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) -> TransportResult<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: `value` outlives the call and the length matches its type.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            (&raw const value).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// Attach a classic BPF program with `SO_ATTACH_FILTER`.
#[cfg(target_os = "linux")]
pub(crate) fn attach_filter(socket: &Socket, program: &[crate::bpf::Instruction]) -> TransportResult<()> {
    use std::os::fd::AsRawFd;

    let fprog = libc::sock_fprog {
        len: program.len() as libc::c_ushort,
        filter: program.as_ptr().cast_mut().cast::<libc::sock_filter>(),
    };
    // SAFETY: `Instruction` is layout-compatible with `sock_filter`; the
    // kernel copies the program before returning.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            (&raw const fprog).cast(),
            std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(TransportError::FilterAttach(std::io::Error::last_os_error().to_string()));
    }
    Ok(())
}
