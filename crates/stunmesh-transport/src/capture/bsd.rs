//! BSD capture through `/dev/bpf`.
//!
//! One BPF device is opened per eligible interface (up, not loopback, not the
//! WireGuard interface, carrying an address of the requested family). Each
//! device is serviced by its own thread and forwards every frame that passes
//! the kernel filter. The session picks the reply carrying its transaction
//! ID, so stray STUN traffic on one interface never stops capture on the
//! others. Dropping the capture stops and joins every worker.

use std::ffi::CStr;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{CaptureParams, Datagram, PacketCapture};
use crate::AddressFamily;
use crate::bpf::{Instruction, LinkType, RecordLayout, Records, StunFilter};
use crate::error::{TransportError, TransportResult};
use crate::udp::{FrameLayout, split_frame};

// _IOR/_IOW('B', n, T) request codes; identical on macOS and FreeBSD (LP64).
const BIOCGBLEN: libc::c_ulong = 0x4004_4266;
const BIOCSETF: libc::c_ulong = 0x8010_4267;
const BIOCGDLT: libc::c_ulong = 0x4004_426a;
const BIOCSETIF: libc::c_ulong = 0x8020_426c;
const BIOCIMMEDIATE: libc::c_ulong = 0x8004_4270;

#[cfg(target_os = "macos")]
const RECORD_LAYOUT: RecordLayout = RecordLayout::MACOS;
#[cfg(target_os = "freebsd")]
const RECORD_LAYOUT: RecordLayout = RecordLayout::FREEBSD;

/// How often workers re-check the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[repr(C)]
struct BpfProgram {
    bf_len: libc::c_uint,
    bf_insns: *mut Instruction,
}

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_data: [u8; 16],
}

fn ioctl<T>(file: &File, request: libc::c_ulong, arg: *mut T) -> io::Result<()> {
    // SAFETY: callers pass a pointer to a value of the type `request` expects.
    if unsafe { libc::ioctl(file.as_raw_fd(), request, arg) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// An open BPF device bound to one interface.
struct BpfDevice {
    file: File,
    interface: String,
    layout: FrameLayout,
    buffer_len: usize,
}

impl BpfDevice {
    fn open_any() -> TransportResult<File> {
        let cloning = std::iter::once("/dev/bpf".to_string());
        let numbered = (0..256).map(|i| format!("/dev/bpf{i}"));
        for path in cloning.chain(numbered) {
            match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    return Err(TransportError::PermissionDenied("/dev/bpf"));
                }
                Err(_) => continue,
            }
        }
        Err(TransportError::NoInterface("no free /dev/bpf device".into()))
    }

    fn open(interface: &str, params: &CaptureParams) -> TransportResult<Self> {
        let file = Self::open_any()?;

        let mut buffer_len: libc::c_uint = 0;
        ioctl(&file, BIOCGBLEN, &raw mut buffer_len)?;

        let mut ifreq = IfReq {
            ifr_name: [0; libc::IFNAMSIZ],
            ifr_data: [0; 16],
        };
        for (dst, src) in ifreq
            .ifr_name
            .iter_mut()
            .zip(interface.bytes().take(libc::IFNAMSIZ - 1))
        {
            *dst = src as libc::c_char;
        }
        ioctl(&file, BIOCSETIF, &raw mut ifreq)?;

        let mut immediate: libc::c_uint = 1;
        ioctl(&file, BIOCIMMEDIATE, &raw mut immediate)?;

        let mut dlt: libc::c_uint = 0;
        ioctl(&file, BIOCGDLT, &raw mut dlt)?;
        let link = LinkType::from_dlt(dlt).ok_or_else(|| {
            TransportError::NoInterface(format!("{interface}: unsupported link type {dlt}"))
        })?;

        let filter = StunFilter {
            port: params.local_port,
            link,
            ip_header: Some(params.family),
        };
        let mut instructions = filter.program();
        let mut program = BpfProgram {
            bf_len: instructions.len() as libc::c_uint,
            bf_insns: instructions.as_mut_ptr(),
        };
        ioctl(&file, BIOCSETF, &raw mut program)
            .map_err(|e| TransportError::FilterAttach(format!("{interface}: {e}")))?;

        Ok(Self {
            file,
            interface: interface.to_string(),
            layout: filter.layout(),
            buffer_len: buffer_len as usize,
        })
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: one valid pollfd.
        let rc = unsafe { libc::poll(&raw mut pfd, 1, timeout.as_millis() as libc::c_int) };
        match rc {
            n if n < 0 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted { Ok(false) } else { Err(err) }
            }
            0 => Ok(false),
            _ => Ok(true),
        }
    }
}

/// Forward the frames of one BPF read addressed to `local_port`.
///
/// Returns `false` once the receiving side is gone.
fn forward_records(
    buf: &[u8],
    records: RecordLayout,
    layout: FrameLayout,
    local_port: u16,
    tx: &Sender<Datagram>,
) -> bool {
    for frame in Records::new(buf, records) {
        let Some((header, payload)) = split_frame(frame, layout) else {
            continue;
        };
        if header.dst_port != local_port {
            continue;
        }
        trace!(len = payload.len(), "captured STUN candidate");
        let datagram = Datagram {
            header,
            payload: payload.to_vec(),
        };
        if tx.send(datagram).is_err() {
            return false;
        }
    }
    true
}

fn run_worker(device: BpfDevice, local_port: u16, stop: Arc<AtomicBool>, tx: Sender<Datagram>) {
    let mut buf = vec![0u8; device.buffer_len];

    while !stop.load(Ordering::Acquire) {
        match device.wait_readable(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!(interface = %device.interface, error = %e, "bpf poll failed");
                return;
            }
        }

        let n = match (&device.file).read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(interface = %device.interface, error = %e, "bpf read failed");
                return;
            }
        };

        if !forward_records(&buf[..n], RECORD_LAYOUT, device.layout, local_port, &tx) {
            return;
        }
    }
}

fn candidate_interfaces(family: AddressFamily, exclude: Option<&str>) -> io::Result<Vec<String>> {
    let wanted = match family {
        AddressFamily::V4 => libc::AF_INET,
        AddressFamily::V6 => libc::AF_INET6,
    };

    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: getifaddrs fills `head` with a list released by freeifaddrs.
    if unsafe { libc::getifaddrs(&raw mut head) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut names: Vec<String> = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: `cursor` walks the list returned by getifaddrs.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        let flags = entry.ifa_flags as libc::c_int;
        if flags & libc::IFF_UP == 0 || flags & libc::IFF_LOOPBACK != 0 || entry.ifa_addr.is_null() {
            continue;
        }
        // SAFETY: ifa_addr was checked non-null.
        let addr_family = libc::c_int::from(unsafe { (*entry.ifa_addr).sa_family });
        if addr_family != wanted {
            continue;
        }
        // SAFETY: ifa_name is a NUL-terminated string owned by the list.
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();
        if Some(name.as_str()) == exclude || names.contains(&name) {
            continue;
        }
        names.push(name);
    }

    // SAFETY: `head` came from getifaddrs and is freed exactly once.
    unsafe { libc::freeifaddrs(head) };
    Ok(names)
}

/// Multi-interface `/dev/bpf` capture.
pub struct BpfCapture {
    rx: Mutex<Receiver<Datagram>>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl PacketCapture for BpfCapture {
    fn open(params: &CaptureParams) -> TransportResult<Self> {
        let interfaces = candidate_interfaces(params.family, params.exclude_interface.as_deref())?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let mut workers = Vec::new();
        let mut last_error = None;

        for interface in &interfaces {
            let device = match BpfDevice::open(interface, params) {
                Ok(device) => device,
                Err(err @ TransportError::PermissionDenied(_)) => return Err(err),
                Err(err) => {
                    debug!(%interface, error = %err, "skipping interface");
                    last_error = Some(err);
                    continue;
                }
            };
            let stop = Arc::clone(&stop);
            let tx = tx.clone();
            let local_port = params.local_port;
            let handle = std::thread::Builder::new()
                .name(format!("bpf-{interface}"))
                .spawn(move || run_worker(device, local_port, stop, tx))?;
            workers.push(handle);
        }

        if workers.is_empty() {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("no {} interface is up", params.family));
            return Err(TransportError::NoInterface(reason));
        }

        debug!(interfaces = ?interfaces, port = params.local_port, "bpf capture started");
        Ok(Self {
            rx: Mutex::new(rx),
            stop,
            workers,
        })
    }

    fn next_datagram(&self, timeout: Duration) -> TransportResult<Option<Datagram>> {
        let rx = self.rx.lock().map_err(|_| TransportError::Closed)?;
        match rx.recv_timeout(timeout) {
            Ok(datagram) => Ok(Some(datagram)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

impl Drop for BpfCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            // Each worker owns its device; joining guarantees the fd is closed.
            let _ = worker.join();
        }
    }
}
