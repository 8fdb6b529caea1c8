//! Classic BPF programs for STUN reply capture.
//!
//! The kernel runs these before a packet is copied to userspace, so only
//! datagrams addressed to the WireGuard port that carry the STUN magic cookie
//! wake the capture. The same instruction layout is used by Linux
//! `SO_ATTACH_FILTER` and BSD `/dev/bpf`.
//!
//! Generated program, IPv4 behind Ethernet:
//!
//! ```text
//! ldh  [12]              ; ethertype
//! jeq  #0x0800           ; else reject
//! ldb  [14]
//! rsh  #4
//! jeq  #4                ; IP version, else reject
//! ldb  [23]
//! jeq  #17               ; UDP, else reject
//! ldx  4*([14]&0xf)      ; IP header length
//! ldh  [x+16]
//! jeq  #port             ; destination port, else reject
//! ld   [x+26]
//! jeq  #0x2112a442       ; magic cookie, else reject
//! ret  #262144
//! ret  #0
//! ```

use crate::AddressFamily;
use crate::udp::{FrameLayout, IPV6_HEADER_LEN};

/// STUN magic cookie, checked at UDP payload offset 4.
pub const STUN_MAGIC_COOKIE: u32 = 0x2112_A442;

/// Snapshot length returned for accepted packets.
pub const ACCEPT_SNAPLEN: u32 = 0x40000;

const ETHERTYPE_IPV4: u32 = 0x0800;
const ETHERTYPE_IPV6: u32 = 0x86dd;
const IPPROTO_UDP: u32 = 17;

pub(crate) const LD_W_ABS: u16 = 0x20;
pub(crate) const LD_H_ABS: u16 = 0x28;
pub(crate) const LD_B_ABS: u16 = 0x30;
pub(crate) const LD_W_IND: u16 = 0x40;
pub(crate) const LD_H_IND: u16 = 0x48;
pub(crate) const LDX_B_MSH: u16 = 0xb1;
pub(crate) const ALU_RSH_K: u16 = 0x74;
pub(crate) const JMP_JEQ_K: u16 = 0x15;
pub(crate) const RET_K: u16 = 0x06;

/// One classic BPF instruction.
///
/// Layout-compatible with Linux `struct sock_filter` and BSD
/// `struct bpf_insn`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Opcode
    pub code: u16,
    /// Jump offset if true
    pub jt: u8,
    /// Jump offset if false
    pub jf: u8,
    /// Generic field
    pub k: u32,
}

impl Instruction {
    const fn stmt(code: u16, k: u32) -> Self {
        Self { code, jt: 0, jf: 0, k }
    }
}

/// Link-layer framing seen by a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// No link header (raw IP sockets)
    None,
    /// BSD loopback / tunnel encapsulation (4-byte address family)
    Null,
    /// Ethernet II
    Ethernet,
}

impl LinkType {
    /// Map a BPF data-link type (`DLT_*`) to a known framing.
    #[must_use]
    pub fn from_dlt(dlt: u32) -> Option<Self> {
        match dlt {
            0 => Some(Self::Null),
            1 => Some(Self::Ethernet),
            12 | 14 => Some(Self::None),
            _ => None,
        }
    }

    /// Length of the link header in bytes.
    #[must_use]
    pub fn header_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Null => 4,
            Self::Ethernet => 14,
        }
    }
}

/// Description of the frames a filter runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StunFilter {
    /// Local port replies are addressed to
    pub port: u16,
    /// Link framing
    pub link: LinkType,
    /// IP header present in the frame; `None` when frames begin at UDP
    pub ip_header: Option<AddressFamily>,
}

enum Step {
    Check { load: u16, k: u32, shift: Option<u32>, value: u32 },
    IndexIpv4Header { offset: u32 },
}

impl Step {
    fn len(&self) -> usize {
        match self {
            Step::Check { shift, .. } => 2 + usize::from(shift.is_some()),
            Step::IndexIpv4Header { .. } => 1,
        }
    }
}

impl StunFilter {
    /// Where the UDP header sits in matched frames.
    #[must_use]
    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            link_header: self.link.header_len(),
            ip_header: self.ip_header,
        }
    }

    fn steps(&self) -> Vec<Step> {
        let link = self.link.header_len() as u32;
        let mut steps = Vec::new();

        let (port_load, cookie_load, udp) = match self.ip_header {
            None => (LD_H_ABS, LD_W_ABS, link),
            Some(family) => {
                let (ethertype, version, proto_offset) = match family {
                    AddressFamily::V4 => (ETHERTYPE_IPV4, 4, 9),
                    AddressFamily::V6 => (ETHERTYPE_IPV6, 6, 6),
                };
                if self.link == LinkType::Ethernet {
                    steps.push(Step::Check { load: LD_H_ABS, k: 12, shift: None, value: ethertype });
                }
                steps.push(Step::Check { load: LD_B_ABS, k: link, shift: Some(4), value: version });
                steps.push(Step::Check {
                    load: LD_B_ABS,
                    k: link + proto_offset,
                    shift: None,
                    value: IPPROTO_UDP,
                });
                match family {
                    AddressFamily::V4 => {
                        steps.push(Step::IndexIpv4Header { offset: link });
                        (LD_H_IND, LD_W_IND, link)
                    }
                    AddressFamily::V6 => (LD_H_ABS, LD_W_ABS, link + IPV6_HEADER_LEN as u32),
                }
            }
        };

        steps.push(Step::Check { load: port_load, k: udp + 2, shift: None, value: u32::from(self.port) });
        steps.push(Step::Check { load: cookie_load, k: udp + 12, shift: None, value: STUN_MAGIC_COOKIE });
        steps
    }

    /// Compile the filter into BPF instructions.
    #[must_use]
    pub fn program(&self) -> Vec<Instruction> {
        let steps = self.steps();
        let total: usize = steps.iter().map(Step::len).sum::<usize>() + 2;
        let reject = total - 1;

        let mut program = Vec::with_capacity(total);
        for step in steps {
            match step {
                Step::Check { load, k, shift, value } => {
                    program.push(Instruction::stmt(load, k));
                    if let Some(bits) = shift {
                        program.push(Instruction::stmt(ALU_RSH_K, bits));
                    }
                    let jf = (reject - program.len() - 1) as u8;
                    program.push(Instruction { code: JMP_JEQ_K, jt: 0, jf, k: value });
                }
                Step::IndexIpv4Header { offset } => {
                    program.push(Instruction::stmt(LDX_B_MSH, offset));
                }
            }
        }
        program.push(Instruction::stmt(RET_K, ACCEPT_SNAPLEN));
        program.push(Instruction::stmt(RET_K, 0));
        program
    }
}

/// Placement of fields in the `struct bpf_hdr` that prefixes every record
/// returned by a BSD `/dev/bpf` read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Offset of `bh_caplen` (u32)
    pub caplen_offset: usize,
    /// Offset of `bh_hdrlen` (u16)
    pub hdrlen_offset: usize,
    /// `BPF_WORDALIGN` boundary between records
    pub alignment: usize,
}

impl RecordLayout {
    /// macOS: 32-bit timestamps, 4-byte alignment.
    pub const MACOS: Self = Self {
        caplen_offset: 8,
        hdrlen_offset: 16,
        alignment: 4,
    };

    /// FreeBSD on 64-bit targets: `struct timeval`, `long` alignment.
    pub const FREEBSD: Self = Self {
        caplen_offset: 16,
        hdrlen_offset: 24,
        alignment: 8,
    };
}

/// Iterator over captured frames in a BSD BPF read buffer.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    buf: &'a [u8],
    offset: usize,
    layout: RecordLayout,
}

impl<'a> Records<'a> {
    /// Walk the records in `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8], layout: RecordLayout) -> Self {
        Self { buf, offset: 0, layout }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.buf.get(self.offset..)?;
        let caplen = record.get(self.layout.caplen_offset..self.layout.caplen_offset + 4)?;
        let hdrlen = record.get(self.layout.hdrlen_offset..self.layout.hdrlen_offset + 2)?;
        let caplen = u32::from_ne_bytes(caplen.try_into().ok()?) as usize;
        let hdrlen = usize::from(u16::from_ne_bytes(hdrlen.try_into().ok()?));

        let frame = record.get(hdrlen..hdrlen + caplen)?;
        let align = self.layout.alignment;
        // Zero-length records still advance.
        self.offset += ((hdrlen + caplen + align - 1) / align * align).max(align);
        Some(frame)
    }
}
