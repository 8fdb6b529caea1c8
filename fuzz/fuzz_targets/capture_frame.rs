//! Fuzz target for captured frame parsing
//!
//! Walks BSD BPF read buffers and splits each record as a capture would.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stunmesh_transport::AddressFamily;
use stunmesh_transport::bpf::{RecordLayout, Records};
use stunmesh_transport::udp::{FrameLayout, split_frame};

const LAYOUTS: [FrameLayout; 3] = [
    FrameLayout::UDP_ONLY,
    FrameLayout::ip(AddressFamily::V4),
    FrameLayout::ip(AddressFamily::V6),
];

fuzz_target!(|data: &[u8]| {
    for layout in LAYOUTS {
        let _ = split_frame(data, layout);
    }

    for records in [RecordLayout::MACOS, RecordLayout::FREEBSD] {
        for frame in Records::new(data, records) {
            let ethernet = FrameLayout {
                link_header: 14,
                ip_header: Some(AddressFamily::V4),
            };
            let _ = split_frame(frame, ethernet);
        }
    }
});
