//! Fuzz target for decrypted endpoint payload parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use stunmesh_core::{EndpointData, PeerProtocol};

fuzz_target!(|data: &str| {
    if let Ok(payload) = EndpointData::parse(data) {
        for protocol in [
            PeerProtocol::Ipv4,
            PeerProtocol::Ipv6,
            PeerProtocol::PreferIpv4,
            PeerProtocol::PreferIpv6,
        ] {
            let _ = payload.select(protocol);
        }
    }
});
