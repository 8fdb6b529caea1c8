//! Fuzz target for envelope opening
//!
//! Store contents are attacker-controlled; opening must fail cleanly.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stunmesh_crypto::{PrivateKey, PublicKey, decrypt, encrypt};

#[derive(Debug, Arbitrary)]
struct EnvelopeInput {
    local: [u8; 32],
    remote: [u8; 32],
    data: String,
}

fuzz_target!(|input: EnvelopeInput| {
    let local = PrivateKey::from_bytes(input.local);
    let remote = PublicKey::from_bytes(input.remote);

    let _ = decrypt(&input.data, &remote, &local);

    if let Ok(sealed) = encrypt(&input.data, &remote, &local) {
        let _ = decrypt(&sealed, &remote, &local);
    }
});
