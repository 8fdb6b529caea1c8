//! Fuzz target for STUN message decoding
//!
//! Replies come from the network, so decoding must reject anything without
//! panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stunmesh_discovery::StunMessage;

fuzz_target!(|data: &[u8]| {
    let _ = StunMessage::peek_transaction_id(data);

    if let Ok(message) = StunMessage::decode(data) {
        let _ = message.xor_mapped_address();
        let _ = message.mapped_address();
        let _ = message.error_code();

        let encoded = message.encode();
        if let Ok(again) = StunMessage::decode(&encoded) {
            assert_eq!(again.transaction_id, message.transaction_id);
        }
    }
});
