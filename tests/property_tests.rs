//! Property-based tests for stunmesh
//!
//! Uses proptest to verify invariants across large input spaces.

use proptest::prelude::*;

// ============================================================================
// Slot Addressing Properties
// ============================================================================

mod slot_properties {
    use super::*;
    use stunmesh_core::PeerId;
    use stunmesh_crypto::PublicKey;

    proptest! {
        /// Each side's publish slot is the other side's lookup slot
        #[test]
        fn peer_id_symmetry(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            prop_assume!(a != b);
            let (a, b) = (PublicKey::from_bytes(a), PublicKey::from_bytes(b));
            let ab = PeerId::new(a, b);
            let ba = PeerId::new(b, a);

            prop_assert_ne!(ab.local_key(), ab.remote_key());
            prop_assert_eq!(ab.local_key(), ba.remote_key());
            prop_assert_eq!(ab.remote_key(), ba.local_key());
        }
    }
}

// ============================================================================
// Envelope Properties
// ============================================================================

mod envelope_properties {
    use super::*;
    use stunmesh_crypto::{PrivateKey, decrypt, encrypt};

    proptest! {
        /// Whatever one side seals, the other side opens
        #[test]
        fn envelope_roundtrip(
            content in ".{0,256}",
            local in any::<[u8; 32]>(),
            remote in any::<[u8; 32]>(),
        ) {
            let local = PrivateKey::from_bytes(local);
            let remote = PrivateKey::from_bytes(remote);

            let sealed = encrypt(&content, &remote.public_key(), &local).unwrap();
            let opened = decrypt(&sealed, &local.public_key(), &remote).unwrap();
            prop_assert_eq!(opened, content);
        }

        /// Arbitrary text never opens and never panics
        #[test]
        fn decrypt_garbage(data in "[0-9a-f]{0,200}") {
            let key = PrivateKey::from_bytes([5; 32]);
            prop_assert!(decrypt(&data, &key.public_key(), &key).is_err());
        }
    }
}

// ============================================================================
// Endpoint Payload Properties
// ============================================================================

mod endpoint_properties {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
    use stunmesh_core::{EndpointData, PeerProtocol};

    proptest! {
        /// Published payloads parse back and select per protocol
        #[test]
        fn payload_select(
            v4 in any::<[u8; 4]>(),
            v6 in any::<[u8; 16]>(),
            port in 1u16..,
            with_v6 in any::<bool>(),
        ) {
            let ipv4 = SocketAddr::from((Ipv4Addr::from(v4), port));
            let ipv6 = SocketAddr::from((Ipv6Addr::from(v6), port));
            let mut data = EndpointData::default();
            data.set(ipv4);
            if with_v6 {
                data.set(ipv6);
            }

            let parsed = EndpointData::parse(&data.to_json().unwrap()).unwrap();
            prop_assert_eq!(parsed.select(PeerProtocol::Ipv4), Some(ipv4));
            prop_assert_eq!(parsed.select(PeerProtocol::PreferIpv4), Some(ipv4));
            let expected_v6 = if with_v6 { Some(ipv6) } else { None };
            prop_assert_eq!(parsed.select(PeerProtocol::Ipv6), expected_v6);
            prop_assert_eq!(parsed.select(PeerProtocol::PreferIpv6), expected_v6.or(Some(ipv4)));
        }
    }
}

// ============================================================================
// STUN Codec Properties
// ============================================================================

mod stun_properties {
    use super::*;
    use stunmesh_discovery::StunMessage;

    proptest! {
        /// Decoding never panics on arbitrary input
        #[test]
        fn decode_arbitrary(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = StunMessage::decode(&bytes);
        }

        /// A binding request survives encode/decode with its transaction ID
        #[test]
        fn binding_request_transaction_id(_seed in any::<u8>()) {
            let request = StunMessage::binding_request();
            let encoded = request.encode();
            let decoded = StunMessage::decode(&encoded).unwrap();
            prop_assert_eq!(decoded.transaction_id, request.transaction_id);
        }
    }
}
