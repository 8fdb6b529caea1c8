//! Content-address hashing for store slots.
//!
//! A slot key is the SHA-1 digest of an ordered pair of public keys, rendered
//! as 40 lowercase hex characters. SHA-1 is used for addressing only: the
//! slot contents are authenticated by the envelope, not by the key.

use std::fmt;

use sha1::{Digest, Sha1};

use crate::SLOT_KEY_SIZE;
use crate::keys::PublicKey;

/// SHA-1 slot address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey([u8; SLOT_KEY_SIZE]);

impl SlotKey {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SLOT_KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex form used as the store key.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotKey({})", self.to_hex())
    }
}

/// `SHA1(first || second)`.
#[must_use]
pub fn slot_key(first: &PublicKey, second: &PublicKey) -> SlotKey {
    let mut hasher = Sha1::new();
    hasher.update(first.as_bytes());
    hasher.update(second.as_bytes());
    SlotKey(hasher.finalize().into())
}
