//! WireGuard interface keys.
//!
//! WireGuard uses raw Curve25519 keys, transported as base64 text by the `wg`
//! tool and configuration files. The same keys seed the endpoint envelope, so
//! no extra key material has to be distributed between peers.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::KEY_SIZE;
use crate::error::CryptoError;

/// Curve25519 private key (32 bytes).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_SIZE]);

/// Curve25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_SIZE]);

fn decode_key(text: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let text = text.trim();
    let bytes = if text.len() == KEY_SIZE * 2 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        hex::decode(text).map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?
    } else {
        STANDARD
            .decode(text)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?
    };

    <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: bytes.len(),
    })
}

impl PrivateKey {
    /// Import from bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a base64 (WireGuard) or hex encoded key.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        decode_key(text).map(Self)
    }

    /// Derive the public key from this private key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = crypto_box::SecretKey::from(self.0);
        PublicKey(*secret.public_key().as_bytes())
    }

    /// Get bytes as a slice.
    ///
    /// # Security
    ///
    /// The returned bytes contain the raw private key. Handle with care.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl PublicKey {
    /// Import public key from bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a base64 (WireGuard) or hex encoded key.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        decode_key(text).map(Self)
    }

    /// Import from a byte slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        <[u8; KEY_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            })
    }

    /// Get bytes as a slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Base64 text as understood by `wg`.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// First eight hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}
