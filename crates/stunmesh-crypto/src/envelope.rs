//! Endpoint envelopes.
//!
//! An envelope is `hex(nonce || box)` where `box` is the NaCl
//! `crypto_box` of the payload keyed by (local private key, peer public key).
//! Both sides derive the same box key, so the peer opens the envelope with
//! its own private key and our public key.
//!
//! ```text
//! +------------------+------------------+---------------------------+
//! |  nonce (24 B)    |  Poly1305 (16 B) |  XSalsa20 ciphertext      |
//! +------------------+------------------+---------------------------+
//! ```

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{Nonce, SalsaBox};

use crate::NONCE_SIZE;
use crate::error::CryptoError;
use crate::keys::{PrivateKey, PublicKey};

fn salsa_box(peer_public: &PublicKey, local_private: &PrivateKey) -> SalsaBox {
    let public = crypto_box::PublicKey::from(*peer_public.as_bytes());
    let secret = crypto_box::SecretKey::from(*local_private.as_bytes());
    SalsaBox::new(&public, &secret)
}

/// Seal `content` for `peer_public` and return the hex envelope.
///
/// A fresh random nonce is drawn on every call, so sealing the same content
/// twice yields different envelopes.
pub fn encrypt(
    content: &str,
    peer_public: &PublicKey,
    local_private: &PrivateKey,
) -> Result<String, CryptoError> {
    let nonce = SalsaBox::generate_nonce(&mut OsRng);
    let sealed = salsa_box(peer_public, local_private)
        .encrypt(&nonce, content.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&sealed);
    Ok(hex::encode(out))
}

/// Open a hex envelope produced by the peer.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] if the input is not hex, is
/// shorter than a nonce, or fails authentication.
pub fn decrypt(
    data: &str,
    peer_public: &PublicKey,
    local_private: &PrivateKey,
) -> Result<String, CryptoError> {
    let raw = hex::decode(data.trim()).map_err(|_| CryptoError::DecryptionFailed("invalid hex"))?;
    if raw.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed("envelope shorter than nonce"));
    }

    let (nonce, sealed) = raw.split_at(NONCE_SIZE);
    let opened = salsa_box(peer_public, local_private)
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed("authentication failure"))?;

    String::from_utf8(opened).map_err(|_| CryptoError::InvalidUtf8)
}
