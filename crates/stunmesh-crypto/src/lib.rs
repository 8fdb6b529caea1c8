//! # stunmesh Crypto
//!
//! Cryptographic primitives for stunmesh.
//!
//! This crate provides:
//! - WireGuard key types (Curve25519, base64 wire form)
//! - Endpoint envelopes sealed with a NaCl box
//! - Content-address hashing for store slots
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Key Agreement | X25519 | WireGuard interface keys are reused |
//! | Envelope | XSalsa20-Poly1305 (NaCl box) | 24-byte random nonce |
//! | Slot Address | SHA-1 | addressing only, not a security boundary |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod hash;
pub mod keys;

pub use envelope::{decrypt, encrypt};
pub use error::CryptoError;
pub use hash::{SlotKey, slot_key};
pub use keys::{PrivateKey, PublicKey};

/// Curve25519 key size (public and private)
pub const KEY_SIZE: usize = 32;

/// NaCl box nonce size
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size
pub const TAG_SIZE: usize = 16;

/// SHA-1 digest size
pub const SLOT_KEY_SIZE: usize = 20;
