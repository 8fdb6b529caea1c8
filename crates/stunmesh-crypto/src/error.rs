//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Envelope sealing failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// Envelope could not be opened (bad hex, truncated, wrong keys, tampered)
    #[error("decryption failed: {0}")]
    DecryptionFailed(&'static str),

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key text is not valid base64 or hex
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// Decrypted payload is not valid UTF-8
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}
