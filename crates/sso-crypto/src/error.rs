//! Cryptographic error types.

use thiserror::Error;

/// Errors raised by cipher and key-derivation operations.
///
/// Messages never contain plaintext or key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material is malformed or the wrong length.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivation,

    /// The system random source failed.
    #[error("random generation failed")]
    Random,

    /// Sealing the plaintext failed.
    #[error("encryption failed")]
    Encryption,

    /// Ciphertext is malformed, tampered with, or sealed under another key.
    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
