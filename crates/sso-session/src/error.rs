//! Session error types.

use sso_crypto::CryptoError;
use sso_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session not found, or unreadable under this machine's key.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Session expired.
    #[error("Session expired: {0}")]
    Expired(String),

    /// Session is invalid for the requested operation.
    #[error("Session invalid: {0}")]
    Invalid(String),

    /// Encrypting or decrypting the token bundle failed.
    #[error("Session crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Storage error.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    /// Token bundle (de)serialization failed.
    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Checks if this is an expiration error.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }

    /// Returns a stable, machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Expired(_) => "SESSION_EXPIRED",
            Self::Invalid(_) => "VALIDATION_ERROR",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Storage(_) | Self::Serialization(_) => "STORAGE_ERROR",
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
