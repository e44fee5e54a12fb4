//! Coordinator error type.
//!
//! Every lower crate's error converts into [`CoordinatorError`], whose
//! [`code`](CoordinatorError::code) is the stable string callers match on.

use serde_json::Value;
use sso_federation::FederationError;
use sso_protocol_oidc::OidcError;
use sso_protocol_saml::SamlError;
use sso_session::SessionError;
use sso_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors surfaced by the SSO coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Missing or invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Provider not found.
    #[error("provider not found: {0}")]
    ProviderNotFound(Uuid),

    /// Session not found (or unreadable).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Generic not-found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider exists but is disabled.
    #[error("provider is disabled: {0}")]
    ProviderDisabled(Uuid),

    /// Unknown, expired or already consumed state token.
    #[error("invalid or expired state")]
    InvalidState,

    /// The callback arrived for a different provider than the one the
    /// state was issued for.
    #[error("state was issued for provider {expected}, callback is for {actual}")]
    ProviderMismatch {
        /// Provider the state belongs to.
        expected: String,
        /// Provider named by the callback.
        actual: String,
    },

    /// The operation does not apply to this provider type or session.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// OAuth / OIDC failure.
    #[error(transparent)]
    Oidc(#[from] OidcError),

    /// SAML failure.
    #[error(transparent)]
    Saml(#[from] SamlError),

    /// Session store failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Identity bridge failure.
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// Provider store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Provider secret encryption failure.
    #[error(transparent)]
    Crypto(#[from] sso_crypto::CryptoError),

    /// Configuration error raised while constructing the coordinator.
    #[error(transparent)]
    Config(#[from] sso_core::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ProviderNotFound(_) | Self::SessionNotFound(_) | Self::NotFound(_) => {
                "NOT_FOUND"
            }
            Self::ProviderDisabled(_) => "PROVIDER_DISABLED",
            Self::InvalidState => "INVALID_STATE",
            Self::ProviderMismatch { .. } => "PROVIDER_MISMATCH",
            Self::Unsupported(_) => "UNSUPPORTED_OPERATION",
            Self::Oidc(e) => match e {
                OidcError::InvalidRequest(_) | OidcError::NotConfigured(_) => "VALIDATION_ERROR",
                OidcError::Provider { .. } => "PROVIDER_ERROR",
                OidcError::Http { .. } | OidcError::Network(_) => "NETWORK_ERROR",
                OidcError::Timeout => "TIMEOUT",
                OidcError::ResponseTooLarge { .. } => "RESPONSE_TOO_LARGE",
                OidcError::InvalidResponse(_) => "INVALID_RESPONSE",
                OidcError::InvalidToken(_) => "INVALID_TOKEN",
                OidcError::Internal(_) => "INTERNAL_ERROR",
            },
            Self::Saml(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Federation(e) => e.error_code(),
            Self::Storage(e) if e.is_not_found() => "NOT_FOUND",
            Self::Storage(e) if e.is_duplicate() => "ALREADY_EXISTS",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Oidc(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Structured details worth returning to the caller.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::ProviderMismatch { expected, actual } => Some(serde_json::json!({
                "expectedProviderId": expected,
                "actualProviderId": actual,
            })),
            Self::Oidc(OidcError::Provider { error, description }) => Some(serde_json::json!({
                "error": error,
                "errorDescription": description,
            })),
            Self::Oidc(e) if e.is_retryable() => Some(serde_json::json!({ "retryable": true })),
            Self::Saml(SamlError::StatusNotSuccess { code, message }) => Some(serde_json::json!({
                "statusCode": code,
                "statusMessage": message,
            })),
            Self::Federation(FederationError::SubjectAlreadyLinked { existing_did }) => {
                Some(serde_json::json!({ "existingDid": existing_did }))
            }
            Self::Federation(FederationError::MaxLinksReached { did, max }) => {
                Some(serde_json::json!({ "did": did, "max": max }))
            }
            _ => None,
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Crypto(_) | Self::Config(_) | Self::Internal(_)
        )
    }
}
