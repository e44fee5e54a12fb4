//! OIDC client error types.
//!
//! Errors returned by the relying-party side of OAuth 2.0 / `OpenID` Connect:
//! provider error responses (RFC 6749 Section 5.2), transport failures and
//! malformed responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OIDC client errors.
#[derive(Debug, Error)]
pub enum OidcError {
    /// Invalid request parameters.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// A required provider setting is missing.
    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    /// The provider returned an OAuth error response.
    #[error("provider error: {error}{}", description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Provider {
        /// OAuth error code (e.g. `invalid_grant`).
        error: String,
        /// `error_description`, if present.
        description: Option<String>,
    },

    /// Non-success HTTP status without an OAuth error body.
    #[error("unexpected HTTP status {status}")]
    Http {
        /// Status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// Connection or protocol failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The response exceeded the size cap.
    #[error("response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Configured cap in bytes.
        limit: usize,
    },

    /// The response could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The token could not be decoded.
    #[error("invalid_token: {0}")]
    InvalidToken(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OidcError {
    /// Creates a provider error from an OAuth error response.
    #[must_use]
    pub fn provider(response: ErrorResponse) -> Self {
        Self::Provider {
            error: response.error,
            description: response.error_description,
        }
    }

    /// Returns a short machine-readable code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotConfigured(_) => "not_configured",
            Self::Provider { .. } => "provider_error",
            Self::Http { .. } | Self::Network(_) => "network_error",
            Self::Timeout => "timeout",
            Self::ResponseTooLarge { .. } => "response_too_large",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidToken(_) => "invalid_token",
            Self::Internal(_) => "server_error",
        }
    }

    /// Returns whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for OidcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// OAuth 2.0 error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// URI with more information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

/// Result type for OIDC operations.
pub type OidcResult<T> = Result<T, OidcError>;
