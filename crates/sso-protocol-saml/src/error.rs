//! SAML error types.
//!
//! Covers decoding, parsing, condition and signature validation, and
//! provider configuration errors.

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML service-provider errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Provider configuration is missing or malformed.
    #[error("invalid SAML configuration: {0}")]
    InvalidConfig(String),

    /// Invalid SAML request input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid SAML response format or content.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// The IdP returned a non-success top-level status.
    #[error("SAML status {code}{}", status_suffix(.message))]
    StatusNotSuccess {
        /// Top-level status code URI.
        code: String,
        /// `StatusMessage`, if any.
        message: Option<String>,
    },

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Assertion conditions not met under a rejecting policy.
    #[error("assertion conditions not met: {0}")]
    ConditionsNotMet(String),

    /// Signature verification failed.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// Signature verification is required but could not be performed.
    #[error("signature verification required: {0}")]
    SignatureRequired(String),

    /// Certificate could not be parsed or is not currently valid.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn status_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl SamlError {
    /// Returns a stable, machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) | Self::InvalidRequest(_) => "VALIDATION_ERROR",
            Self::InvalidResponse(_)
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_) => "INVALID_RESPONSE",
            Self::StatusNotSuccess { .. } => "SAML_STATUS",
            Self::ConditionsNotMet(_) => "CONDITIONS_NOT_MET",
            Self::SignatureInvalid(_) | Self::SignatureRequired(_) => "SIGNATURE_INVALID",
            Self::InvalidCertificate(_) => "INVALID_CERTIFICATE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Deflate(err.to_string())
    }
}
