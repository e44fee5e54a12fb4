//! ID token claim validation.
//!
//! Tokens are decoded without verifying the signature. Every claim check
//! runs and violations are collected, so callers can log the whole list or
//! reject on any entry. Signature verification belongs to an external
//! verifier.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::claims::IdTokenClaims;
use crate::config::OidcClientConfig;
use crate::error::{OidcError, OidcResult};

/// Default tolerance for time-based claims.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 300;

/// Options for [`validate_id_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTokenValidationOptions {
    /// Nonce sent in the authorization request.
    pub nonce: Option<String>,
    /// Tolerance for `exp`, `iat` and `nbf`.
    pub clock_skew_secs: i64,
}

impl Default for IdTokenValidationOptions {
    fn default() -> Self {
        Self {
            nonce: None,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
        }
    }
}

impl IdTokenValidationOptions {
    /// Sets the expected nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// A single failed claim check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdTokenViolation {
    /// `alg` is `none` or outside the allow-list.
    AlgorithmNotAllowed {
        /// Header `alg`.
        algorithm: String,
    },
    /// `iss` differs from the configured issuer.
    IssuerMismatch {
        /// Configured issuer.
        expected: String,
        /// Token `iss`.
        actual: Option<String>,
    },
    /// `aud` does not contain the client id.
    AudienceMismatch,
    /// `azp` is missing or differs from the client id.
    AuthorizedPartyMismatch,
    /// `exp` is absent.
    MissingExpiration,
    /// `exp` is in the past beyond the skew.
    Expired,
    /// `iat` is in the future beyond the skew.
    IssuedInFuture,
    /// `nbf` is in the future beyond the skew.
    NotYetValid,
    /// `nonce` differs from the one sent.
    NonceMismatch,
    /// `sub` is absent or empty.
    MissingSubject,
}

impl std::fmt::Display for IdTokenViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlgorithmNotAllowed { algorithm } => {
                write!(f, "algorithm '{algorithm}' is not allowed")
            }
            Self::IssuerMismatch { expected, actual } => write!(
                f,
                "issuer mismatch: expected '{expected}', got '{}'",
                actual.as_deref().unwrap_or("<missing>")
            ),
            Self::AudienceMismatch => f.write_str("audience does not contain the client id"),
            Self::AuthorizedPartyMismatch => f.write_str("azp does not match the client id"),
            Self::MissingExpiration => f.write_str("exp claim is missing"),
            Self::Expired => f.write_str("token is expired"),
            Self::IssuedInFuture => f.write_str("iat is in the future"),
            Self::NotYetValid => f.write_str("token is not yet valid (nbf)"),
            Self::NonceMismatch => f.write_str("nonce mismatch"),
            Self::MissingSubject => f.write_str("sub claim is missing"),
        }
    }
}

/// Outcome of claim validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTokenValidation {
    /// Decoded claims.
    pub claims: IdTokenClaims,
    /// Whether no violation was found.
    pub valid: bool,
    /// Every violation found.
    pub errors: Vec<IdTokenViolation>,
    /// Header `alg`.
    pub algorithm: String,
    /// Always false; signatures are not checked here.
    pub signature_verified: bool,
}

impl IdTokenValidation {
    /// Returns the violations as display strings.
    #[must_use]
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Decodes the header and claims of a compact JWS without verifying it.
pub fn decode_unverified(id_token: &str) -> OidcResult<(String, IdTokenClaims)> {
    let mut parts = id_token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(OidcError::InvalidToken(
            "ID token must have three segments".to_string(),
        ));
    };

    let header: Header = serde_json::from_slice(&decode_segment(header)?)
        .map_err(|e| OidcError::InvalidToken(format!("header: {e}")))?;
    let claims: IdTokenClaims = serde_json::from_slice(&decode_segment(payload)?)
        .map_err(|e| OidcError::InvalidToken(format!("payload: {e}")))?;

    Ok((header.alg, claims))
}

fn decode_segment(segment: &str) -> OidcResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| OidcError::InvalidToken(format!("segment is not base64url: {e}")))
}

/// Validates the claims of an ID token against the client configuration.
///
/// Returns `Err` only when the token cannot be decoded at all.
pub fn validate_id_token(
    config: &OidcClientConfig,
    id_token: &str,
    options: &IdTokenValidationOptions,
) -> OidcResult<IdTokenValidation> {
    let (algorithm, claims) = decode_unverified(id_token)?;
    let now = Utc::now().timestamp();
    let skew = options.clock_skew_secs.max(0);
    let mut errors = Vec::new();

    let alg_allowed = !algorithm.eq_ignore_ascii_case("none")
        && (config.allowed_algorithms.is_empty()
            || config.allowed_algorithms.iter().any(|a| a == &algorithm));
    if !alg_allowed {
        errors.push(IdTokenViolation::AlgorithmNotAllowed {
            algorithm: algorithm.clone(),
        });
    }

    if let Some(expected) = &config.issuer {
        let matches = claims
            .iss
            .as_deref()
            .is_some_and(|iss| iss.trim_end_matches('/') == expected.trim_end_matches('/'));
        if !matches {
            errors.push(IdTokenViolation::IssuerMismatch {
                expected: expected.clone(),
                actual: claims.iss.clone(),
            });
        }
    }

    match &claims.aud {
        Some(aud) if aud.contains(&config.client_id) => {
            let azp_ok = match claims.azp.as_deref() {
                Some(azp) => azp == config.client_id,
                None => aud.len() <= 1,
            };
            if !azp_ok {
                errors.push(IdTokenViolation::AuthorizedPartyMismatch);
            }
        }
        _ => errors.push(IdTokenViolation::AudienceMismatch),
    }

    match claims.exp {
        None => errors.push(IdTokenViolation::MissingExpiration),
        Some(exp) if now > exp.saturating_add(skew) => errors.push(IdTokenViolation::Expired),
        Some(_) => {}
    }

    let latest = now.saturating_add(skew);
    if claims.iat.is_some_and(|iat| iat > latest) {
        errors.push(IdTokenViolation::IssuedInFuture);
    }
    if claims.nbf.is_some_and(|nbf| nbf > latest) {
        errors.push(IdTokenViolation::NotYetValid);
    }

    if let Some(expected) = &options.nonce {
        if claims.nonce.as_deref() != Some(expected.as_str()) {
            errors.push(IdTokenViolation::NonceMismatch);
        }
    }

    if claims.sub.as_deref().map_or(true, str::is_empty) {
        errors.push(IdTokenViolation::MissingSubject);
    }

    Ok(IdTokenValidation {
        claims,
        valid: errors.is_empty(),
        errors,
        algorithm,
        signature_verified: false,
    })
}
