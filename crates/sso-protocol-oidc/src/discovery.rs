//! `OpenID` Connect Discovery 1.0 client.
//!
//! Fetches `OpenID` Provider Metadata from
//! `{issuer}/.well-known/openid-configuration`.

use serde::{Deserialize, Serialize};

use crate::error::{OidcError, OidcResult};
use crate::http::HttpTransport;

/// Well-known path of the discovery document.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// `OpenID` Provider Metadata.
///
/// Only the fields the relying party uses are typed; unknown fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier.
    pub issuer: String,

    /// URL of the authorization endpoint.
    pub authorization_endpoint: String,

    /// URL of the token endpoint.
    pub token_endpoint: String,

    /// URL of the `UserInfo` endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// URL of the JSON Web Key Set document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// URL of the revocation endpoint (RFC 7009).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    /// URL of the end session endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// List of supported scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,

    /// List of supported signing algorithms for ID tokens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// List of supported PKCE methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Returns whether the provider advertises S256 PKCE.
    ///
    /// Providers that omit the field are assumed to support it.
    #[must_use]
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported.is_empty()
            || self.code_challenge_methods_supported.iter().any(|m| m == "S256")
    }
}

/// Returns the discovery URL for an issuer.
#[must_use]
pub fn discovery_url(issuer: &str) -> String {
    format!("{}{WELL_KNOWN_PATH}", issuer.trim_end_matches('/'))
}

/// Fetches and parses the discovery document of `issuer`.
pub async fn fetch(transport: &HttpTransport, issuer: &str) -> OidcResult<ProviderMetadata> {
    let url = discovery_url(issuer);
    let response = transport.get(&url, None).await?;
    if !response.is_success() {
        return Err(OidcError::Http {
            status: response.status,
            body: response.snippet(),
        });
    }

    let metadata: ProviderMetadata = serde_json::from_slice(&response.body)
        .map_err(|e| OidcError::InvalidResponse(format!("discovery document: {e}")))?;

    if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        tracing::warn!(
            expected = %issuer,
            actual = %metadata.issuer,
            "discovery document issuer does not match"
        );
    }

    Ok(metadata)
}
