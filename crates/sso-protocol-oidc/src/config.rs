//! Typed client configuration parsed from a provider's config map.

use serde_json::{Map, Value};
use sso_model::{ProviderConfiguration, ProviderType};

use crate::error::{OidcError, OidcResult};

/// Default scopes requested from OIDC providers.
pub const DEFAULT_OIDC_SCOPES: &[&str] = &["openid", "profile", "email"];

/// Settings for one OAuth 2.0 / OIDC provider.
#[derive(Clone, PartialEq, Eq)]
pub struct OidcClientConfig {
    /// Whether the provider speaks OIDC (enables nonce and ID tokens).
    pub oidc: bool,
    /// OAuth client identifier.
    pub client_id: String,
    /// Client secret for confidential clients.
    pub client_secret: Option<String>,
    /// Authorization endpoint.
    pub authorization_endpoint: String,
    /// Token endpoint.
    pub token_endpoint: String,
    /// `UserInfo` endpoint.
    pub userinfo_endpoint: Option<String>,
    /// Revocation endpoint (RFC 7009).
    pub revocation_endpoint: Option<String>,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Expected `iss` of ID tokens.
    pub issuer: Option<String>,
    /// Default scopes.
    pub scopes: Vec<String>,
    /// Allowed ID token `alg` values. Empty means any except `none`.
    pub allowed_algorithms: Vec<String>,
}

impl OidcClientConfig {
    /// Parses the config map of an OAuth2 or OIDC provider.
    ///
    /// Secrets must already be decrypted.
    pub fn from_provider(provider: &ProviderConfiguration) -> OidcResult<Self> {
        let oidc = match provider.provider_type {
            ProviderType::Oidc => true,
            ProviderType::OAuth2 => false,
            ProviderType::Saml => {
                return Err(OidcError::InvalidRequest(
                    "SAML providers have no OAuth configuration".to_string(),
                ))
            }
        };
        Self::from_map(&provider.config, oidc)
    }

    /// Parses a raw config map.
    pub fn from_map(config: &Map<String, Value>, oidc: bool) -> OidcResult<Self> {
        let scopes = match config.get("scopes").or_else(|| config.get("scope")) {
            Some(value) => string_list(value),
            None if oidc => DEFAULT_OIDC_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            None => Vec::new(),
        };

        Ok(Self {
            oidc,
            client_id: required(config, "clientId")?,
            client_secret: optional(config, "clientSecret"),
            authorization_endpoint: required(config, "authorizationEndpoint")?,
            token_endpoint: required(config, "tokenEndpoint")?,
            userinfo_endpoint: optional(config, "userinfoEndpoint"),
            revocation_endpoint: optional(config, "revocationEndpoint"),
            redirect_uri: required(config, "redirectUri")?,
            issuer: optional(config, "issuer"),
            scopes,
            allowed_algorithms: config
                .get("allowedAlgorithms")
                .map(string_list)
                .unwrap_or_default(),
        })
    }

    /// Returns the default scope parameter value.
    #[must_use]
    pub fn default_scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Returns the discovery document URL, when an issuer is configured.
    #[must_use]
    pub fn discovery_url(&self) -> Option<String> {
        self.issuer.as_deref().map(crate::discovery::discovery_url)
    }
}

impl std::fmt::Debug for OidcClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClientConfig")
            .field("oidc", &self.oidc)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("userinfo_endpoint", &self.userinfo_endpoint)
            .field("revocation_endpoint", &self.revocation_endpoint)
            .field("redirect_uri", &self.redirect_uri)
            .field("issuer", &self.issuer)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

fn optional(config: &Map<String, Value>, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(config: &Map<String, Value>, key: &'static str) -> OidcResult<String> {
    optional(config, key).ok_or(OidcError::NotConfigured(key))
}

/// Accepts either a JSON array of strings or a space/comma separated string.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
