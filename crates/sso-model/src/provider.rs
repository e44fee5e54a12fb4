//! Identity provider configuration model.
//!
//! A provider is an external OAuth 2.0, OpenID Connect or SAML 2.0 identity
//! provider that local DIDs can authenticate against.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Plain OAuth 2.0 authorization-code flow.
    #[serde(rename = "oauth2")]
    OAuth2,
    /// OpenID Connect.
    Oidc,
    /// SAML 2.0 Web Browser SSO.
    Saml,
}

impl ProviderType {
    /// All supported provider types.
    pub const ALL: [Self; 3] = [Self::OAuth2, Self::Oidc, Self::Saml];

    /// Returns the wire name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth2 => "oauth2",
            Self::Oidc => "oidc",
            Self::Saml => "saml",
        }
    }

    /// Returns the config keys that must be present and non-empty.
    #[must_use]
    pub const fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::OAuth2 => &[
                "clientId",
                "authorizationEndpoint",
                "tokenEndpoint",
                "redirectUri",
            ],
            Self::Oidc => &[
                "clientId",
                "authorizationEndpoint",
                "tokenEndpoint",
                "redirectUri",
                "userinfoEndpoint",
            ],
            Self::Saml => &["entityId", "idpEntityId", "ssoUrl", "certificate", "acsUrl"],
        }
    }

    /// Returns whether this type uses the OAuth 2.0 code flow.
    #[must_use]
    pub const fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuth2 | Self::Oidc)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oauth2" => Ok(Self::OAuth2),
            "oidc" => Ok(Self::Oidc),
            "saml" => Ok(Self::Saml),
            _ => Err(format!("unknown provider type: {s}")),
        }
    }
}

/// Config keys that hold secrets and are encrypted before persistence.
pub const SENSITIVE_FIELDS: &[&str] = &["clientSecret", "privateKey", "spPrivateKey"];

/// A configured identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfiguration {
    /// Unique identifier.
    pub id: Uuid,
    /// Protocol.
    pub provider_type: ProviderType,
    /// Display name.
    pub name: String,
    /// Protocol-specific settings (endpoints, client id, certificate, ...).
    pub config: Map<String, Value>,
    /// Whether logins through this provider are allowed.
    pub enabled: bool,
    /// Opaque caller metadata.
    #[serde(default)]
    pub metadata: Value,
    /// When the provider was created.
    pub created_at: DateTime<Utc>,
    /// When the provider was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfiguration {
    /// Creates a new enabled provider.
    #[must_use]
    pub fn new(provider_type: ProviderType, name: impl Into<String>, config: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            provider_type,
            name: name.into(),
            config,
            enabled: true,
            metadata: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a string config value, treating empty strings as absent.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Lists required config keys that are missing or empty.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        missing_fields(self.provider_type, &self.config)
    }

    /// Shallow-merges `patch` into the config map. Unknown keys pass through.
    pub fn merge_config(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.config.insert(key, value);
        }
        self.updated_at = Utc::now();
    }
}

/// Lists required keys of `provider_type` missing from `config`.
#[must_use]
pub fn missing_fields(provider_type: ProviderType, config: &Map<String, Value>) -> Vec<&'static str> {
    provider_type
        .required_fields()
        .iter()
        .copied()
        .filter(|key| {
            !config
                .get(*key)
                .is_some_and(|v| v.as_str().map_or(!v.is_null(), |s| !s.trim().is_empty()))
        })
        .collect()
}
