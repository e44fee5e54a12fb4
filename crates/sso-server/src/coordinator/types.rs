//! Request and response types of the coordinator operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use sso_model::{ProviderType, SessionInfo};
use sso_protocol_oidc::Prompt;

// ============================================================================
// Provider registry
// ============================================================================

/// Input of `add_provider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    /// Protocol.
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Display name.
    pub name: String,
    /// Protocol settings.
    pub config: Map<String, Value>,
    /// Whether logins are allowed. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Opaque caller metadata.
    #[serde(default)]
    pub metadata: Value,
}

const fn default_enabled() -> bool {
    true
}

impl NewProvider {
    /// Creates an enabled provider definition.
    #[must_use]
    pub fn new(provider_type: ProviderType, name: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            provider_type,
            name: name.into(),
            config,
            enabled: true,
            metadata: Value::Null,
        }
    }
}

/// Input of `update_provider`. Absent fields are left unchanged; `config`
/// is shallow-merged into the stored map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderUpdate {
    /// New display name.
    pub name: Option<String>,
    /// Config keys to add or replace.
    pub config: Option<Map<String, Value>>,
    /// New enabled flag.
    pub enabled: Option<bool>,
    /// New metadata.
    pub metadata: Option<Value>,
}

/// Filter of `list_providers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderFilter {
    /// Only providers of this type.
    #[serde(rename = "type")]
    pub provider_type: Option<ProviderType>,
    /// Only enabled providers.
    pub enabled_only: bool,
}

/// Result of `delete_provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDeletion {
    /// Deleted provider.
    pub provider_id: Uuid,
    /// Sessions removed with it.
    pub sessions_removed: usize,
}

// ============================================================================
// Login
// ============================================================================

/// Caller options for `initiate_login`. Stored with the pending state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginOptions {
    /// DID the resulting session belongs to.
    pub user_did: Option<String>,
    /// OAuth scopes overriding the configured default.
    pub scopes: Option<Vec<String>>,
    /// OAuth `login_hint`.
    pub login_hint: Option<String>,
    /// OAuth `prompt`.
    pub prompt: Option<Prompt>,
    /// Extra authorization query parameters.
    pub extra_params: BTreeMap<String, String>,
    /// SAML `ForceAuthn` override.
    pub force_authn: Option<bool>,
    /// SAML `IsPassive` override.
    pub is_passive: Option<bool>,
    /// Where the caller wants to land after login. Opaque to the coordinator.
    pub return_to: Option<String>,
}

/// Result of `initiate_login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInitiation {
    /// Where to send the user.
    pub auth_url: String,
    /// State token (SAML `RelayState`).
    pub state: String,
    /// PKCE verifier, for OAuth providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

/// Parameters of a provider callback.
///
/// OAuth callbacks carry `code` and `state` (or `error`); SAML callbacks
/// carry `SAMLResponse` and `RelayState`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// OAuth state.
    pub state: Option<String>,
    /// OAuth error code.
    pub error: Option<String>,
    /// OAuth error description.
    #[serde(alias = "error_description")]
    pub error_description: Option<String>,
    /// Base64 `SAMLResponse` form value.
    #[serde(alias = "SAMLResponse")]
    pub saml_response: Option<String>,
    /// SAML `RelayState`.
    #[serde(alias = "RelayState")]
    pub relay_state: Option<String>,
    /// Client IP recorded on the session.
    pub client_ip: Option<String>,
    /// Client user agent recorded on the session.
    pub user_agent: Option<String>,
}

impl CallbackParams {
    /// An OAuth authorization-code callback.
    #[must_use]
    pub fn oauth(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }

    /// A SAML HTTP-POST callback.
    #[must_use]
    pub fn saml(saml_response: impl Into<String>, relay_state: impl Into<String>) -> Self {
        Self {
            saml_response: Some(saml_response.into()),
            relay_state: Some(relay_state.into()),
            ..Self::default()
        }
    }

    /// The state token: `state`, else `RelayState`.
    #[must_use]
    pub fn state_token(&self) -> Option<&str> {
        self.state
            .as_deref()
            .or(self.relay_state.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Result of `handle_callback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
    /// The new session, without tokens.
    pub session: SessionInfo,
    /// Claims from userinfo, the ID token or the SAML assertion.
    pub user_info: Value,
    /// The `return_to` given at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

// ============================================================================
// Logout and refresh
// ============================================================================

/// What `logout` ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogoutTarget {
    /// One session.
    Session(String),
    /// Every session of a DID (at the given provider).
    User(String),
}

/// Result of `logout`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResult {
    /// Local sessions deleted.
    pub sessions_removed: usize,
    /// Tokens the provider accepted for revocation.
    pub tokens_revoked: usize,
    /// Revocation calls that failed. These never block local logout.
    pub revocation_failures: usize,
    /// SP-initiated SAML logout redirects, one per SAML session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub saml_logout_urls: Vec<String>,
}

/// Result of `clean_expired_sessions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    /// Sessions removed.
    pub removed: usize,
}
