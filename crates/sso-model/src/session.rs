//! SSO session model.
//!
//! A session is created after a successful provider callback. Its tokens are
//! held in a single encrypted blob; everything else is plain metadata.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Usable.
    #[default]
    Active,
    /// A token refresh is in flight.
    Refreshing,
    /// Past expiry or a refresh failed.
    Expired,
    /// Explicitly revoked.
    Revoked,
}

impl SessionState {
    /// Returns the wire name of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Refreshing => "refreshing",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens returned by a provider, normalized across protocols.
///
/// This is the plaintext form of [`Session::encrypted_tokens`].
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    /// OAuth access token (empty for SAML sessions).
    #[serde(default)]
    pub access_token: String,
    /// Refresh token, if the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OIDC ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Token type, usually `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Granted scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Lifetime in seconds as reported at issue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenBundle {
    /// Creates a bundle holding only an access token.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            ..Self::default()
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    /// Sets the lifetime.
    #[must_use]
    pub const fn with_expires_in(mut self, expires_in: u64) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Returns whether a non-empty refresh token is present.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// A persisted SSO session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID.
    pub id: String,
    /// Owning provider.
    pub provider_id: String,
    /// Local DID, when the caller supplied one.
    pub user_did: Option<String>,
    /// Subject at the provider (sub, NameID or email).
    pub external_user_id: String,
    /// Encrypted [`TokenBundle`] JSON.
    pub encrypted_tokens: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// SAML `SessionIndex`.
    pub saml_session_index: Option<String>,
    /// SAML `NameID`.
    pub saml_name_id: Option<String>,
    /// Client IP at login.
    pub client_ip: Option<String>,
    /// Client user agent at login.
    pub user_agent: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Last read time.
    pub last_activity_at: DateTime<Utc>,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Returns whether the session is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns whether the session is past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns whether the session counts toward the per-user cap.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active | SessionState::Refreshing) && !self.is_expired()
    }

    /// Updates the last activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Returns the token-free view of this session.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo::from_session(self, Utc::now())
    }
}

/// Session metadata without tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session ID.
    pub id: String,
    /// Owning provider.
    pub provider_id: String,
    /// Local DID.
    pub user_did: Option<String>,
    /// Subject at the provider.
    pub external_user_id: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last read time.
    pub last_activity_at: DateTime<Utc>,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry, zero once expired.
    pub remaining_seconds: i64,
    /// Whether the session is past expiry.
    pub is_expired: bool,
}

impl SessionInfo {
    /// Builds the view as of `now`.
    #[must_use]
    pub fn from_session(session: &Session, now: DateTime<Utc>) -> Self {
        let remaining = (session.expires_at - now).num_seconds().max(0);
        Self {
            id: session.id.clone(),
            provider_id: session.provider_id.clone(),
            user_did: session.user_did.clone(),
            external_user_id: session.external_user_id.clone(),
            state: session.state,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            expires_at: session.expires_at,
            remaining_seconds: remaining,
            is_expired: session.is_expired_at(now),
        }
    }
}

/// Aggregate session counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCount {
    /// All stored sessions.
    pub total: usize,
    /// Sessions that are not expired.
    pub active: usize,
    /// Sessions past expiry or marked expired.
    pub expired: usize,
    /// Total per provider id.
    pub by_provider: HashMap<String, usize>,
}
