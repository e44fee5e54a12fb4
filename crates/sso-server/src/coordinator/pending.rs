//! Pending authorization states.
//!
//! A state token is minted per login and consumed by exactly one callback.
//! Entries older than the TTL are treated as absent and removed by
//! [`PendingStates::sweep`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use sso_model::ProviderType;

use super::types::LoginOptions;

/// What the coordinator remembers between redirect and callback.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// The state token.
    pub state: String,
    /// Provider the login was started for.
    pub provider_id: Uuid,
    /// Its type.
    pub provider_type: ProviderType,
    /// PKCE verifier (OAuth).
    pub code_verifier: Option<String>,
    /// Nonce (OIDC).
    pub nonce: Option<String>,
    /// `AuthnRequest` ID (SAML).
    pub saml_request_id: Option<String>,
    /// When the login started.
    pub created_at: DateTime<Utc>,
    /// Caller options.
    pub options: LoginOptions,
}

impl PendingAuthorization {
    fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now - self.created_at >= ttl
    }
}

/// The pending-state table.
#[derive(Debug)]
pub(crate) struct PendingStates {
    entries: Mutex<HashMap<String, PendingAuthorization>>,
    ttl: Duration,
}

impl PendingStates {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, pending: PendingAuthorization) {
        self.entries.lock().insert(pending.state.clone(), pending);
    }

    /// Removes and returns the entry for `state`. An expired entry is
    /// removed and reported as absent, so each state succeeds at most once.
    pub fn take(&self, state: &str) -> Option<PendingAuthorization> {
        let pending = self.entries.lock().remove(state)?;
        if pending.is_expired_at(Utc::now(), self.ttl) {
            tracing::debug!(state_prefix = prefix(state), "pending state expired");
            return None;
        }
        Some(pending)
    }

    /// Drops entries older than the TTL. Returns how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_expired_at(now, self.ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

/// First characters of a state token, for logs.
pub(crate) fn prefix(state: &str) -> &str {
    state.get(..8).unwrap_or(state)
}
