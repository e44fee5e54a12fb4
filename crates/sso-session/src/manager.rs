//! Session manager.
//!
//! Owns the lifecycle of SSO sessions: creation under the per-user cap,
//! token encryption at rest, lazy expiry on read and the refresh timers.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use sso_core::{Event, EventSink, EventType, SsoConfig};
use sso_crypto::random::generate_session_id;
use sso_crypto::TokenCipher;
use sso_model::{Session, SessionCount, SessionInfo, SessionState, TokenBundle};
use sso_storage::SessionStore;

use crate::error::{SessionError, SessionResult};
use crate::scheduler::{RefreshHandler, RefreshScheduler};

/// Session limits and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Maximum active sessions per (user DID, provider).
    pub max_sessions_per_user: usize,
    /// Lifetime used when the provider does not report `expires_in`.
    pub default_ttl: Duration,
    /// How long before expiry a refresh is attempted.
    pub refresh_threshold: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions_per_user: 10,
            default_ttl: Duration::from_secs(3600),
            refresh_threshold: Duration::from_secs(300),
        }
    }
}

impl SessionSettings {
    /// Builds settings from the shared runtime configuration.
    #[must_use]
    pub fn from_sso_config(config: &SsoConfig) -> Self {
        Self {
            max_sessions_per_user: config.max_sessions_per_user.max(1),
            default_ttl: Duration::from_secs(config.default_session_ttl_secs),
            refresh_threshold: config.refresh_threshold(),
        }
    }
}

/// Non-token data recorded with a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionContext {
    /// Subject at the provider.
    pub external_user_id: String,
    /// SAML `SessionIndex`.
    pub saml_session_index: Option<String>,
    /// SAML `NameID`.
    pub saml_name_id: Option<String>,
    /// Client IP.
    pub client_ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Caps the token-derived expiry, e.g. a SAML `SessionNotOnOrAfter`.
    pub not_after: Option<DateTime<Utc>>,
}

/// Result of [`SessionManager::create_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    /// New session id.
    pub session_id: String,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
    /// Token type of the stored bundle.
    pub token_type: String,
}

/// A session together with its decrypted tokens.
#[derive(Debug, Clone)]
pub struct DecryptedSession {
    /// Session metadata.
    pub session: Session,
    /// Plaintext tokens.
    pub tokens: TokenBundle,
}

type CreationKey = (String, String);
type LockTable<K> = Arc<DashMap<K, Arc<Mutex<()>>>>;

/// Exclusive right to refresh one session. Dropping it releases the lock.
pub struct RefreshGuard {
    locks: LockTable<String>,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl std::fmt::Debug for RefreshGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGuard")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Manages encrypted SSO sessions.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cipher: TokenCipher,
    settings: SessionSettings,
    events: Arc<dyn EventSink>,
    creation_locks: DashMap<CreationKey, Arc<Mutex<()>>>,
    refresh_locks: LockTable<String>,
    scheduler: RefreshScheduler,
    refresh_handler: OnceLock<Weak<dyn RefreshHandler>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("settings", &self.settings)
            .field("cipher", &self.cipher)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager whose token blobs are bound to this machine.
    pub fn new(
        store: Arc<dyn SessionStore>,
        settings: SessionSettings,
        events: Arc<dyn EventSink>,
    ) -> SessionResult<Self> {
        Ok(Self::with_cipher(
            store,
            settings,
            events,
            TokenCipher::machine_bound()?,
        ))
    }

    /// Creates a manager with an explicit token cipher.
    #[must_use]
    pub fn with_cipher(
        store: Arc<dyn SessionStore>,
        settings: SessionSettings,
        events: Arc<dyn EventSink>,
        cipher: TokenCipher,
    ) -> Self {
        Self {
            store,
            cipher,
            scheduler: RefreshScheduler::new(settings.refresh_threshold),
            settings,
            events,
            creation_locks: DashMap::new(),
            refresh_locks: Arc::new(DashMap::new()),
            refresh_handler: OnceLock::new(),
        }
    }

    /// Registers the handler invoked by refresh timers.
    ///
    /// Only the first registration takes effect. The handler is held weakly
    /// so it may own this manager.
    pub fn set_refresh_handler(&self, handler: Weak<dyn RefreshHandler>) {
        if self.refresh_handler.set(handler).is_err() {
            warn!("refresh handler already registered");
        }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Refresh timers.
    #[must_use]
    pub const fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Creates a session, evicting the oldest active sessions of the same
    /// (DID, provider) pair while the cap is reached.
    pub async fn create_session(
        &self,
        user_did: Option<&str>,
        provider_id: &str,
        tokens: &TokenBundle,
        context: SessionContext,
    ) -> SessionResult<CreatedSession> {
        let lock_key = user_did.map(|did| (did.to_string(), provider_id.to_string()));
        let guard = match (user_did, &lock_key) {
            (Some(did), Some(key)) => {
                let lock = self
                    .creation_locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                let guard = lock.lock_owned().await;
                self.evict_over_cap(did, provider_id).await?;
                Some(guard)
            }
            _ => None,
        };

        let now = Utc::now();
        let ttl = tokens
            .expires_in
            .map_or(self.settings.default_ttl, Duration::from_secs);
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let expires_at = context.not_after.map_or(expires_at, |bound| bound.min(expires_at));

        let id = generate_session_id();
        let session = Session {
            encrypted_tokens: self.seal(&id, tokens)?,
            id,
            provider_id: provider_id.to_string(),
            user_did: user_did.map(str::to_string),
            external_user_id: context.external_user_id,
            state: SessionState::Active,
            saml_session_index: context.saml_session_index,
            saml_name_id: context.saml_name_id,
            client_ip: context.client_ip,
            user_agent: context.user_agent,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
            expires_at,
        };
        self.store.insert(&session).await?;

        drop(guard);
        if let Some(key) = &lock_key {
            self.creation_locks
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }

        info!(
            session_id = %session.id,
            provider_id,
            did = user_did,
            expires_at = %expires_at,
            "session created"
        );
        self.arm_refresh(&session, tokens);

        Ok(CreatedSession {
            session_id: session.id,
            expires_at,
            token_type: tokens.token_type.clone(),
        })
    }

    async fn evict_over_cap(&self, did: &str, provider_id: &str) -> SessionResult<()> {
        let mut active: Vec<Session> = self
            .store
            .list_by_user_and_provider(did, provider_id)
            .await?
            .into_iter()
            .filter(Session::is_active)
            .collect();
        active.sort_by_key(|s| s.created_at);

        let mut oldest = active.into_iter();
        let mut remaining = oldest.len();
        while remaining >= self.settings.max_sessions_per_user {
            let Some(victim) = oldest.next() else { break };
            self.store.delete(&victim.id).await?;
            self.scheduler.cancel(&victim.id);
            remaining -= 1;
            debug!(session_id = %victim.id, provider_id, did, "evicted oldest session");
            self.events.emit(
                Event::builder(EventType::SessionEvicted)
                    .provider(provider_id)
                    .did(did)
                    .session(victim.id)
                    .build(),
            );
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns a session with its tokens.
    ///
    /// An expired session is deleted and reported as absent, as is one whose
    /// tokens cannot be decrypted. Otherwise the activity timestamp is
    /// refreshed.
    pub async fn get_session(&self, session_id: &str) -> SessionResult<Option<DecryptedSession>> {
        let Some(mut session) = self.store.get(session_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.is_expired_at(now) {
            self.expire(&session).await?;
            return Ok(None);
        }

        let tokens = match self.open(&session) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(session_id, error = %e, "session tokens unreadable, treating as missing");
                return Ok(None);
            }
        };

        self.store.touch(session_id, now).await?;
        session.last_activity_at = now;
        Ok(Some(DecryptedSession { session, tokens }))
    }

    /// Returns the non-expired sessions of a user, skipping unreadable ones.
    pub async fn get_sessions_by_user(&self, user_did: &str) -> SessionResult<Vec<DecryptedSession>> {
        let now = Utc::now();
        let sessions = self.store.list_by_user(user_did).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| !s.is_expired_at(now) && s.state != SessionState::Expired)
            .filter_map(|session| match self.open(&session) {
                Ok(tokens) => Some(DecryptedSession { session, tokens }),
                Err(e) => {
                    debug!(session_id = %session.id, error = %e, "skipping unreadable session");
                    None
                }
            })
            .collect())
    }

    /// Returns whether a session exists, is active and not past expiry.
    pub async fn is_session_valid(&self, session_id: &str) -> SessionResult<bool> {
        Ok(self
            .store
            .get(session_id)
            .await?
            .is_some_and(|s| s.is_active()))
    }

    /// Returns token-free metadata for a session.
    pub async fn get_session_info(&self, session_id: &str) -> SessionResult<Option<SessionInfo>> {
        Ok(self
            .store
            .get(session_id)
            .await?
            .map(|s| SessionInfo::from_session(&s, Utc::now())))
    }

    /// Counts sessions by state and provider.
    pub async fn get_session_count(&self) -> SessionResult<SessionCount> {
        let now = Utc::now();
        let mut count = SessionCount::default();
        for session in self.store.list_all().await? {
            count.total += 1;
            if session.is_expired_at(now) || session.state == SessionState::Expired {
                count.expired += 1;
            } else {
                count.active += 1;
            }
            *count.by_provider.entry(session.provider_id).or_default() += 1;
        }
        Ok(count)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Replaces the tokens of a session, resets its expiry and marks it
    /// active. Re-arms the refresh timer.
    pub async fn update_tokens(&self, session_id: &str, tokens: &TokenBundle) -> SessionResult<Session> {
        let mut session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let now = Utc::now();
        let ttl = tokens
            .expires_in
            .map_or(self.settings.default_ttl, Duration::from_secs);
        session.encrypted_tokens = self.seal(session_id, tokens)?;
        session.expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        session.state = SessionState::Active;
        session.updated_at = now;
        self.store.update(&session).await?;

        debug!(session_id, expires_at = %session.expires_at, "session tokens updated");
        self.arm_refresh(&session, tokens);
        Ok(session)
    }

    /// Sets the lifecycle state of a session. Returns whether it existed.
    pub async fn set_state(&self, session_id: &str, state: SessionState) -> SessionResult<bool> {
        Ok(self.store.set_state(session_id, state).await?)
    }

    /// Marks a session expired and cancels its timer.
    pub async fn mark_expired(&self, session_id: &str) -> SessionResult<bool> {
        self.scheduler.cancel(session_id);
        self.set_state(session_id, SessionState::Expired).await
    }

    /// Waits for the refresh lock of a session.
    ///
    /// Refreshes of one session must hold this guard so that a rotated
    /// refresh token is never sent twice.
    pub async fn lock_refresh(&self, session_id: &str) -> RefreshGuard {
        let lock = self
            .refresh_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        RefreshGuard {
            locks: Arc::clone(&self.refresh_locks),
            session_id: session_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Marks a session expired after its provider refused `refresh_token`,
    /// cancels its timer and emits `RefreshTokenError`.
    ///
    /// A session that is gone, or whose stored refresh token is no longer
    /// `refresh_token`, is left alone. Returns whether the session was
    /// expired.
    pub async fn expire_after_rejected_refresh(
        &self,
        session_id: &str,
        refresh_token: &str,
        reason: &str,
    ) -> SessionResult<bool> {
        let Some(session) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        let stored = self.open(&session).ok().and_then(|t| t.refresh_token);
        if stored.as_deref() != Some(refresh_token) {
            debug!(session_id, "refresh token changed since the attempt, session kept");
            return Ok(false);
        }

        self.scheduler.cancel(session_id);
        self.store.set_state(session_id, SessionState::Expired).await?;
        warn!(
            session_id,
            provider_id = %session.provider_id,
            reason,
            "refresh refused by provider, session expired"
        );
        self.events.emit(
            Event::builder(EventType::RefreshTokenError)
                .provider(session.provider_id.clone())
                .maybe_did(session.user_did.as_deref())
                .session(session_id)
                .failure(reason)
                .build(),
        );
        Ok(true)
    }

    /// Deletes a session. Returns whether it existed.
    pub async fn invalidate_session(&self, session_id: &str) -> SessionResult<bool> {
        self.scheduler.cancel(session_id);
        let removed = self.store.delete(session_id).await?;
        if removed {
            debug!(session_id, "session invalidated");
        }
        Ok(removed)
    }

    /// Deletes every session of a user. Returns how many were deleted.
    pub async fn invalidate_all_sessions(&self, user_did: &str) -> SessionResult<usize> {
        let ids = self.store.delete_by_user(user_did).await?;
        for id in &ids {
            self.scheduler.cancel(id);
        }
        debug!(did = user_did, count = ids.len(), "user sessions invalidated");
        Ok(ids.len())
    }

    /// Deletes every session of a provider. Returns how many were deleted.
    pub async fn invalidate_provider_sessions(&self, provider_id: &str) -> SessionResult<usize> {
        let ids = self.store.delete_by_provider(provider_id).await?;
        for id in &ids {
            self.scheduler.cancel(id);
        }
        debug!(provider_id, count = ids.len(), "provider sessions invalidated");
        Ok(ids.len())
    }

    /// Deletes expired sessions. Returns how many were deleted.
    pub async fn clean_expired_sessions(&self) -> SessionResult<usize> {
        let ids = self.store.delete_expired(Utc::now()).await?;
        for id in &ids {
            self.scheduler.cancel(id);
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "expired sessions removed");
        }
        Ok(ids.len())
    }

    /// Cancels every refresh timer.
    pub fn shutdown(&self) -> usize {
        self.scheduler.cancel_all()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn seal(&self, session_id: &str, tokens: &TokenBundle) -> SessionResult<String> {
        let json = serde_json::to_string(tokens)?;
        Ok(self.cipher.encrypt_bound(&json, session_id)?)
    }

    fn open(&self, session: &Session) -> SessionResult<TokenBundle> {
        let json = self
            .cipher
            .decrypt_bound(&session.encrypted_tokens, &session.id)?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn expire(&self, session: &Session) -> SessionResult<()> {
        self.scheduler.cancel(&session.id);
        self.store.delete(&session.id).await?;
        debug!(session_id = %session.id, "expired session removed on read");
        self.events.emit(
            Event::builder(EventType::SessionExpired)
                .provider(session.provider_id.clone())
                .maybe_did(session.user_did.as_deref())
                .session(session.id.clone())
                .build(),
        );
        Ok(())
    }

    fn arm_refresh(&self, session: &Session, tokens: &TokenBundle) {
        if !tokens.has_refresh_token() || tokens.expires_in.is_none() {
            return;
        }
        let Some(handler) = self.refresh_handler.get().cloned() else {
            return;
        };

        let delay = self.scheduler.delay_until_refresh(session.expires_at, Utc::now());
        let store = Arc::clone(&self.store);
        let session_id = session.id.clone();
        let provider_id = session.provider_id.clone();

        self.scheduler.schedule(&session.id, delay, async move {
            let Some(handler) = handler.upgrade() else {
                return;
            };
            match store.get(&session_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!(session_id, "session gone before scheduled refresh");
                    return;
                }
                Err(e) => {
                    warn!(session_id, error = %e, "session lookup failed before scheduled refresh");
                    return;
                }
            }

            if let Err(e) = handler.refresh_session(&session_id).await {
                warn!(session_id, provider_id, error = %e, "scheduled token refresh failed");
            }
        });
    }
}
