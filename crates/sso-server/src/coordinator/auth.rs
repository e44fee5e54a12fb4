//! Login, callback, logout and refresh.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sso_core::{Event, EventType};
use sso_crypto::random::generate_state;
use sso_model::{SessionInfo, SessionState};
use sso_protocol_oidc::TokenTypeHint;
use sso_protocol_saml::constants::logout_reasons;
use sso_protocol_saml::LogoutRequestOptions;
use sso_session::{DecryptedSession, SessionContext};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::result::{respond, OperationResult};

use super::flow::{OAuthFlow, ProviderEngine};
use super::pending::{prefix, PendingAuthorization};
use super::types::{
    CallbackParams, CallbackResult, LoginInitiation, LoginOptions, LogoutResult, LogoutTarget,
};
use super::SsoCoordinator;

impl SsoCoordinator {
    // ========================================================================
    // Login
    // ========================================================================

    /// Starts a login: mints a state token, records the pending state and
    /// returns the provider redirect.
    pub async fn initiate_login(
        &self,
        provider_id: Uuid,
        options: LoginOptions,
    ) -> OperationResult<LoginInitiation> {
        respond("initiate_login", self.start_login(provider_id, options).await)
    }

    async fn start_login(&self, provider_id: Uuid, options: LoginOptions) -> CoordinatorResult<LoginInitiation> {
        if options.user_did.as_deref().is_some_and(|did| did.trim().is_empty()) {
            return Err(CoordinatorError::validation("user_did must not be empty"));
        }

        let cached = self.registry.load(provider_id).await?;
        if !cached.provider.enabled {
            return Err(CoordinatorError::ProviderDisabled(provider_id));
        }

        let state = generate_state();
        let redirect = cached.engine.flow().build_login_redirect(&state, &options)?;

        self.emit(
            Event::builder(EventType::LoginInitiated)
                .provider(provider_id.to_string())
                .maybe_did(options.user_did.as_deref())
                .build(),
        );
        self.pending.insert(PendingAuthorization {
            state: state.clone(),
            provider_id,
            provider_type: cached.provider.provider_type,
            code_verifier: redirect.code_verifier.clone(),
            nonce: redirect.nonce,
            saml_request_id: redirect.saml_request_id,
            created_at: Utc::now(),
            options,
        });
        info!(
            provider_id = %provider_id,
            provider_type = %cached.provider.provider_type,
            state_prefix = prefix(&state),
            "login initiated"
        );

        Ok(LoginInitiation {
            auth_url: redirect.auth_url,
            state,
            code_verifier: redirect.code_verifier,
        })
    }

    /// Completes a login from the provider callback and creates a session.
    ///
    /// The state is consumed before anything else, so a replay fails with
    /// `INVALID_STATE` even if the first attempt failed later on.
    pub async fn handle_callback(
        &self,
        provider_id: Uuid,
        callback: CallbackParams,
    ) -> OperationResult<CallbackResult> {
        let result = self.complete_login(provider_id, &callback).await;
        if let Err(e) = &result {
            warn!(provider_id = %provider_id, code = e.code(), error = %e, "login failed");
            self.emit(
                Event::builder(EventType::LoginError)
                    .provider(provider_id.to_string())
                    .failure(e.code())
                    .build(),
            );
        }
        respond("handle_callback", result)
    }

    async fn complete_login(&self, provider_id: Uuid, callback: &CallbackParams) -> CoordinatorResult<CallbackResult> {
        let state = callback.state_token().ok_or(CoordinatorError::InvalidState)?;
        let pending = self.pending.take(state).ok_or_else(|| {
            debug!(state_prefix = prefix(state), "unknown or replayed state");
            CoordinatorError::InvalidState
        })?;
        if pending.provider_id != provider_id {
            return Err(CoordinatorError::ProviderMismatch {
                expected: pending.provider_id.to_string(),
                actual: provider_id.to_string(),
            });
        }

        let cached = self.registry.load(provider_id).await?;
        let outcome = cached.engine.flow().handle_callback(&pending, callback).await?;

        let user_did = pending.options.user_did.as_deref();
        let created = self
            .sessions
            .create_session(
                user_did,
                &provider_id.to_string(),
                &outcome.tokens,
                SessionContext {
                    external_user_id: outcome.external_user_id,
                    saml_session_index: outcome.saml_session_index,
                    saml_name_id: outcome.saml_name_id,
                    client_ip: callback.client_ip.clone(),
                    user_agent: callback.user_agent.clone(),
                    not_after: outcome.not_after,
                },
            )
            .await?;
        let session = self
            .sessions
            .get_session_info(&created.session_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound(created.session_id.clone()))?;

        let mut event = Event::builder(EventType::Login)
            .provider(provider_id.to_string())
            .maybe_did(user_did)
            .session(created.session_id.clone());
        if let Some(ip) = &callback.client_ip {
            event = event.ip_address(ip.clone());
        }
        self.emit(event.build());
        info!(
            provider_id = %provider_id,
            session_id = %created.session_id,
            did = user_did,
            "login completed"
        );

        Ok(CallbackResult {
            session,
            user_info: outcome.user_info,
            return_to: pending.options.return_to,
        })
    }

    // ========================================================================
    // Logout
    // ========================================================================

    /// Ends one session or every session of a DID at a provider.
    ///
    /// Provider tokens are revoked best-effort; the local sessions are
    /// deleted regardless.
    pub async fn logout(&self, provider_id: Uuid, target: LogoutTarget) -> OperationResult<LogoutResult> {
        respond("logout", self.end_sessions(provider_id, &target).await)
    }

    async fn end_sessions(&self, provider_id: Uuid, target: &LogoutTarget) -> CoordinatorResult<LogoutResult> {
        let provider_key = provider_id.to_string();
        let sessions: Vec<DecryptedSession> = match target {
            LogoutTarget::Session(session_id) => match self.sessions.get_session(session_id).await? {
                Some(found) if found.session.provider_id != provider_key => {
                    return Err(CoordinatorError::ProviderMismatch {
                        expected: found.session.provider_id,
                        actual: provider_key,
                    });
                }
                Some(found) => vec![found],
                None => {
                    // Unreadable sessions are still removed.
                    if self.sessions.invalidate_session(session_id).await? {
                        return Ok(LogoutResult {
                            sessions_removed: 1,
                            ..LogoutResult::default()
                        });
                    }
                    return Err(CoordinatorError::SessionNotFound(session_id.clone()));
                }
            },
            LogoutTarget::User(did) => self
                .sessions
                .get_sessions_by_user(did)
                .await?
                .into_iter()
                .filter(|s| s.session.provider_id == provider_key)
                .collect(),
        };

        let engine = match self.registry.load(provider_id).await {
            Ok(cached) => Some(cached.engine.clone()),
            Err(e) => {
                warn!(provider_id = %provider_id, error = %e, "provider unavailable, skipping remote logout");
                None
            }
        };

        let mut result = LogoutResult::default();
        for current in &sessions {
            match &engine {
                Some(ProviderEngine::OAuth(flow)) => self.revoke_tokens(flow, current, &mut result).await,
                Some(ProviderEngine::Saml(flow)) => {
                    if let Some(name_id) = &current.session.saml_name_id {
                        let options = LogoutRequestOptions {
                            reason: Some(logout_reasons::USER.to_string()),
                            ..LogoutRequestOptions::default()
                        };
                        match flow.engine().build_logout_request(
                            name_id,
                            current.session.saml_session_index.as_deref(),
                            &options,
                        ) {
                            Ok(request) => result.saml_logout_urls.push(request.redirect_url),
                            Err(e) => warn!(session_id = %current.session.id, error = %e, "could not build SAML LogoutRequest"),
                        }
                    }
                }
                None => {}
            }

            if self.sessions.invalidate_session(&current.session.id).await? {
                result.sessions_removed += 1;
            }
            self.emit(
                Event::builder(EventType::Logout)
                    .provider(provider_key.clone())
                    .maybe_did(current.session.user_did.as_deref())
                    .session(current.session.id.clone())
                    .build(),
            );
        }

        info!(
            provider_id = %provider_id,
            removed = result.sessions_removed,
            revoked = result.tokens_revoked,
            failures = result.revocation_failures,
            "logout completed"
        );
        Ok(result)
    }

    /// Revokes the refresh token, then the access token.
    async fn revoke_tokens(&self, flow: &OAuthFlow, current: &DecryptedSession, result: &mut LogoutResult) {
        let tokens = &current.tokens;
        let candidates = [
            (tokens.refresh_token.as_deref(), TokenTypeHint::RefreshToken),
            (Some(tokens.access_token.as_str()), TokenTypeHint::AccessToken),
        ];

        for (token, hint) in candidates {
            let Some(token) = token.filter(|t| !t.is_empty()) else {
                continue;
            };
            match flow.client().revoke_token(token, Some(hint)).await {
                Ok(outcome) if outcome.revoked => {
                    result.tokens_revoked += 1;
                    self.emit(
                        Event::builder(EventType::RevokeGrant)
                            .provider(current.session.provider_id.clone())
                            .session(current.session.id.clone())
                            .detail("token_type_hint", hint.as_str())
                            .build(),
                    );
                }
                Ok(_) => {
                    debug!(session_id = %current.session.id, "no revocation endpoint configured");
                    return;
                }
                Err(e) => {
                    result.revocation_failures += 1;
                    warn!(
                        session_id = %current.session.id,
                        token_type_hint = hint.as_str(),
                        error = %e,
                        "token revocation failed"
                    );
                    self.emit(
                        Event::builder(EventType::RevokeGrant)
                            .provider(current.session.provider_id.clone())
                            .session(current.session.id.clone())
                            .detail("token_type_hint", hint.as_str())
                            .failure(e.to_string())
                            .build(),
                    );
                }
            }
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Refreshes the provider tokens of a session.
    ///
    /// SAML sessions and sessions without a refresh token are rejected. If
    /// the provider refuses the refresh, the session is marked expired.
    pub async fn refresh_token(&self, session_id: &str) -> OperationResult<SessionInfo> {
        respond("refresh_token", self.refresh_session_tokens(session_id).await)
    }

    /// Refresh path shared by [`Self::refresh_token`] and the refresh timers.
    ///
    /// Runs under the session's refresh lock. A caller that waited while
    /// another refresh rotated the tokens gets the rotated session without a
    /// second provider call.
    pub(crate) async fn refresh_session_tokens(&self, session_id: &str) -> CoordinatorResult<SessionInfo> {
        let seen = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound(session_id.to_string()))?;

        let _guard = self.sessions.lock_refresh(session_id).await;
        let current = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound(session_id.to_string()))?;
        if current.session.encrypted_tokens != seen.session.encrypted_tokens {
            debug!(session_id, "tokens refreshed while waiting, skipping provider call");
            return Ok(SessionInfo::from_session(&current.session, Utc::now()));
        }

        let cached = self.registry.load_str(&current.session.provider_id).await?;
        let flow = cached
            .engine
            .oauth()
            .ok_or_else(|| CoordinatorError::Unsupported("SAML sessions cannot be refreshed".to_string()))?;
        let refresh_token = current
            .tokens
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoordinatorError::Unsupported("session has no refresh token".to_string()))?;

        self.sessions.set_state(session_id, SessionState::Refreshing).await?;
        let mut tokens = match flow.client().refresh_access_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                let error = CoordinatorError::from(e);
                if let Err(mark) = self
                    .sessions
                    .expire_after_rejected_refresh(session_id, &refresh_token, error.code())
                    .await
                {
                    warn!(session_id, error = %mark, "could not mark session expired");
                }
                return Err(error);
            }
        };
        // Providers may omit tokens they did not rotate.
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }
        if tokens.id_token.is_none() {
            tokens.id_token.clone_from(&current.tokens.id_token);
        }

        let session = self.sessions.update_tokens(session_id, &tokens).await?;
        self.emit(
            Event::builder(EventType::RefreshToken)
                .provider(session.provider_id.clone())
                .maybe_did(session.user_did.as_deref())
                .session(session_id)
                .build(),
        );
        debug!(session_id, expires_at = %session.expires_at, "session tokens refreshed");
        Ok(SessionInfo::from_session(&session, Utc::now()))
    }
}
