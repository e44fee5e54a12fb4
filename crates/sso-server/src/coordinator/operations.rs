//! Provider, identity, session and protocol operations.

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use sso_model::{
    IdentityAttributes, IdentityMapping, MappingStats, ProviderConfiguration, SessionCount,
    SessionInfo,
};
use sso_protocol_oidc::{IdTokenValidation, IdTokenValidationOptions};
use sso_protocol_saml::{MetadataOptions, ParsedResponse};
use sso_session::DecryptedSession;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::result::{respond, OperationResult};

use super::connection::{self, ConnectionTestResult};
use super::flow::{OAuthFlow, SamlFlow};
use super::registry::CachedProvider;
use super::types::{CleanupResult, NewProvider, ProviderDeletion, ProviderFilter, ProviderUpdate};
use super::SsoCoordinator;

impl SsoCoordinator {
    // ========================================================================
    // Providers
    // ========================================================================

    /// Lists providers. Secrets are redacted.
    pub async fn list_providers(&self, filter: ProviderFilter) -> OperationResult<Vec<ProviderConfiguration>> {
        respond("list_providers", self.registry.list(&filter).await)
    }

    /// Returns one provider. Secrets are redacted.
    pub async fn get_provider(&self, provider_id: Uuid) -> OperationResult<ProviderConfiguration> {
        respond("get_provider", self.registry.get(provider_id).await)
    }

    /// Validates, encrypts and stores a new provider. Returns its id.
    pub async fn add_provider(&self, provider: NewProvider) -> OperationResult<Uuid> {
        respond("add_provider", self.registry.add(provider).await)
    }

    /// Merges `update` into a stored provider.
    pub async fn update_provider(
        &self,
        provider_id: Uuid,
        update: ProviderUpdate,
    ) -> OperationResult<ProviderConfiguration> {
        respond("update_provider", self.registry.update(provider_id, update).await)
    }

    /// Deletes a provider together with its sessions.
    pub async fn delete_provider(&self, provider_id: Uuid) -> OperationResult<ProviderDeletion> {
        respond("delete_provider", self.remove_provider(provider_id).await)
    }

    async fn remove_provider(&self, provider_id: Uuid) -> CoordinatorResult<ProviderDeletion> {
        self.registry.delete(provider_id).await?;
        let sessions_removed = self
            .sessions
            .invalidate_provider_sessions(&provider_id.to_string())
            .await?;
        info!(provider_id = %provider_id, sessions_removed, "provider sessions removed");
        Ok(ProviderDeletion {
            provider_id,
            sessions_removed,
        })
    }

    /// Probes the provider's endpoints (and SAML certificate).
    ///
    /// Unreachable endpoints are reported in the result, not as an error.
    pub async fn test_connection(&self, provider_id: Uuid) -> OperationResult<ConnectionTestResult> {
        let result = match self.registry.load(provider_id).await {
            Ok(cached) => Ok(connection::test_provider(
                &cached,
                self.registry.transport(),
                self.config.connection_test_timeout(),
            )
            .await),
            Err(e) => Err(e),
        };
        respond("test_connection", result)
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Links a DID to a subject at a provider.
    pub async fn link_identity(
        &self,
        did: &str,
        provider_id: Uuid,
        sso_subject: &str,
        attributes: IdentityAttributes,
    ) -> OperationResult<IdentityMapping> {
        let result: CoordinatorResult<IdentityMapping> = async {
            self.registry.get(provider_id).await?;
            Ok(self
                .bridge
                .link_identity(did, &provider_id.to_string(), sso_subject, attributes)
                .await?)
        }
        .await;
        respond("link_identity", result)
    }

    /// Revokes the active link between a DID and a provider.
    pub async fn unlink_identity(&self, did: &str, provider_id: Uuid) -> OperationResult<IdentityMapping> {
        let result = self.bridge.unlink_identity(did, &provider_id.to_string()).await;
        respond("unlink_identity", result.map_err(Into::into))
    }

    /// Lists a DID's links, oldest first.
    pub async fn get_linked_identities(
        &self,
        did: &str,
        include_revoked: bool,
    ) -> OperationResult<Vec<IdentityMapping>> {
        let result = self.bridge.get_linked_identities(did, include_revoked).await;
        respond("get_linked_identities", result.map_err(Into::into))
    }

    /// Moves a pending link to verified.
    pub async fn verify_link(&self, mapping_id: Uuid) -> OperationResult<IdentityMapping> {
        respond("verify_link", self.bridge.verify_link(mapping_id).await.map_err(Into::into))
    }

    /// Suspends a link.
    pub async fn suspend_link(&self, mapping_id: Uuid) -> OperationResult<IdentityMapping> {
        respond("suspend_link", self.bridge.suspend_link(mapping_id).await.map_err(Into::into))
    }

    /// Resolves the DID linked to a provider subject, if any.
    pub async fn find_did_by_subject(&self, provider_id: Uuid, sso_subject: &str) -> OperationResult<Option<String>> {
        let result = self
            .bridge
            .find_did_by_sso_subject(&provider_id.to_string(), sso_subject)
            .await;
        respond("find_did_by_subject", result.map_err(Into::into))
    }

    /// Mapping counts by status and provider.
    pub async fn get_mapping_stats(&self) -> OperationResult<MappingStats> {
        respond("get_mapping_stats", self.bridge.get_mapping_stats().await.map_err(Into::into))
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Sessions of a DID, without tokens.
    pub async fn get_sessions(&self, did: &str) -> OperationResult<Vec<SessionInfo>> {
        let result: CoordinatorResult<Vec<SessionInfo>> = async {
            if did.trim().is_empty() {
                return Err(CoordinatorError::validation("did must not be empty"));
            }
            let now = Utc::now();
            Ok(self
                .sessions
                .get_sessions_by_user(did)
                .await?
                .iter()
                .map(|s| SessionInfo::from_session(&s.session, now))
                .collect())
        }
        .await;
        respond("get_sessions", result)
    }

    /// Deletes a session. Returns whether one existed.
    pub async fn invalidate_session(&self, session_id: &str) -> OperationResult<bool> {
        respond(
            "invalidate_session",
            self.sessions.invalidate_session(session_id).await.map_err(Into::into),
        )
    }

    /// Token-free view of a session.
    pub async fn get_session_info(&self, session_id: &str) -> OperationResult<SessionInfo> {
        let result: CoordinatorResult<SessionInfo> = async {
            self.sessions
                .get_session_info(session_id)
                .await?
                .ok_or_else(|| CoordinatorError::SessionNotFound(session_id.to_string()))
        }
        .await;
        respond("get_session_info", result)
    }

    /// Session totals.
    pub async fn get_session_count(&self) -> OperationResult<SessionCount> {
        respond("get_session_count", self.sessions.get_session_count().await.map_err(Into::into))
    }

    /// Removes expired sessions.
    pub async fn clean_expired_sessions(&self) -> OperationResult<CleanupResult> {
        let result = self
            .sessions
            .clean_expired_sessions()
            .await
            .map(|removed| CleanupResult { removed });
        respond("clean_expired_sessions", result.map_err(Into::into))
    }

    // ========================================================================
    // SAML
    // ========================================================================

    /// SP metadata XML for a SAML provider.
    pub async fn get_saml_metadata(&self, provider_id: Uuid) -> OperationResult<String> {
        let result: CoordinatorResult<String> = async {
            let cached = self.registry.load(provider_id).await?;
            let flow = saml_flow(&cached)?;
            Ok(flow.engine().generate_metadata(&MetadataOptions::default())?)
        }
        .await;
        respond("get_saml_metadata", result)
    }

    /// Parses and validates a base64 `SAMLResponse` without creating a
    /// session.
    pub async fn parse_assertion(&self, provider_id: Uuid, saml_response: &str) -> OperationResult<ParsedResponse> {
        let result: CoordinatorResult<ParsedResponse> = async {
            let cached = self.registry.load(provider_id).await?;
            let flow = saml_flow(&cached)?;
            Ok(flow.engine().parse_assertion(saml_response)?)
        }
        .await;
        respond("parse_assertion", result)
    }

    // ========================================================================
    // OIDC
    // ========================================================================

    /// Fetches user info with the session's access token.
    pub async fn get_userinfo(&self, session_id: &str) -> OperationResult<Value> {
        let result: CoordinatorResult<Value> = async {
            let (current, cached) = self.oauth_session(session_id).await?;
            let flow = oauth_flow(&cached)?;
            Ok(flow.client().get_user_info(&current.tokens.access_token).await?)
        }
        .await;
        respond("get_userinfo", result)
    }

    /// Re-validates the session's ID token claims.
    pub async fn validate_id_token(&self, session_id: &str) -> OperationResult<IdTokenValidation> {
        let result: CoordinatorResult<IdTokenValidation> = async {
            let (current, cached) = self.oauth_session(session_id).await?;
            let flow = oauth_flow(&cached)?;
            let id_token = current
                .tokens
                .id_token
                .as_deref()
                .ok_or_else(|| CoordinatorError::Unsupported("session has no ID token".to_string()))?;
            // The login nonce is not kept past the callback.
            Ok(flow
                .client()
                .validate_id_token(id_token, &IdTokenValidationOptions::default())?)
        }
        .await;
        respond("validate_id_token", result)
    }

    async fn oauth_session(
        &self,
        session_id: &str,
    ) -> CoordinatorResult<(DecryptedSession, std::sync::Arc<CachedProvider>)> {
        let current = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound(session_id.to_string()))?;
        let cached = self.registry.load_str(&current.session.provider_id).await?;
        Ok((current, cached))
    }
}

fn saml_flow(cached: &CachedProvider) -> CoordinatorResult<&SamlFlow> {
    cached.engine.saml().ok_or_else(|| {
        CoordinatorError::Unsupported(format!("{} is not a SAML provider", cached.provider.provider_type))
    })
}

fn oauth_flow(cached: &CachedProvider) -> CoordinatorResult<&OAuthFlow> {
    cached.engine.oauth().ok_or_else(|| {
        CoordinatorError::Unsupported(format!("{} is not an OAuth provider", cached.provider.provider_type))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use sso_core::SsoConfig;
    use sso_crypto::TokenCipher;
    use sso_model::ProviderType;

    use super::*;
    use crate::coordinator::types::{CallbackParams, LoginOptions};
    use crate::coordinator::REDACTED;

    fn coordinator() -> Arc<SsoCoordinator> {
        SsoCoordinator::builder(SsoConfig::for_testing())
            .session_cipher(TokenCipher::from_secret("ops-test-secret").unwrap())
            .build()
            .unwrap()
    }

    fn oidc_provider() -> NewProvider {
        NewProvider::new(
            ProviderType::Oidc,
            "Corp IdP",
            json!({
                "clientId": "app",
                "clientSecret": "s3cret",
                "issuer": "https://idp.example.com",
                "authorizationEndpoint": "https://idp.example.com/authorize",
                "tokenEndpoint": "https://idp.example.com/token",
                "userinfoEndpoint": "https://idp.example.com/userinfo",
                "redirectUri": "https://app.example.com/callback"
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn provider_crud_round_trip() {
        let sso = coordinator();
        let id = sso.add_provider(oidc_provider()).await.into_result().unwrap();

        let provider = sso.get_provider(id).await.into_result().unwrap();
        assert_eq!(provider.config_str("clientSecret"), Some(REDACTED));

        let listed = sso
            .list_providers(ProviderFilter {
                provider_type: Some(ProviderType::Saml),
                enabled_only: false,
            })
            .await
            .into_result()
            .unwrap();
        assert!(listed.is_empty());

        let updated = sso
            .update_provider(
                id,
                ProviderUpdate {
                    enabled: Some(false),
                    ..ProviderUpdate::default()
                },
            )
            .await
            .into_result()
            .unwrap();
        assert!(!updated.enabled);

        let deleted = sso.delete_provider(id).await.into_result().unwrap();
        assert_eq!(deleted.sessions_removed, 0);
        assert_eq!(sso.get_provider(id).await.error_code(), Some("NOT_FOUND"));
    }

    #[tokio::test]
    async fn login_builds_pkce_redirect_and_records_state() {
        let sso = coordinator();
        let id = sso.add_provider(oidc_provider()).await.into_result().unwrap();

        let login = sso
            .initiate_login(id, LoginOptions::default())
            .await
            .into_result()
            .unwrap();
        assert!(login.auth_url.starts_with("https://idp.example.com/authorize?"));
        assert!(login.auth_url.contains("code_challenge_method=S256"));
        assert!(login.auth_url.contains(&format!("state={}", login.state)));
        assert!(login.code_verifier.is_some());
        assert_eq!(sso.pending_logins(), 1);

        sso.shutdown();
        assert_eq!(sso.pending_logins(), 0);
    }

    #[tokio::test]
    async fn disabled_provider_rejects_login() {
        let sso = coordinator();
        let mut input = oidc_provider();
        input.enabled = false;
        let id = sso.add_provider(input).await.into_result().unwrap();

        let result = sso.initiate_login(id, LoginOptions::default()).await;
        assert_eq!(result.error_code(), Some("PROVIDER_DISABLED"));
        assert_eq!(sso.pending_logins(), 0);
    }

    #[tokio::test]
    async fn callback_with_unknown_state_is_rejected() {
        let sso = coordinator();
        let id = sso.add_provider(oidc_provider()).await.into_result().unwrap();

        let callback = CallbackParams::oauth("code", "not-a-real-state");
        let result = sso.handle_callback(id, callback).await;
        assert_eq!(result.error_code(), Some("INVALID_STATE"));
    }

    #[tokio::test]
    async fn callback_for_other_provider_is_rejected_and_state_consumed() {
        let sso = coordinator();
        let first = sso.add_provider(oidc_provider()).await.into_result().unwrap();
        let second = sso.add_provider(oidc_provider()).await.into_result().unwrap();

        let login = sso
            .initiate_login(first, LoginOptions::default())
            .await
            .into_result()
            .unwrap();
        let result = sso
            .handle_callback(second, CallbackParams::oauth("code", &login.state))
            .await;
        assert_eq!(result.error_code(), Some("PROVIDER_MISMATCH"));

        let replay = sso
            .handle_callback(first, CallbackParams::oauth("code", &login.state))
            .await;
        assert_eq!(replay.error_code(), Some("INVALID_STATE"));
    }

    #[tokio::test]
    async fn saml_operations_reject_oauth_providers() {
        let sso = coordinator();
        let id = sso.add_provider(oidc_provider()).await.into_result().unwrap();

        let metadata = sso.get_saml_metadata(id).await;
        assert_eq!(metadata.error_code(), Some("UNSUPPORTED_OPERATION"));
        let parsed = sso.parse_assertion(id, "PHNhbWxwOlJlc3BvbnNlLz4=").await;
        assert_eq!(parsed.error_code(), Some("UNSUPPORTED_OPERATION"));
    }

    #[tokio::test]
    async fn unknown_sessions_are_not_found() {
        let sso = coordinator();
        assert_eq!(sso.get_session_info("missing").await.error_code(), Some("NOT_FOUND"));
        assert_eq!(sso.get_userinfo("missing").await.error_code(), Some("NOT_FOUND"));
        assert_eq!(sso.refresh_token("missing").await.error_code(), Some("NOT_FOUND"));
        assert!(!sso.invalidate_session("missing").await.into_result().unwrap());
        assert_eq!(sso.get_session_count().await.into_result().unwrap().total, 0);
    }

    #[tokio::test]
    async fn linking_requires_a_known_provider() {
        let sso = coordinator();
        let result = sso
            .link_identity("did:example:alice", Uuid::new_v4(), "sub-1", IdentityAttributes::default())
            .await;
        assert_eq!(result.error_code(), Some("NOT_FOUND"));

        let id = sso.add_provider(oidc_provider()).await.into_result().unwrap();
        let mapping = sso
            .link_identity("did:example:alice", id, "sub-1", IdentityAttributes::default())
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            sso.find_did_by_subject(id, "sub-1").await.into_result().unwrap().as_deref(),
            Some("did:example:alice")
        );
        sso.verify_link(mapping.id).await.into_result().unwrap();
        let stats = sso.get_mapping_stats().await.into_result().unwrap();
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn empty_did_is_a_validation_error() {
        let sso = coordinator();
        assert_eq!(sso.get_sessions(" ").await.error_code(), Some("VALIDATION_ERROR"));
    }
}
