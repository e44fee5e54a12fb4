//! Per-protocol login flows.
//!
//! Each [`ProviderType`] variant gets exactly one [`ProviderFlow`]
//! implementation. The coordinator picks it by matching on the type tag,
//! never on the shape of the config map.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use sso_crypto::random::generate_nonce;
use sso_crypto::PkcePair;
use sso_model::{ProviderConfiguration, ProviderType, TokenBundle};
use sso_protocol_oidc::{
    AuthorizationOptions, HttpTransport, IdTokenValidationOptions, OidcClient, OidcClientConfig,
    OidcError,
};
use sso_protocol_saml::{
    AuthnRequestOptions, SamlConfig, SamlEngine, SamlError, SignatureVerifier, ValidationSettings,
};

use crate::error::{CoordinatorError, CoordinatorResult};

use super::pending::PendingAuthorization;
use super::types::{CallbackParams, LoginOptions};

/// Redirect target produced when a login starts.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoginRedirect {
    pub auth_url: String,
    pub code_verifier: Option<String>,
    pub nonce: Option<String>,
    pub saml_request_id: Option<String>,
}

/// What a successful callback yields.
#[derive(Debug, Clone)]
pub(crate) struct FlowOutcome {
    pub tokens: TokenBundle,
    pub external_user_id: String,
    pub user_info: Value,
    pub saml_session_index: Option<String>,
    pub saml_name_id: Option<String>,
    /// Upper bound on the session's lifetime set by the provider.
    pub not_after: Option<DateTime<Utc>>,
}

/// The two halves of a login that differ per protocol.
#[async_trait]
pub(crate) trait ProviderFlow: Send + Sync {
    /// Builds the redirect for a fresh `state`.
    fn build_login_redirect(&self, state: &str, options: &LoginOptions) -> CoordinatorResult<LoginRedirect>;

    /// Completes a login from the provider callback.
    async fn handle_callback(
        &self,
        pending: &PendingAuthorization,
        callback: &CallbackParams,
    ) -> CoordinatorResult<FlowOutcome>;
}

// ============================================================================
// OAuth 2.0 / OIDC
// ============================================================================

/// Authorization-code flow with PKCE.
#[derive(Debug)]
pub(crate) struct OAuthFlow {
    client: OidcClient,
}

impl OAuthFlow {
    pub const fn new(client: OidcClient) -> Self {
        Self { client }
    }

    pub const fn client(&self) -> &OidcClient {
        &self.client
    }

    fn is_oidc(&self) -> bool {
        self.client.config().oidc
    }

    /// Validates an ID token and returns its claims. Violations are logged,
    /// not fatal.
    fn id_token_claims(&self, id_token: &str, nonce: Option<&str>) -> CoordinatorResult<Value> {
        let options = match nonce {
            Some(nonce) => IdTokenValidationOptions::default().with_nonce(nonce),
            None => IdTokenValidationOptions::default(),
        };
        let validation = self.client.validate_id_token(id_token, &options)?;
        if !validation.valid {
            warn!(
                client_id = %self.client.config().client_id,
                violations = ?validation.error_messages(),
                "ID token failed claim validation"
            );
        }
        serde_json::to_value(&validation.claims)
            .map_err(|e| CoordinatorError::Internal(format!("failed to serialize claims: {e}")))
    }
}

#[async_trait]
impl ProviderFlow for OAuthFlow {
    fn build_login_redirect(&self, state: &str, options: &LoginOptions) -> CoordinatorResult<LoginRedirect> {
        let pkce = PkcePair::generate();
        let nonce = self.is_oidc().then(generate_nonce);

        let authorization = AuthorizationOptions {
            scopes: options.scopes.clone(),
            nonce: nonce.clone(),
            login_hint: options.login_hint.clone(),
            prompt: options.prompt,
            extra_params: options.extra_params.clone(),
        };
        let auth_url =
            self.client
                .build_authorization_url(state, Some(&pkce.code_challenge), &authorization)?;

        Ok(LoginRedirect {
            auth_url,
            code_verifier: Some(pkce.code_verifier),
            nonce,
            saml_request_id: None,
        })
    }

    async fn handle_callback(
        &self,
        pending: &PendingAuthorization,
        callback: &CallbackParams,
    ) -> CoordinatorResult<FlowOutcome> {
        if let Some(error) = &callback.error {
            return Err(OidcError::Provider {
                error: error.clone(),
                description: callback.error_description.clone(),
            }
            .into());
        }
        let code = callback
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CoordinatorError::validation("callback is missing the authorization code"))?;

        let tokens = self
            .client
            .exchange_code(code, pending.code_verifier.as_deref())
            .await?;

        let claims = match (&tokens.id_token, self.is_oidc()) {
            (Some(id_token), true) => Some(self.id_token_claims(id_token, pending.nonce.as_deref())?),
            _ => None,
        };

        let user_info = if self.client.config().userinfo_endpoint.is_some() {
            match self.client.get_user_info(&tokens.access_token).await {
                Ok(info) => info,
                Err(e) if claims.is_some() => {
                    warn!(error = %e, "userinfo request failed, using ID token claims");
                    claims.clone().unwrap_or(Value::Null)
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            claims.clone().unwrap_or_else(|| Value::Object(serde_json::Map::new()))
        };

        let external_user_id = subject_of(&user_info)
            .or_else(|| claims.as_ref().and_then(subject_of))
            .unwrap_or_default();
        if external_user_id.is_empty() {
            warn!(
                client_id = %self.client.config().client_id,
                "provider returned no subject identifier"
            );
        }
        debug!(external_user_id = %external_user_id, "authorization code exchanged");

        Ok(FlowOutcome {
            tokens,
            external_user_id,
            user_info,
            saml_session_index: None,
            saml_name_id: None,
            not_after: None,
        })
    }
}

/// `sub`, else a string or numeric `id`.
fn subject_of(claims: &Value) -> Option<String> {
    ["sub", "id"].iter().find_map(|key| match claims.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// ============================================================================
// SAML 2.0
// ============================================================================

/// Web Browser SSO over HTTP-Redirect (request) and HTTP-POST (response).
#[derive(Debug)]
pub(crate) struct SamlFlow {
    engine: SamlEngine,
}

impl SamlFlow {
    pub const fn new(engine: SamlEngine) -> Self {
        Self { engine }
    }

    pub const fn engine(&self) -> &SamlEngine {
        &self.engine
    }
}

/// SAML sessions carry no bearer tokens; this marks their token bundle.
pub(crate) const SAML_TOKEN_TYPE: &str = "saml";

#[async_trait]
impl ProviderFlow for SamlFlow {
    fn build_login_redirect(&self, state: &str, options: &LoginOptions) -> CoordinatorResult<LoginRedirect> {
        let request_options = AuthnRequestOptions {
            force_authn: options.force_authn,
            is_passive: options.is_passive,
            ..AuthnRequestOptions::default()
        };
        let request = self
            .engine
            .generate_authn_request(None, Some(state), &request_options)?;

        Ok(LoginRedirect {
            auth_url: request.redirect_url,
            code_verifier: None,
            nonce: None,
            saml_request_id: Some(request.id),
        })
    }

    async fn handle_callback(
        &self,
        pending: &PendingAuthorization,
        callback: &CallbackParams,
    ) -> CoordinatorResult<FlowOutcome> {
        let saml_response = callback
            .saml_response
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CoordinatorError::validation("callback is missing SAMLResponse"))?;

        let parsed = self.engine.parse_assertion(saml_response)?;
        let assertion = parsed.assertion;

        if let (Some(expected), Some(actual)) =
            (&pending.saml_request_id, &assertion.in_response_to)
        {
            if expected != actual {
                return Err(SamlError::InvalidResponse(format!(
                    "InResponseTo '{actual}' does not match request '{expected}'"
                ))
                .into());
            }
        }

        // A deadline already behind us only gets this far under the warn
        // condition policy, which has reported it; the default lifetime applies.
        let not_after = assertion.session_deadline().filter(|deadline| {
            let future = *deadline > Utc::now();
            if !future {
                warn!(deadline = %deadline, "assertion session deadline has passed, not capping");
            }
            future
        });

        Ok(FlowOutcome {
            tokens: TokenBundle {
                token_type: SAML_TOKEN_TYPE.to_string(),
                ..TokenBundle::default()
            },
            external_user_id: assertion.name_id.clone(),
            user_info: assertion.to_claims(),
            saml_session_index: assertion.session_index.clone(),
            saml_name_id: Some(assertion.name_id),
            not_after,
        })
    }
}

// ============================================================================
// Construction
// ============================================================================

/// A provider's engine, chosen by its type tag.
#[derive(Debug, Clone)]
pub(crate) enum ProviderEngine {
    OAuth(Arc<OAuthFlow>),
    Saml(Arc<SamlFlow>),
}

impl ProviderEngine {
    /// Builds the engine for a decrypted provider configuration.
    pub fn build(
        provider: &ProviderConfiguration,
        transport: &HttpTransport,
        saml_settings: ValidationSettings,
        verifier: Option<&Arc<dyn SignatureVerifier>>,
    ) -> CoordinatorResult<Self> {
        match provider.provider_type {
            ProviderType::OAuth2 | ProviderType::Oidc => {
                let config = OidcClientConfig::from_provider(provider)?;
                let client = OidcClient::new(config, transport.clone());
                Ok(Self::OAuth(Arc::new(OAuthFlow::new(client))))
            }
            ProviderType::Saml => {
                let config = SamlConfig::from_provider(provider)?;
                let mut engine = SamlEngine::new(config, saml_settings);
                if let Some(verifier) = verifier {
                    engine = engine.with_verifier(Arc::clone(verifier));
                }
                Ok(Self::Saml(Arc::new(SamlFlow::new(engine))))
            }
        }
    }

    /// The flow behind this engine.
    pub fn flow(&self) -> &dyn ProviderFlow {
        match self {
            Self::OAuth(flow) => flow.as_ref(),
            Self::Saml(flow) => flow.as_ref(),
        }
    }

    pub fn oauth(&self) -> Option<&OAuthFlow> {
        match self {
            Self::OAuth(flow) => Some(flow),
            Self::Saml(_) => None,
        }
    }

    pub fn saml(&self) -> Option<&SamlFlow> {
        match self {
            Self::Saml(flow) => Some(flow),
            Self::OAuth(_) => None,
        }
    }
}
