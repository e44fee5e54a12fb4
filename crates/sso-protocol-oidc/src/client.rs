//! OAuth 2.0 / OIDC relying-party client for a single provider.
//!
//! Covers the authorization-code flow with PKCE (RFC 7636), refresh
//! (RFC 6749 Section 6), `UserInfo`, ID token claim validation and token
//! revocation (RFC 7009).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sso_model::TokenBundle;
use url::Url;

use crate::config::OidcClientConfig;
use crate::discovery::{self, ProviderMetadata};
use crate::error::{ErrorResponse, OidcError, OidcResult};
use crate::http::{HttpResponse, HttpTransport};
use crate::id_token::{self, IdTokenValidation, IdTokenValidationOptions};
use crate::types::{GrantType, Prompt, TokenTypeHint};

/// Query parameters the client always controls.
const RESERVED_PARAMS: &[&str] = &[
    "response_type",
    "client_id",
    "redirect_uri",
    "state",
    "code_challenge",
    "code_challenge_method",
    "scope",
    "nonce",
];

/// Caller options for the authorization request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationOptions {
    /// Scopes overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    /// OIDC nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// `login_hint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
    /// `prompt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
    /// Extra query parameters. Reserved names are ignored.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_params: BTreeMap<String, String>,
}

/// Result of a revocation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationOutcome {
    /// The provider accepted the revocation.
    pub revoked: bool,
    /// No revocation endpoint is configured.
    pub skipped: bool,
}

/// Client for one OAuth 2.0 / OIDC provider.
#[derive(Debug, Clone)]
pub struct OidcClient {
    config: OidcClientConfig,
    transport: HttpTransport,
}

impl OidcClient {
    /// Creates a client.
    #[must_use]
    pub const fn new(config: OidcClientConfig, transport: HttpTransport) -> Self {
        Self { config, transport }
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &OidcClientConfig {
        &self.config
    }

    /// Fetches the discovery document of `issuer`.
    pub async fn discover(transport: &HttpTransport, issuer: &str) -> OidcResult<ProviderMetadata> {
        discovery::fetch(transport, issuer).await
    }

    /// Builds the authorization redirect URL.
    ///
    /// Parameter order is deterministic. PKCE parameters are included when
    /// `code_challenge` is given.
    pub fn build_authorization_url(
        &self,
        state: &str,
        code_challenge: Option<&str>,
        options: &AuthorizationOptions,
    ) -> OidcResult<String> {
        if state.is_empty() {
            return Err(OidcError::InvalidRequest("state must not be empty".to_string()));
        }

        let mut url = Url::parse(&self.config.authorization_endpoint).map_err(|e| {
            OidcError::InvalidRequest(format!("invalid authorization endpoint: {e}"))
        })?;

        let scope = options
            .scopes
            .as_ref()
            .map_or_else(|| self.config.default_scope(), |s| s.join(" "));

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("state", state);

            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
            if !scope.is_empty() {
                query.append_pair("scope", &scope);
            }
            if let Some(nonce) = &options.nonce {
                query.append_pair("nonce", nonce);
            }
            if let Some(hint) = &options.login_hint {
                query.append_pair("login_hint", hint);
            }
            if let Some(prompt) = options.prompt {
                query.append_pair("prompt", &prompt.to_string());
            }
            for (key, value) in &options.extra_params {
                if RESERVED_PARAMS.contains(&key.as_str()) {
                    tracing::debug!(param = %key, "ignoring reserved authorization parameter");
                    continue;
                }
                query.append_pair(key, value);
            }
        }

        Ok(url.into())
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> OidcResult<TokenBundle> {
        if code.is_empty() {
            return Err(OidcError::InvalidRequest("code must not be empty".to_string()));
        }

        let mut params = vec![
            ("grant_type", GrantType::AuthorizationCode.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .transport
            .post_form(&self.config.token_endpoint, &params, None)
            .await?;
        parse_token_response(&response)
    }

    /// Obtains new tokens with a refresh token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> OidcResult<TokenBundle> {
        if refresh_token.is_empty() {
            return Err(OidcError::InvalidRequest(
                "refresh token must not be empty".to_string(),
            ));
        }

        let mut params = vec![
            ("grant_type", GrantType::RefreshToken.as_str()),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .transport
            .post_form(&self.config.token_endpoint, &params, None)
            .await?;
        parse_token_response(&response)
    }

    /// Fetches the `UserInfo` claims for an access token.
    pub async fn get_user_info(&self, access_token: &str) -> OidcResult<Value> {
        let endpoint = self
            .config
            .userinfo_endpoint
            .as_deref()
            .ok_or(OidcError::NotConfigured("userinfoEndpoint"))?;

        let response = self.transport.get(endpoint, Some(access_token)).await?;
        if !response.is_success() {
            return Err(error_from_response(&response));
        }
        match response.json()? {
            value @ Value::Object(_) => Ok(value),
            other => Err(OidcError::InvalidResponse(format!(
                "userinfo is not an object: {other}"
            ))),
        }
    }

    /// Validates ID token claims. See [`id_token::validate_id_token`].
    pub fn validate_id_token(
        &self,
        id_token: &str,
        options: &IdTokenValidationOptions,
    ) -> OidcResult<IdTokenValidation> {
        id_token::validate_id_token(&self.config, id_token, options)
    }

    /// Revokes a token at the provider.
    ///
    /// Without a revocation endpoint this is a no-op reporting `skipped`.
    pub async fn revoke_token(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> OidcResult<RevocationOutcome> {
        let Some(endpoint) = self.config.revocation_endpoint.as_deref() else {
            return Ok(RevocationOutcome {
                revoked: false,
                skipped: true,
            });
        };

        let mut params = vec![("token", token), ("client_id", self.config.client_id.as_str())];
        if let Some(hint) = hint {
            params.push(("token_type_hint", hint.as_str()));
        }
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self.transport.post_form(endpoint, &params, None).await?;
        if response.is_success() {
            Ok(RevocationOutcome {
                revoked: true,
                skipped: false,
            })
        } else {
            Err(error_from_response(&response))
        }
    }
}

/// Maps a non-2xx response to a provider or HTTP error.
fn error_from_response(response: &HttpResponse) -> OidcError {
    match response
        .json()
        .ok()
        .and_then(|v| serde_json::from_value::<ErrorResponse>(v).ok())
    {
        Some(error) => OidcError::provider(error),
        None => OidcError::Http {
            status: response.status,
            body: response.snippet(),
        },
    }
}

/// Normalizes a token endpoint response.
fn parse_token_response(response: &HttpResponse) -> OidcResult<TokenBundle> {
    let body = match response.json() {
        Ok(body) => body,
        Err(_) if !response.is_success() => return Err(error_from_response(response)),
        Err(e) => return Err(e),
    };

    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(OidcError::Provider {
            error: error.to_string(),
            description: text(&body, "error_description"),
        });
    }
    if !response.is_success() {
        return Err(OidcError::Http {
            status: response.status,
            body: response.snippet(),
        });
    }

    let access_token = text(&body, "access_token").ok_or_else(|| {
        OidcError::InvalidResponse("token response has no access_token".to_string())
    })?;

    Ok(TokenBundle {
        access_token,
        refresh_token: text(&body, "refresh_token"),
        id_token: text(&body, "id_token"),
        token_type: text(&body, "token_type").unwrap_or_else(|| "Bearer".to_string()),
        scope: text(&body, "scope"),
        expires_in: body.get("expires_in").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }),
    })
}

fn text(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpConfig;
    use serde_json::json;
    use sso_crypto::PkcePair;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base: &str, oidc: bool) -> OidcClient {
        let map = json!({
            "clientId": "app",
            "clientSecret": "s3cret",
            "authorizationEndpoint": format!("{base}/authorize"),
            "tokenEndpoint": format!("{base}/token"),
            "userinfoEndpoint": format!("{base}/userinfo"),
            "revocationEndpoint": format!("{base}/revoke"),
            "redirectUri": "https://app.example.com/callback",
            "issuer": base
        });
        let config = OidcClientConfig::from_map(map.as_object().unwrap(), oidc).unwrap();
        OidcClient::new(config, HttpTransport::new(HttpConfig::default()).unwrap())
    }

    fn query(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn authorization_url_contains_pkce_and_state() {
        let client = client_for("https://idp.example.com", true);
        let pkce = PkcePair::generate();
        let options = AuthorizationOptions {
            nonce: Some("n-1".to_string()),
            login_hint: Some("alice@example.com".to_string()),
            prompt: Some(Prompt::Login),
            ..AuthorizationOptions::default()
        };
        let url = client
            .build_authorization_url("st-1", Some(&pkce.code_challenge), &options)
            .unwrap();

        let pairs = query(&url);
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("client_id"), Some("app"));
        assert_eq!(get("state"), Some("st-1"));
        assert_eq!(get("code_challenge"), Some(pkce.code_challenge.as_str()));
        assert_eq!(get("code_challenge_method"), Some("S256"));
        assert_eq!(get("scope"), Some("openid profile email"));
        assert_eq!(get("nonce"), Some("n-1"));
        assert_eq!(get("prompt"), Some("login"));
        assert_eq!(get("login_hint"), Some("alice@example.com"));
    }

    #[test]
    fn authorization_url_is_deterministic_and_ignores_reserved_extras() {
        let client = client_for("https://idp.example.com", false);
        let mut options = AuthorizationOptions {
            scopes: Some(vec!["read".to_string(), "write".to_string()]),
            ..AuthorizationOptions::default()
        };
        options.extra_params.insert("state".to_string(), "hijack".to_string());
        options.extra_params.insert("audience".to_string(), "api".to_string());

        let a = client.build_authorization_url("s", None, &options).unwrap();
        let b = client.build_authorization_url("s", None, &options).unwrap();
        assert_eq!(a, b);

        let pairs = query(&a);
        assert_eq!(pairs.iter().filter(|(k, _)| k == "state").count(), 1);
        assert!(pairs.contains(&("scope".to_string(), "read write".to_string())));
        assert!(pairs.contains(&("audience".to_string(), "api".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "code_challenge"));
    }

    #[test]
    fn empty_state_is_rejected() {
        let client = client_for("https://idp.example.com", true);
        assert!(matches!(
            client.build_authorization_url("", None, &AuthorizationOptions::default()),
            Err(OidcError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn exchange_code_sends_verifier_and_normalizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=verifier-123"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "id_token": "id-1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "openid email"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server.uri(), true)
            .exchange_code("code-1", Some("verifier-123"))
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(tokens.id_token.as_deref(), Some("id-1"));
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn token_error_surfaces_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "code already used"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server.uri(), true)
            .exchange_code("code-1", None)
            .await
            .unwrap_err();
        match err {
            OidcError::Provider { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert_eq!(description.as_deref(), Some("code already used"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_accepts_form_encoded_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("access_token=at-2&token_type=bearer&expires_in=120")
                    .insert_header("content-type", "application/x-www-form-urlencoded"),
            )
            .mount(&server)
            .await;

        let tokens = client_for(&server.uri(), false)
            .refresh_access_token("rt-1")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at-2");
        assert_eq!(tokens.expires_in, Some(120));
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn userinfo_uses_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"sub": "u1", "email": "u1@x.io"})),
            )
            .mount(&server)
            .await;

        let info = client_for(&server.uri(), true).get_user_info("at-1").await.unwrap();
        assert_eq!(info["email"], "u1@x.io");
    }

    #[tokio::test]
    async fn userinfo_requires_endpoint() {
        let mut client = client_for("https://idp.example.com", true);
        client.config.userinfo_endpoint = None;
        assert!(matches!(
            client.get_user_info("at").await,
            Err(OidcError::NotConfigured("userinfoEndpoint"))
        ));
    }

    #[tokio::test]
    async fn revoke_without_endpoint_is_skipped() {
        let mut client = client_for("https://idp.example.com", true);
        client.config.revocation_endpoint = None;
        let outcome = client.revoke_token("at", None).await.unwrap();
        assert_eq!(outcome, RevocationOutcome { revoked: false, skipped: true });
    }

    #[tokio::test]
    async fn revoke_treats_2xx_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains("token_type_hint=refresh_token"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let outcome = client_for(&server.uri(), true)
            .revoke_token("rt", Some(TokenTypeHint::RefreshToken))
            .await
            .unwrap();
        assert!(outcome.revoked);
        assert!(!outcome.skipped);
    }

    #[tokio::test]
    async fn discover_fetches_metadata() {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/authorize"),
                "token_endpoint": format!("{issuer}/token"),
                "userinfo_endpoint": format!("{issuer}/userinfo")
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpConfig::default()).unwrap();
        let metadata = OidcClient::discover(&transport, &issuer).await.unwrap();
        assert_eq!(metadata.token_endpoint, format!("{issuer}/token"));
    }
}
