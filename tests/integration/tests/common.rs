//! Common test utilities and fixtures.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sso_core::SsoConfig;
use sso_crypto::TokenCipher;
use sso_model::ProviderType;
use sso_server::{CallbackParams, CallbackResult, LoginOptions, NewProvider, SsoCoordinator};

/// Client id registered at the mock IdP.
pub const CLIENT_ID: &str = "sso-test-client";

/// Entity id of our SP in SAML tests.
pub const SP_ENTITY_ID: &str = "https://sp.example.com";

/// Test environment: a coordinator over in-memory stores plus a mock IdP.
pub struct TestEnv {
    /// The coordinator under test.
    pub sso: Arc<SsoCoordinator>,
    /// Mock OAuth/OIDC/SAML endpoints.
    pub idp: MockServer,
}

impl TestEnv {
    /// Creates an environment with the test configuration.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(SsoConfig::for_testing()).await
    }

    /// Creates an environment with a custom configuration.
    pub async fn with_config(config: SsoConfig) -> anyhow::Result<Self> {
        // Initialize tracing for tests
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sso_server=debug,sso_session=debug")
            .with_test_writer()
            .try_init();

        let idp = MockServer::start().await;
        let sso = SsoCoordinator::builder(config)
            .session_cipher(TokenCipher::from_secret("integration-session-secret")?)
            .build()?;

        Ok(Self { sso, idp })
    }

    /// Issuer URL of the mock IdP.
    pub fn issuer(&self) -> String {
        self.idp.uri()
    }

    /// OIDC provider config pointing at the mock IdP.
    pub fn oidc_config(&self) -> Map<String, Value> {
        let base = self.idp.uri();
        object(json!({
            "clientId": CLIENT_ID,
            "clientSecret": "idp-client-secret",
            "issuer": base,
            "authorizationEndpoint": format!("{base}/authorize"),
            "tokenEndpoint": format!("{base}/token"),
            "userinfoEndpoint": format!("{base}/userinfo"),
            "revocationEndpoint": format!("{base}/revoke"),
            "redirectUri": "https://app.example.com/callback"
        }))
    }

    /// Registers an OIDC provider at the mock IdP.
    pub async fn add_oidc_provider(&self) -> anyhow::Result<Uuid> {
        let input = NewProvider::new(ProviderType::Oidc, "Mock OIDC", self.oidc_config());
        Ok(self.sso.add_provider(input).await.into_result()?)
    }

    /// SAML provider config with a freshly generated IdP certificate.
    pub fn saml_config(&self) -> Map<String, Value> {
        let base = self.idp.uri();
        object(json!({
            "entityId": SP_ENTITY_ID,
            "idpEntityId": "https://idp.example.com",
            "ssoUrl": format!("{base}/saml/sso"),
            "sloUrl": format!("{base}/saml/slo"),
            "certificate": certificate_pem(),
            "acsUrl": "https://sp.example.com/acs",
            "spSloUrl": "https://sp.example.com/slo"
        }))
    }

    /// Registers a SAML provider at the mock IdP.
    pub async fn add_saml_provider(&self) -> anyhow::Result<Uuid> {
        let input = NewProvider::new(ProviderType::Saml, "Mock SAML", self.saml_config());
        Ok(self.sso.add_provider(input).await.into_result()?)
    }

    /// Mounts a token endpoint answering every code exchange with `body`.
    pub async fn mount_token_response(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.idp)
            .await;
    }

    /// Mounts a userinfo endpoint.
    pub async fn mount_userinfo(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.idp)
            .await;
    }

    /// An unsigned ID token issued by the mock IdP.
    pub fn id_token(&self, subject: &str, nonce: Option<&str>) -> String {
        let now = Utc::now().timestamp();
        let mut claims = json!({
            "iss": self.issuer(),
            "aud": CLIENT_ID,
            "sub": subject,
            "email": format!("{subject}@example.com"),
            "iat": now,
            "exp": now + 3600
        });
        if let Some(nonce) = nonce {
            claims["nonce"] = json!(nonce);
        }
        unsigned_jwt(&claims)
    }

    /// Runs a complete OIDC login for `did` and returns the callback result.
    ///
    /// The token endpoint answers with `tokens` plus an ID token carrying
    /// the nonce of this login.
    pub async fn oidc_login(
        &self,
        provider_id: Uuid,
        did: &str,
        mut tokens: Value,
    ) -> anyhow::Result<CallbackResult> {
        let login = self
            .sso
            .initiate_login(
                provider_id,
                LoginOptions {
                    user_did: Some(did.to_string()),
                    ..LoginOptions::default()
                },
            )
            .await
            .into_result()?;
        let nonce = query_param(&login.auth_url, "nonce");
        tokens["id_token"] = json!(self.id_token("user-123", nonce.as_deref()));

        let verifier = login
            .code_verifier
            .ok_or_else(|| anyhow::anyhow!("OIDC login returned no code verifier"))?;
        let _guard = Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("code_verifier={verifier}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokens))
            .expect(1)
            .mount_as_scoped(&self.idp)
            .await;

        Ok(self
            .sso
            .handle_callback(provider_id, CallbackParams::oauth("auth-code-1", login.state))
            .await
            .into_result()?)
    }
}

/// An RS256-labelled JWT with a dummy signature.
pub fn unsigned_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// Extracts a query parameter from a URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// A self-signed IdP certificate in PEM form.
pub fn certificate_pem() -> String {
    let mut params = rcgen::CertificateParams::default();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "idp.example.com");
    let key_pair = rcgen::KeyPair::generate().expect("key pair");
    params.self_signed(&key_pair).expect("certificate").pem()
}

/// Options for [`saml_response`].
pub struct SamlResponseFixture<'a> {
    pub name_id: &'a str,
    pub email: &'a str,
    pub in_response_to: Option<&'a str>,
    pub session_index: &'a str,
    pub not_on_or_after: DateTime<Utc>,
    pub session_not_on_or_after: Option<DateTime<Utc>>,
}

impl<'a> SamlResponseFixture<'a> {
    /// A successful response for `name_id`, valid for five minutes.
    pub fn new(name_id: &'a str) -> Self {
        Self {
            name_id,
            email: name_id,
            in_response_to: None,
            session_index: "_session-1",
            not_on_or_after: Utc::now() + Duration::minutes(5),
            session_not_on_or_after: None,
        }
    }
}

/// Builds a base64 `SAMLResponse` form value. The assertion is unsigned.
pub fn saml_response(fixture: &SamlResponseFixture<'_>) -> String {
    let now = Utc::now();
    let instant = |at: DateTime<Utc>| at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let in_response_to = fixture
        .in_response_to
        .map(|id| format!(r#" InResponseTo="{id}""#))
        .unwrap_or_default();
    let session_not_on_or_after = fixture
        .session_not_on_or_after
        .map(|at| format!(r#" SessionNotOnOrAfter="{}""#, instant(at)))
        .unwrap_or_default();

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp-{id}"{in_response_to} Version="2.0" IssueInstant="{issued}" Destination="https://sp.example.com/acs">
  <saml:Issuer>https://idp.example.com</saml:Issuer>
  <samlp:Status>
    <samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/>
  </samlp:Status>
  <saml:Assertion ID="_assert-{id}" Version="2.0" IssueInstant="{issued}">
    <saml:Issuer>https://idp.example.com</saml:Issuer>
    <saml:Subject>
      <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">{name_id}</saml:NameID>
    </saml:Subject>
    <saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">
      <saml:AudienceRestriction>
        <saml:Audience>{audience}</saml:Audience>
      </saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AuthnStatement AuthnInstant="{issued}" SessionIndex="{session_index}"{session_not_on_or_after}/>
    <saml:AttributeStatement>
      <saml:Attribute Name="email">
        <saml:AttributeValue>{email}</saml:AttributeValue>
      </saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#,
        id = Uuid::new_v4().simple(),
        audience = SP_ENTITY_ID,
        issued = instant(now),
        not_before = instant(now - Duration::minutes(1)),
        not_on_or_after = instant(fixture.not_on_or_after),
        name_id = fixture.name_id,
        email = fixture.email,
        session_index = fixture.session_index,
    );
    STANDARD.encode(xml)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
