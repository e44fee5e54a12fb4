//! Provider administration integration tests.

use serde_json::json;
use sso_model::ProviderType;
use sso_server::coordinator::{ENCRYPTED_PREFIX, REDACTED};
use sso_server::{LoginOptions, NewProvider, ProviderFilter, ProviderUpdate};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{query_param, TestEnv};

/// A new OIDC provider yields a PKCE login URL.
#[tokio::test]
async fn test_oidc_login_url_carries_pkce_and_state() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;

    let login = env
        .sso
        .initiate_login(provider_id, LoginOptions::default())
        .await
        .into_result()?;

    assert!(login.auth_url.contains("code_challenge_method=S256"));
    assert_eq!(query_param(&login.auth_url, "state").as_deref(), Some(login.state.as_str()));
    assert_eq!(query_param(&login.auth_url, "response_type").as_deref(), Some("code"));
    assert!(query_param(&login.auth_url, "code_challenge").is_some());
    assert!(query_param(&login.auth_url, "nonce").is_some());
    assert_eq!(login.code_verifier.as_deref().map(str::len), Some(43));

    Ok(())
}

#[tokio::test]
async fn test_missing_required_fields_are_listed() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let mut config = env.oidc_config();
    config.remove("tokenEndpoint");
    config.remove("userinfoEndpoint");

    let result = env
        .sso
        .add_provider(NewProvider::new(ProviderType::Oidc, "Broken", config))
        .await;

    assert_eq!(result.error_code(), Some("VALIDATION_ERROR"));
    let message = result.error.map(|e| e.message).unwrap_or_default();
    assert!(message.contains("tokenEndpoint"), "{message}");
    assert!(message.contains("userinfoEndpoint"), "{message}");

    Ok(())
}

#[tokio::test]
async fn test_secrets_are_redacted_and_survive_echoed_updates() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;

    let listed = env
        .sso
        .list_providers(ProviderFilter::default())
        .await
        .into_result()?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].config_str("clientSecret"), Some(REDACTED));
    assert!(!serde_json::to_string(&listed)?.contains(ENCRYPTED_PREFIX));

    // A client that writes back what it read must not clobber the secret.
    let mut patch = listed[0].config.clone();
    patch.insert("displayOrder".into(), json!(2));
    let updated = env
        .sso
        .update_provider(
            provider_id,
            ProviderUpdate {
                name: Some("Renamed".into()),
                config: Some(patch),
                ..ProviderUpdate::default()
            },
        )
        .await
        .into_result()?;
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.config_str("clientSecret"), Some(REDACTED));

    // The stored secret is still the original one: the token request sends it.
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    env.oidc_login(provider_id, "did:example:alice", json!({
        "access_token": "at-1",
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .await?;

    let requests = env.idp.received_requests().await.unwrap_or_default();
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == "/token")
        .ok_or_else(|| anyhow::anyhow!("no token request"))?;
    let body = String::from_utf8_lossy(&token_request.body);
    assert!(body.contains("client_secret=idp-client-secret"), "{body}");

    Ok(())
}

#[tokio::test]
async fn test_list_filters_by_type_and_enabled() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let oidc = env.add_oidc_provider().await?;
    env.add_saml_provider().await?;
    env.sso
        .update_provider(
            oidc,
            ProviderUpdate {
                enabled: Some(false),
                ..ProviderUpdate::default()
            },
        )
        .await
        .into_result()?;

    let saml = env
        .sso
        .list_providers(ProviderFilter {
            provider_type: Some(ProviderType::Saml),
            enabled_only: false,
        })
        .await
        .into_result()?;
    assert_eq!(saml.len(), 1);

    let enabled = env
        .sso
        .list_providers(ProviderFilter {
            provider_type: None,
            enabled_only: true,
        })
        .await
        .into_result()?;
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].provider_type, ProviderType::Saml);

    Ok(())
}

#[tokio::test]
async fn test_delete_cascades_to_sessions() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;

    for _ in 0..2 {
        env.oidc_login(provider_id, "did:example:alice", json!({
            "access_token": "at",
            "token_type": "Bearer",
            "expires_in": 3600
        }))
        .await?;
    }

    let deleted = env.sso.delete_provider(provider_id).await.into_result()?;
    assert_eq!(deleted.sessions_removed, 2);
    assert!(env.sso.get_sessions("did:example:alice").await.into_result()?.is_empty());
    assert_eq!(
        env.sso.delete_provider(provider_id).await.error_code(),
        Some("NOT_FOUND")
    );

    Ok(())
}

#[tokio::test]
async fn test_connection_reports_each_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;

    Mock::given(method("HEAD"))
        .and(path("/authorize"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&env.idp)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&env.idp)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&env.idp)
        .await;

    let report = env.sso.test_connection(provider_id).await.into_result()?;
    let names: Vec<&str> = report.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        ["authorization_endpoint", "token_endpoint", "userinfo_endpoint", "discovery"]
    );

    assert!(report.checks[0].success);
    assert!(report.checks[1].success, "4xx still means reachable");
    assert!(!report.checks[2].success);
    assert_eq!(report.checks[2].status, Some(503));
    assert!(!report.success);

    Ok(())
}

#[tokio::test]
async fn test_saml_connection_checks_certificate() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_saml_provider().await?;

    let report = env.sso.test_connection(provider_id).await.into_result()?;
    let names: Vec<&str> = report.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["sso_url", "slo_url", "certificate"]);
    assert!(report.success, "{report:?}");

    Ok(())
}
