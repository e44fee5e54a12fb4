//! SAML login, assertion parsing and logout integration tests.

use chrono::{Duration, Utc};
use sso_core::{ConditionPolicy, SsoConfig};
use sso_protocol_saml::ConditionViolation;
use sso_server::{CallbackParams, LoginOptions, LogoutTarget};

use crate::common::{query_param, saml_response, SamlResponseFixture, TestEnv, SP_ENTITY_ID};

const DID: &str = "did:example:bob";

/// A successful response yields the NameID and attributes.
#[tokio::test]
async fn test_parse_assertion_extracts_subject_and_attributes() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_saml_provider().await?;

    let response = saml_response(&SamlResponseFixture::new("user@example.com"));
    let parsed = env
        .sso
        .parse_assertion(provider_id, &response)
        .await
        .into_result()?;

    assert_eq!(parsed.assertion.name_id, "user@example.com");
    assert_eq!(parsed.assertion.attribute("email"), Some("user@example.com"));
    assert!(parsed.violations.is_empty());

    let json = serde_json::to_value(&parsed)?;
    assert_eq!(json["assertion"]["nameId"], "user@example.com");

    Ok(())
}

#[tokio::test]
async fn test_expired_assertion_is_flagged_under_warn_policy() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_saml_provider().await?;

    let mut fixture = SamlResponseFixture::new("user@example.com");
    fixture.not_on_or_after = Utc::now() - Duration::hours(1);
    let parsed = env
        .sso
        .parse_assertion(provider_id, &saml_response(&fixture))
        .await
        .into_result()?;

    assert!(parsed
        .violations
        .iter()
        .any(|v| matches!(v, ConditionViolation::Expired { .. })));

    Ok(())
}

#[tokio::test]
async fn test_expired_assertion_is_rejected_under_reject_policy() -> anyhow::Result<()> {
    let config = SsoConfig {
        saml_condition_policy: ConditionPolicy::Reject,
        ..SsoConfig::for_testing()
    };
    let env = TestEnv::with_config(config).await?;
    let provider_id = env.add_saml_provider().await?;

    let mut fixture = SamlResponseFixture::new("user@example.com");
    fixture.not_on_or_after = Utc::now() - Duration::hours(1);
    let result = env
        .sso
        .parse_assertion(provider_id, &saml_response(&fixture))
        .await;
    assert_eq!(result.error_code(), Some("CONDITIONS_NOT_MET"));

    Ok(())
}

#[tokio::test]
async fn test_saml_login_creates_session() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_saml_provider().await?;

    let login = env
        .sso
        .initiate_login(
            provider_id,
            LoginOptions {
                user_did: Some(DID.to_string()),
                ..LoginOptions::default()
            },
        )
        .await
        .into_result()?;
    assert!(login.auth_url.starts_with(&format!("{}/saml/sso?", env.idp.uri())));
    assert!(query_param(&login.auth_url, "SAMLRequest").is_some());
    assert_eq!(
        query_param(&login.auth_url, "RelayState").as_deref(),
        Some(login.state.as_str())
    );
    assert!(login.code_verifier.is_none());

    let response = saml_response(&SamlResponseFixture::new("bob@example.com"));
    let result = env
        .sso
        .handle_callback(provider_id, CallbackParams::saml(response, login.state))
        .await
        .into_result()?;

    assert_eq!(result.session.external_user_id, "bob@example.com");
    assert_eq!(result.user_info["email"], "bob@example.com");

    let stored = env
        .sso
        .sessions()
        .get_session(&result.session.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("session missing"))?;
    assert_eq!(stored.session.saml_name_id.as_deref(), Some("bob@example.com"));
    assert_eq!(stored.session.saml_session_index.as_deref(), Some("_session-1"));

    // SAML sessions have nothing to refresh.
    let refresh = env.sso.refresh_token(&result.session.id).await;
    assert_eq!(refresh.error_code(), Some("UNSUPPORTED_OPERATION"));

    let logout = env
        .sso
        .logout(provider_id, LogoutTarget::Session(result.session.id.clone()))
        .await
        .into_result()?;
    assert_eq!(logout.sessions_removed, 1);
    assert_eq!(logout.tokens_revoked, 0);
    assert_eq!(logout.saml_logout_urls.len(), 1);
    assert!(logout.saml_logout_urls[0].starts_with(&format!("{}/saml/slo?", env.idp.uri())));

    Ok(())
}

/// The session ends with the IdP's session, not the default lifetime.
#[tokio::test]
async fn test_saml_session_lifetime_follows_the_assertion() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_saml_provider().await?;
    assert_eq!(env.sso.config().default_session_ttl_secs, 3600);

    let mut with_session_bound = SamlResponseFixture::new("bob@example.com");
    with_session_bound.session_not_on_or_after = Some(Utc::now() + Duration::minutes(10));
    // Conditions alone: five minutes.
    let conditions_only = SamlResponseFixture::new("bob@example.com");

    for (fixture, expected) in [(with_session_bound, 600), (conditions_only, 300)] {
        let login = env
            .sso
            .initiate_login(provider_id, LoginOptions::default())
            .await
            .into_result()?;
        let result = env
            .sso
            .handle_callback(
                provider_id,
                CallbackParams::saml(saml_response(&fixture), login.state),
            )
            .await
            .into_result()?;
        let remaining = result.session.remaining_seconds;
        assert!(
            (expected - 10..=expected).contains(&remaining),
            "expected about {expected}s, got {remaining}s"
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_response_to_another_request_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_saml_provider().await?;

    let login = env
        .sso
        .initiate_login(provider_id, LoginOptions::default())
        .await
        .into_result()?;

    let mut fixture = SamlResponseFixture::new("bob@example.com");
    fixture.in_response_to = Some("_some-other-request");
    let result = env
        .sso
        .handle_callback(
            provider_id,
            CallbackParams::saml(saml_response(&fixture), login.state),
        )
        .await;
    assert_eq!(result.error_code(), Some("INVALID_RESPONSE"));

    Ok(())
}

#[tokio::test]
async fn test_metadata_describes_the_sp() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_saml_provider().await?;

    let xml = env.sso.get_saml_metadata(provider_id).await.into_result()?;
    assert!(xml.contains(&format!(r#"entityID="{SP_ENTITY_ID}""#)));
    assert!(xml.contains("AssertionConsumerService"));
    assert!(xml.contains("https://sp.example.com/acs"));
    assert!(xml.contains(
        r#"<md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://sp.example.com/slo"/>"#
    ));
    assert!(!xml.contains(r#"SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.example.com/acs""#));

    Ok(())
}
