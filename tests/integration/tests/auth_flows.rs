//! OAuth / OIDC login, logout and refresh integration tests.

use serde_json::json;
use sso_core::EventType;
use sso_model::{SessionState, TokenBundle};
use sso_server::{CallbackParams, LoginOptions, LogoutTarget};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{unsigned_jwt, TestEnv, CLIENT_ID};

const DID: &str = "did:example:alice";

fn tokens() -> serde_json::Value {
    json!({
        "access_token": "access-B",
        "refresh_token": "refresh-B",
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "openid profile email"
    })
}

/// A valid code and verifier produce a live session whose
/// decrypted tokens are exactly what the token endpoint returned.
#[tokio::test]
async fn test_callback_creates_session_with_provider_tokens() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123", "email": "alice@example.com" }))
        .await;

    let result = env.oidc_login(provider_id, DID, tokens()).await?;
    assert_eq!(result.user_info["email"], "alice@example.com");
    assert_eq!(result.session.user_did.as_deref(), Some(DID));
    assert_eq!(result.session.external_user_id, "user-123");

    let info = env
        .sso
        .get_session_info(&result.session.id)
        .await
        .into_result()?;
    assert!(!info.is_expired);
    assert_eq!(info.state, SessionState::Active);

    let stored = env
        .sso
        .sessions()
        .get_session(&result.session.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("session missing"))?;
    assert_eq!(stored.tokens.access_token, "access-B");
    assert_eq!(stored.tokens.refresh_token.as_deref(), Some("refresh-B"));
    assert_eq!(stored.tokens.token_type, "Bearer");
    assert_eq!(stored.tokens.expires_in, Some(3600));
    assert!(stored.tokens.id_token.is_some());

    Ok(())
}

#[tokio::test]
async fn test_state_is_single_use() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_token_response(json!({ "access_token": "at", "token_type": "Bearer" }))
        .await;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;

    let login = env
        .sso
        .initiate_login(provider_id, LoginOptions::default())
        .await
        .into_result()?;
    let callback = CallbackParams::oauth("code-1", login.state.clone());

    // The unsigned test ID token is absent here, so only userinfo is used.
    let first = env.sso.handle_callback(provider_id, callback.clone()).await;
    assert!(first.success, "{:?}", first.error);

    let replay = env.sso.handle_callback(provider_id, callback).await;
    assert_eq!(replay.error_code(), Some("INVALID_STATE"));
    assert_eq!(env.sso.pending_logins(), 0);

    Ok(())
}

#[tokio::test]
async fn test_callback_for_another_provider_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let first = env.add_oidc_provider().await?;
    let second = env.add_oidc_provider().await?;

    let login = env
        .sso
        .initiate_login(first, LoginOptions::default())
        .await
        .into_result()?;
    let result = env
        .sso
        .handle_callback(second, CallbackParams::oauth("code", login.state))
        .await;

    assert_eq!(result.error_code(), Some("PROVIDER_MISMATCH"));
    let details = result.error.and_then(|e| e.details).unwrap_or_default();
    assert_eq!(details["expectedProviderId"], first.to_string());

    Ok(())
}

#[tokio::test]
async fn test_provider_error_is_surfaced_and_audited() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    let mut events = env.sso.subscribe_events();

    let login = env
        .sso
        .initiate_login(provider_id, LoginOptions::default())
        .await
        .into_result()?;
    let callback = CallbackParams {
        state: Some(login.state),
        error: Some("access_denied".into()),
        error_description: Some("user cancelled".into()),
        ..CallbackParams::default()
    };
    let result = env.sso.handle_callback(provider_id, callback).await;

    assert_eq!(result.error_code(), Some("PROVIDER_ERROR"));
    let details = result.error.and_then(|e| e.details).unwrap_or_default();
    assert_eq!(details["error"], "access_denied");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert_eq!(seen, [EventType::LoginInitiated, EventType::LoginError]);

    Ok(())
}

#[tokio::test]
async fn test_logout_revokes_refresh_then_access_token() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    let session = env.oidc_login(provider_id, DID, tokens()).await?.session;

    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token_type_hint=refresh_token"))
        .and(body_string_contains("token=refresh-B"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&env.idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token_type_hint=access_token"))
        .and(body_string_contains("token=access-B"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&env.idp)
        .await;

    let result = env
        .sso
        .logout(provider_id, LogoutTarget::Session(session.id.clone()))
        .await
        .into_result()?;
    assert_eq!(result.sessions_removed, 1);
    assert_eq!(result.tokens_revoked, 2);
    assert_eq!(result.revocation_failures, 0);
    assert_eq!(
        env.sso.get_session_info(&session.id).await.error_code(),
        Some("NOT_FOUND")
    );

    Ok(())
}

#[tokio::test]
async fn test_revocation_failure_does_not_block_logout() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    env.oidc_login(provider_id, DID, tokens()).await?;
    env.oidc_login(provider_id, DID, tokens()).await?;

    Mock::given(method("POST"))
        .and(path("/revoke"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&env.idp)
        .await;

    let result = env
        .sso
        .logout(provider_id, LogoutTarget::User(DID.to_string()))
        .await
        .into_result()?;
    assert_eq!(result.sessions_removed, 2);
    assert_eq!(result.tokens_revoked, 0);
    assert_eq!(result.revocation_failures, 4);
    assert!(env.sso.get_sessions(DID).await.into_result()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_logout_of_unknown_session_is_not_found() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;

    let result = env
        .sso
        .logout(provider_id, LogoutTarget::Session("no-such-session".into()))
        .await;
    assert_eq!(result.error_code(), Some("NOT_FOUND"));

    Ok(())
}

#[tokio::test]
async fn test_refresh_keeps_unrotated_refresh_token() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    let session = env.oidc_login(provider_id, DID, tokens()).await?.session;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-C",
            "token_type": "Bearer",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&env.idp)
        .await;

    let refreshed = env.sso.refresh_token(&session.id).await.into_result()?;
    assert_eq!(refreshed.state, SessionState::Active);
    assert!(refreshed.expires_at > session.expires_at);

    let stored = env
        .sso
        .sessions()
        .get_session(&session.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("session missing"))?;
    assert_eq!(stored.tokens.access_token, "access-C");
    assert_eq!(stored.tokens.refresh_token.as_deref(), Some("refresh-B"));
    assert!(stored.tokens.id_token.is_some());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_rotation() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    let session = env.oidc_login(provider_id, DID, tokens()).await?.session;

    // The provider rotates refresh-B once and refuses any reuse of it.
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=refresh-B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-C",
            "refresh_token": "refresh-C",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .up_to_n_times(1)
        .mount(&env.idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token already used"
        })))
        .mount(&env.idp)
        .await;

    let (first, second) = tokio::join!(
        env.sso.refresh_token(&session.id),
        env.sso.refresh_token(&session.id)
    );
    assert!(first.success, "{:?}", first.error);
    assert!(second.success, "{:?}", second.error);

    let stored = env
        .sso
        .sessions()
        .get_session(&session.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("session missing"))?;
    assert_eq!(stored.session.state, SessionState::Active);
    assert_eq!(stored.tokens.access_token, "access-C");
    assert_eq!(stored.tokens.refresh_token.as_deref(), Some("refresh-C"));

    let refresh_calls = env
        .idp
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| {
            r.url.path() == "/token"
                && String::from_utf8_lossy(&r.body).contains("grant_type=refresh_token")
        })
        .count();
    assert_eq!(refresh_calls, 1);

    Ok(())
}

#[tokio::test]
async fn test_scheduled_refresh_refused_by_provider_expires_session() -> anyhow::Result<()> {
    use sso_core::SsoConfig;

    // A threshold longer than the token lifetime arms the timer at once.
    let config = SsoConfig {
        refresh_threshold_secs: 7200,
        ..SsoConfig::for_testing()
    };
    let env = TestEnv::with_config(config).await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    let mut events = env.sso.subscribe_events();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&env.idp)
        .await;
    let session = env.oidc_login(provider_id, DID, tokens()).await?.session;

    let expired = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if event.event_type == EventType::RefreshTokenError => break event,
                Ok(_) => {}
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await?;
    assert_eq!(expired.error.as_deref(), Some("PROVIDER_ERROR"));

    let info = env.sso.get_session_info(&session.id).await.into_result()?;
    assert_eq!(info.state, SessionState::Expired);

    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_expires_the_session() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    let session = env.oidc_login(provider_id, DID, tokens()).await?.session;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .mount(&env.idp)
        .await;

    let result = env.sso.refresh_token(&session.id).await;
    assert_eq!(result.error_code(), Some("PROVIDER_ERROR"));

    let info = env.sso.get_session_info(&session.id).await.into_result()?;
    assert_eq!(info.state, SessionState::Expired);

    Ok(())
}

#[tokio::test]
async fn test_refresh_requires_a_refresh_token() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    let session = env
        .oidc_login(provider_id, DID, json!({ "access_token": "at", "expires_in": 3600 }))
        .await?
        .session;

    let result = env.sso.refresh_token(&session.id).await;
    assert_eq!(result.error_code(), Some("UNSUPPORTED_OPERATION"));
    let info = env.sso.get_session_info(&session.id).await.into_result()?;
    assert_eq!(info.state, SessionState::Active);

    Ok(())
}

#[tokio::test]
async fn test_userinfo_and_id_token_for_a_session() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123", "name": "Alice" })).await;
    let session = env.oidc_login(provider_id, DID, tokens()).await?.session;

    let info = env.sso.get_userinfo(&session.id).await.into_result()?;
    assert_eq!(info["name"], "Alice");

    let validation = env.sso.validate_id_token(&session.id).await.into_result()?;
    assert!(validation.valid, "{:?}", validation.errors);
    assert!(!validation.signature_verified);
    assert_eq!(validation.algorithm, "RS256");
    assert_eq!(validation.claims.sub.as_deref(), Some("user-123"));

    Ok(())
}

#[tokio::test]
async fn test_id_token_with_far_future_expiry_is_valid() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;
    let session = env.oidc_login(provider_id, DID, tokens()).await?.session;

    let id_token = unsigned_jwt(&json!({
        "iss": env.issuer(),
        "aud": CLIENT_ID,
        "sub": "user-123",
        "iat": chrono::Utc::now().timestamp(),
        "exp": i64::MAX
    }));
    env.sso
        .sessions()
        .update_tokens(
            &session.id,
            &TokenBundle {
                id_token: Some(id_token),
                ..TokenBundle::bearer("access-B")
            },
        )
        .await?;

    let validation = env.sso.validate_id_token(&session.id).await.into_result()?;
    assert!(validation.valid, "{:?}", validation.errors);
    assert_eq!(validation.claims.exp, Some(i64::MAX));

    Ok(())
}
