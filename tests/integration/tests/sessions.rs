//! Session lifecycle integration tests.

use std::time::Duration;

use serde_json::json;
use sso_model::TokenBundle;
use sso_server::LoginOptions;
use sso_session::SessionContext;

use crate::common::TestEnv;

const DID: &str = "did:example:carol";

fn bearer(access_token: &str) -> TokenBundle {
    TokenBundle {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        expires_in: Some(3600),
        ..TokenBundle::default()
    }
}

/// The eleventh session for a (DID, provider) pair evicts the
/// oldest one.
#[tokio::test]
async fn test_session_cap_evicts_oldest() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    assert_eq!(env.sso.config().max_sessions_per_user, 10);
    let provider_id = env.add_oidc_provider().await?.to_string();

    let mut created = Vec::new();
    for i in 0..11 {
        let session = env
            .sso
            .sessions()
            .create_session(
                Some(DID),
                &provider_id,
                &bearer(&format!("at-{i}")),
                SessionContext::default(),
            )
            .await?;
        created.push(session.session_id);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let remaining = env.sso.get_sessions(DID).await.into_result()?;
    assert_eq!(remaining.len(), 10);
    assert!(remaining.iter().all(|s| s.id != created[0]));
    assert!(remaining.iter().any(|s| s.id == created[10]));

    // Another provider has its own cap.
    let other = env.add_oidc_provider().await?.to_string();
    env.sso
        .sessions()
        .create_session(Some(DID), &other, &bearer("at-other"), SessionContext::default())
        .await?;
    assert_eq!(env.sso.get_sessions(DID).await.into_result()?.len(), 11);

    Ok(())
}

#[tokio::test]
async fn test_session_expires_after_token_lifetime() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;

    let session = env
        .oidc_login(
            provider_id,
            DID,
            json!({ "access_token": "short-lived", "token_type": "Bearer", "expires_in": 1 }),
        )
        .await?
        .session;
    assert!(!session.is_expired);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let info = env.sso.get_session_info(&session.id).await.into_result()?;
    assert!(info.is_expired);
    assert_eq!(info.remaining_seconds, 0);
    assert!(env.sso.get_sessions(DID).await.into_result()?.is_empty());

    let cleaned = env.sso.clean_expired_sessions().await.into_result()?;
    assert_eq!(cleaned.removed, 1);
    assert_eq!(
        env.sso.get_session_info(&session.id).await.error_code(),
        Some("NOT_FOUND")
    );

    Ok(())
}

#[tokio::test]
async fn test_session_count_groups_by_provider() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let first = env.add_oidc_provider().await?.to_string();
    let second = env.add_oidc_provider().await?.to_string();

    for provider in [&first, &first, &second] {
        env.sso
            .sessions()
            .create_session(Some(DID), provider, &bearer("at"), SessionContext::default())
            .await?;
    }

    let count = env.sso.get_session_count().await.into_result()?;
    assert_eq!(count.total, 3);
    assert_eq!(count.active, 3);
    assert_eq!(count.by_provider.get(&first), Some(&2));
    assert_eq!(count.by_provider.get(&second), Some(&1));

    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_timers_and_pending_logins() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    env.mount_userinfo(json!({ "sub": "user-123" })).await;

    env.oidc_login(
        provider_id,
        DID,
        json!({
            "access_token": "at",
            "refresh_token": "rt",
            "token_type": "Bearer",
            "expires_in": 3600
        }),
    )
    .await?;
    env.sso
        .initiate_login(provider_id, LoginOptions::default())
        .await
        .into_result()?;

    assert_eq!(env.sso.sessions().scheduler().len(), 1);
    assert_eq!(env.sso.pending_logins(), 1);

    env.sso.shutdown();

    assert!(env.sso.sessions().scheduler().is_empty());
    assert_eq!(env.sso.pending_logins(), 0);

    Ok(())
}
