//! Identity bridge integration tests.

use sso_core::{EventType, SsoConfig};
use sso_model::{IdentityAttributes, MappingStatus};

use crate::common::TestEnv;

const DID_A: &str = "did:example:alice";
const DID_B: &str = "did:example:bob";

fn attributes(email: &str) -> IdentityAttributes {
    IdentityAttributes {
        email: Some(email.to_string()),
        ..IdentityAttributes::default()
    }
}

#[tokio::test]
async fn test_subject_conflict_reports_existing_did() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;

    env.sso
        .link_identity(DID_A, provider_id, "subject-1", attributes("a@example.com"))
        .await
        .into_result()?;

    let conflict = env
        .sso
        .link_identity(DID_B, provider_id, "subject-1", attributes("b@example.com"))
        .await;
    assert_eq!(conflict.error_code(), Some("SUBJECT_ALREADY_LINKED"));
    let details = conflict.error.and_then(|e| e.details).unwrap_or_default();
    assert_eq!(details["existingDid"], DID_A);

    assert_eq!(
        env.sso
            .find_did_by_subject(provider_id, "subject-1")
            .await
            .into_result()?
            .as_deref(),
        Some(DID_A)
    );

    Ok(())
}

#[tokio::test]
async fn test_relinking_reactivates_to_pending() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;

    let linked = env
        .sso
        .link_identity(DID_A, provider_id, "subject-1", attributes("a@example.com"))
        .await
        .into_result()?;
    let verified = env.sso.verify_link(linked.id).await.into_result()?;
    assert_eq!(verified.status, MappingStatus::Verified);
    assert!(verified.verified_at.is_some());

    let revoked = env
        .sso
        .unlink_identity(DID_A, provider_id)
        .await
        .into_result()?;
    assert_eq!(revoked.status, MappingStatus::Revoked);
    assert!(env
        .sso
        .find_did_by_subject(provider_id, "subject-1")
        .await
        .into_result()?
        .is_none());

    let relinked = env
        .sso
        .link_identity(DID_A, provider_id, "subject-1", attributes("new@example.com"))
        .await
        .into_result()?;
    assert_eq!(relinked.id, linked.id);
    assert_eq!(relinked.status, MappingStatus::Pending);
    assert_eq!(relinked.attributes.email.as_deref(), Some("new@example.com"));

    let all = env
        .sso
        .get_linked_identities(DID_A, true)
        .await
        .into_result()?;
    assert_eq!(all.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_suspend_is_counted_and_audited() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let provider_id = env.add_oidc_provider().await?;
    let mut events = env.sso.subscribe_events();

    let linked = env
        .sso
        .link_identity(DID_A, provider_id, "subject-1", attributes("a@example.com"))
        .await
        .into_result()?;
    let suspended = env.sso.suspend_link(linked.id).await.into_result()?;
    assert_eq!(suspended.status, MappingStatus::Suspended);

    let stats = env.sso.get_mapping_stats().await.into_result()?;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_status.get(&MappingStatus::Suspended), Some(&1));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert_eq!(seen, [EventType::IdentityLinked, EventType::IdentitySuspended]);

    Ok(())
}

#[tokio::test]
async fn test_link_limit_per_did() -> anyhow::Result<()> {
    let config = SsoConfig {
        max_links_per_did: 2,
        ..SsoConfig::for_testing()
    };
    let env = TestEnv::with_config(config).await?;

    for subject in ["s-1", "s-2"] {
        let provider_id = env.add_oidc_provider().await?;
        env.sso
            .link_identity(DID_A, provider_id, subject, IdentityAttributes::default())
            .await
            .into_result()?;
    }

    let third = env.add_oidc_provider().await?;
    let result = env
        .sso
        .link_identity(DID_A, third, "s-3", IdentityAttributes::default())
        .await;
    assert_eq!(result.error_code(), Some("MAX_LINKS_REACHED"));

    Ok(())
}
