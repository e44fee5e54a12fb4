//! DID to SSO-subject identity bridge.
//!
//! ## Link invariants
//!
//! - A (DID, provider) pair holds at most one non-revoked mapping.
//! - A (provider, subject) pair holds at most one non-revoked mapping across
//!   all DIDs.
//! - A DID holds at most `max_links_per_did` non-revoked mappings.
//!
//! Every check-then-write runs under a single link lock, so two concurrent
//! links cannot both pass the conflict checks.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use sso_core::{Event, EventSink, EventType};
use sso_model::{IdentityAttributes, IdentityMapping, MappingStats, MappingStatus};
use sso_storage::IdentityMappingStore;

use crate::error::{FederationError, FederationResult};

/// Default cap on non-revoked mappings per DID.
pub const DEFAULT_MAX_LINKS_PER_DID: usize = 10;

/// Links local DIDs to subjects at SSO providers.
pub struct IdentityBridge {
    store: Arc<dyn IdentityMappingStore>,
    events: Arc<dyn EventSink>,
    max_links_per_did: usize,
    link_lock: Mutex<()>,
}

impl std::fmt::Debug for IdentityBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityBridge")
            .field("max_links_per_did", &self.max_links_per_did)
            .finish_non_exhaustive()
    }
}

impl IdentityBridge {
    /// Creates a bridge over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityMappingStore>,
        events: Arc<dyn EventSink>,
        max_links_per_did: usize,
    ) -> Self {
        Self {
            store,
            events,
            max_links_per_did: max_links_per_did.max(1),
            link_lock: Mutex::new(()),
        }
    }

    /// Links `did` to `sso_subject` at `provider_id`.
    ///
    /// A revoked or suspended mapping of the same triple is reactivated to
    /// pending with the new attributes instead of inserting a new row.
    pub async fn link_identity(
        &self,
        did: &str,
        provider_id: &str,
        sso_subject: &str,
        attributes: IdentityAttributes,
    ) -> FederationResult<IdentityMapping> {
        require("did", did)?;
        require("provider_id", provider_id)?;
        require("sso_subject", sso_subject)?;

        let _guard = self.link_lock.lock().await;

        let owned = self.store.list_by_did(did).await?;
        let existing = owned
            .iter()
            .find(|m| m.provider_id == provider_id && m.sso_subject == sso_subject)
            .cloned();

        if let Some(mapping) = &existing {
            if mapping.is_active() {
                return Err(FederationError::AlreadyLinked {
                    did: did.to_string(),
                    provider_id: provider_id.to_string(),
                });
            }
        }
        let existing_id = existing.as_ref().map(|m| m.id);

        // Conflicts ignore the row being reactivated.
        if owned.iter().any(|m| {
            Some(m.id) != existing_id
                && m.provider_id == provider_id
                && m.status != MappingStatus::Revoked
        }) {
            return Err(FederationError::ProviderAlreadyLinked {
                did: did.to_string(),
                provider_id: provider_id.to_string(),
            });
        }

        if let Some(holder) = self
            .store
            .list_by_subject(provider_id, sso_subject)
            .await?
            .into_iter()
            .find(|m| m.did != did && m.status != MappingStatus::Revoked)
        {
            return Err(FederationError::SubjectAlreadyLinked {
                existing_did: holder.did,
            });
        }

        let counted = owned
            .iter()
            .filter(|m| Some(m.id) != existing_id && m.status != MappingStatus::Revoked)
            .count();
        if counted >= self.max_links_per_did {
            return Err(FederationError::MaxLinksReached {
                did: did.to_string(),
                max: self.max_links_per_did,
            });
        }

        let mapping = match existing {
            Some(mut mapping) => {
                let previous = mapping.status;
                mapping.attributes = attributes;
                mapping.verified_at = None;
                mapping.set_status(MappingStatus::Pending);
                self.store.update(&mapping).await?;
                info!(
                    mapping_id = %mapping.id,
                    did,
                    provider_id,
                    previous = %previous,
                    "identity link reactivated"
                );
                mapping
            }
            None => {
                let mapping = IdentityMapping::new(did, provider_id, sso_subject, attributes);
                self.store.insert(&mapping).await?;
                info!(mapping_id = %mapping.id, did, provider_id, "identity linked");
                mapping
            }
        };

        self.emit(EventType::IdentityLinked, &mapping);
        Ok(mapping)
    }

    /// Revokes the mapping of `did` at `provider_id`. History is kept.
    pub async fn unlink_identity(&self, did: &str, provider_id: &str) -> FederationResult<IdentityMapping> {
        let _guard = self.link_lock.lock().await;

        let mut mapping = self
            .store
            .list_by_did(did)
            .await?
            .into_iter()
            .find(|m| m.provider_id == provider_id && m.status != MappingStatus::Revoked)
            .ok_or_else(|| FederationError::LinkNotFound {
                did: did.to_string(),
                provider_id: provider_id.to_string(),
            })?;

        mapping.set_status(MappingStatus::Revoked);
        self.store.update(&mapping).await?;
        info!(mapping_id = %mapping.id, did, provider_id, "identity unlinked");
        self.emit(EventType::IdentityUnlinked, &mapping);
        Ok(mapping)
    }

    /// Lists the mappings of a DID, oldest first.
    pub async fn get_linked_identities(
        &self,
        did: &str,
        include_revoked: bool,
    ) -> FederationResult<Vec<IdentityMapping>> {
        let mut mappings = self.store.list_by_did(did).await?;
        if !include_revoked {
            mappings.retain(|m| m.status != MappingStatus::Revoked);
        }
        Ok(mappings)
    }

    /// Moves a pending mapping to verified. Verifying a verified mapping is
    /// a no-op.
    pub async fn verify_link(&self, mapping_id: Uuid) -> FederationResult<IdentityMapping> {
        let _guard = self.link_lock.lock().await;
        let mut mapping = self.require_mapping(mapping_id).await?;

        match mapping.status {
            MappingStatus::Verified => return Ok(mapping),
            MappingStatus::Pending => {}
            MappingStatus::Revoked | MappingStatus::Suspended => {
                return Err(FederationError::InvalidState(format!(
                    "cannot verify a {} mapping",
                    mapping.status
                )));
            }
        }

        mapping.set_status(MappingStatus::Verified);
        self.store.update(&mapping).await?;
        debug!(mapping_id = %mapping.id, did = %mapping.did, "identity link verified");
        self.emit(EventType::IdentityVerified, &mapping);
        Ok(mapping)
    }

    /// Suspends a pending or verified mapping.
    pub async fn suspend_link(&self, mapping_id: Uuid) -> FederationResult<IdentityMapping> {
        let _guard = self.link_lock.lock().await;
        let mut mapping = self.require_mapping(mapping_id).await?;

        match mapping.status {
            MappingStatus::Suspended => return Ok(mapping),
            MappingStatus::Pending | MappingStatus::Verified => {}
            MappingStatus::Revoked => {
                return Err(FederationError::InvalidState(
                    "cannot suspend a revoked mapping".to_string(),
                ));
            }
        }

        mapping.set_status(MappingStatus::Suspended);
        self.store.update(&mapping).await?;
        info!(mapping_id = %mapping.id, did = %mapping.did, "identity link suspended");
        self.emit(EventType::IdentitySuspended, &mapping);
        Ok(mapping)
    }

    /// Reverse lookup: the DID holding `sso_subject` at `provider_id`.
    ///
    /// Verified beats pending beats suspended; revoked never matches.
    pub async fn find_did_by_sso_subject(
        &self,
        provider_id: &str,
        sso_subject: &str,
    ) -> FederationResult<Option<String>> {
        Ok(self
            .store
            .list_by_subject(provider_id, sso_subject)
            .await?
            .into_iter()
            .filter_map(|m| m.status.lookup_rank().map(|rank| (rank, m)))
            .min_by_key(|(rank, m)| (*rank, m.created_at))
            .map(|(_, m)| m.did))
    }

    /// Gets a mapping by id.
    pub async fn get_mapping(&self, mapping_id: Uuid) -> FederationResult<Option<IdentityMapping>> {
        Ok(self.store.get(mapping_id).await?)
    }

    /// Returns whether `did` has a pending or verified link at `provider_id`.
    pub async fn is_linked(&self, did: &str, provider_id: &str) -> FederationResult<bool> {
        Ok(self
            .store
            .list_by_did(did)
            .await?
            .iter()
            .any(|m| m.provider_id == provider_id && m.is_active()))
    }

    /// Aggregates statistics over all mappings.
    pub async fn get_mapping_stats(&self) -> FederationResult<MappingStats> {
        let since = Utc::now() - Duration::hours(24);
        let mut stats = MappingStats::default();
        let mut dids = HashSet::new();

        for mapping in self.store.list_all().await? {
            stats.total += 1;
            *stats.by_status.entry(mapping.status).or_default() += 1;
            match mapping.status {
                MappingStatus::Verified => stats.verified += 1,
                MappingStatus::Pending => stats.pending += 1,
                MappingStatus::Suspended | MappingStatus::Revoked => {}
            }
            if mapping.status != MappingStatus::Revoked {
                *stats.by_provider.entry(mapping.provider_id.clone()).or_default() += 1;
            }
            if mapping.is_active() {
                dids.insert(mapping.did.clone());
            }
            if mapping.created_at >= since {
                stats.created_last_24h += 1;
            }
        }

        stats.unique_dids = dids.len();
        Ok(stats)
    }

    async fn require_mapping(&self, mapping_id: Uuid) -> FederationResult<IdentityMapping> {
        self.store
            .get(mapping_id)
            .await?
            .ok_or(FederationError::MappingNotFound(mapping_id))
    }

    fn emit(&self, event_type: EventType, mapping: &IdentityMapping) {
        self.events.emit(
            Event::builder(event_type)
                .provider(mapping.provider_id.clone())
                .did(mapping.did.clone())
                .detail("mapping_id", mapping.id.to_string())
                .detail("status", mapping.status.as_str())
                .build(),
        );
    }
}

fn require(field: &str, value: &str) -> FederationResult<()> {
    if value.trim().is_empty() {
        return Err(FederationError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}
