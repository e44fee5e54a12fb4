//! In-memory stores for development and testing.
//!
//! State lives only as long as the process; a multi-instance deployment
//! needs a shared backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sso_model::{IdentityMapping, ProviderConfiguration, Session, SessionState};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::mapping::IdentityMappingStore;
use crate::provider::{ProviderConfigStore, ProviderSearchCriteria};
use crate::session::SessionStore;

// ============================================================================
// Providers
// ============================================================================

/// In-memory provider configuration store.
#[derive(Debug, Default)]
pub struct InMemoryProviderConfigStore {
    providers: RwLock<HashMap<Uuid, ProviderConfiguration>>,
}

impl InMemoryProviderConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProviderConfigStore for InMemoryProviderConfigStore {
    async fn create(&self, provider: &ProviderConfiguration) -> StorageResult<()> {
        let mut providers = self.providers.write().await;
        if providers.contains_key(&provider.id) {
            return Err(StorageError::duplicate("Provider", "id", provider.id.to_string()));
        }
        providers.insert(provider.id, provider.clone());
        Ok(())
    }

    async fn update(&self, provider: &ProviderConfiguration) -> StorageResult<()> {
        let mut providers = self.providers.write().await;
        match providers.get_mut(&provider.id) {
            Some(existing) => {
                *existing = provider.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("Provider", provider.id.to_string())),
        }
    }

    async fn delete(&self, id: Uuid) -> StorageResult<bool> {
        Ok(self.providers.write().await.remove(&id).is_some())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<ProviderConfiguration>> {
        Ok(self.providers.read().await.get(&id).cloned())
    }

    async fn list(&self, criteria: &ProviderSearchCriteria) -> StorageResult<Vec<ProviderConfiguration>> {
        let mut providers: Vec<_> = self
            .providers
            .read()
            .await
            .values()
            .filter(|p| criteria.matches(p))
            .cloned()
            .collect();
        providers.sort_by_key(|p| p.created_at);
        Ok(providers)
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// In-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect(&self, filter: impl Fn(&Session) -> bool + Send) -> Vec<Session> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| filter(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    async fn remove_where(&self, filter: impl Fn(&Session) -> bool + Send) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let ids: Vec<String> = sessions
            .values()
            .filter(|s| filter(s))
            .map(|s| s.id.clone())
            .collect();
        for id in &ids {
            sessions.remove(id);
        }
        ids
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &Session) -> StorageResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StorageError::duplicate("Session", "id", session.id.clone()));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &Session) -> StorageResult<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("Session", session.id.clone())),
        }
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn set_state(&self, id: &str, state: SessionState) -> StorageResult<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(id).map_or(false, |s| {
            s.state = state;
            s.updated_at = Utc::now();
            true
        }))
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> StorageResult<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(id).map_or(false, |s| {
            s.last_activity_at = at;
            true
        }))
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn list_by_user(&self, user_did: &str) -> StorageResult<Vec<Session>> {
        Ok(self
            .collect(|s| s.user_did.as_deref() == Some(user_did))
            .await)
    }

    async fn list_by_user_and_provider(
        &self,
        user_did: &str,
        provider_id: &str,
    ) -> StorageResult<Vec<Session>> {
        Ok(self
            .collect(|s| s.user_did.as_deref() == Some(user_did) && s.provider_id == provider_id)
            .await)
    }

    async fn list_by_provider(&self, provider_id: &str) -> StorageResult<Vec<Session>> {
        Ok(self.collect(|s| s.provider_id == provider_id).await)
    }

    async fn list_all(&self) -> StorageResult<Vec<Session>> {
        Ok(self.collect(|_| true).await)
    }

    async fn delete_by_user(&self, user_did: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .remove_where(|s| s.user_did.as_deref() == Some(user_did))
            .await)
    }

    async fn delete_by_provider(&self, provider_id: &str) -> StorageResult<Vec<String>> {
        Ok(self.remove_where(|s| s.provider_id == provider_id).await)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<Vec<String>> {
        Ok(self
            .remove_where(|s| s.state == SessionState::Expired || s.is_expired_at(now))
            .await)
    }
}

// ============================================================================
// Identity mappings
// ============================================================================

/// In-memory identity mapping store.
#[derive(Debug, Default)]
pub struct InMemoryIdentityMappingStore {
    mappings: RwLock<HashMap<Uuid, IdentityMapping>>,
}

impl InMemoryIdentityMappingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityMappingStore for InMemoryIdentityMappingStore {
    async fn insert(&self, mapping: &IdentityMapping) -> StorageResult<()> {
        let mut mappings = self.mappings.write().await;
        if mappings.contains_key(&mapping.id) {
            return Err(StorageError::duplicate("IdentityMapping", "id", mapping.id.to_string()));
        }
        mappings.insert(mapping.id, mapping.clone());
        Ok(())
    }

    async fn update(&self, mapping: &IdentityMapping) -> StorageResult<()> {
        let mut mappings = self.mappings.write().await;
        match mappings.get_mut(&mapping.id) {
            Some(existing) => {
                *existing = mapping.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("IdentityMapping", mapping.id.to_string())),
        }
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<IdentityMapping>> {
        Ok(self.mappings.read().await.get(&id).cloned())
    }

    async fn list_by_did(&self, did: &str) -> StorageResult<Vec<IdentityMapping>> {
        let mut found: Vec<_> = self
            .mappings
            .read()
            .await
            .values()
            .filter(|m| m.did == did)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        Ok(found)
    }

    async fn list_by_subject(
        &self,
        provider_id: &str,
        sso_subject: &str,
    ) -> StorageResult<Vec<IdentityMapping>> {
        Ok(self
            .mappings
            .read()
            .await
            .values()
            .filter(|m| m.provider_id == provider_id && m.sso_subject == sso_subject)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> StorageResult<Vec<IdentityMapping>> {
        Ok(self.mappings.read().await.values().cloned().collect())
    }
}
