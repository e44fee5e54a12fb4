//! Provider configuration registry.
//!
//! Secrets are encrypted with the manager cipher before they reach the
//! store and stored as `enc:v1:<base64>`. Reads go through a cache of
//! decrypted configurations and built engines, invalidated on update and
//! delete. A load that overlaps an invalidation returns what it read but
//! leaves the cache empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use sso_core::{Event, EventSink, EventType};
use sso_crypto::TokenCipher;
use sso_model::provider::{missing_fields, SENSITIVE_FIELDS};
use sso_model::ProviderConfiguration;
use sso_protocol_oidc::HttpTransport;
use sso_protocol_saml::{SignatureVerifier, ValidationSettings};
use sso_storage::{ProviderConfigStore, ProviderSearchCriteria};

use crate::error::{CoordinatorError, CoordinatorResult};

use super::flow::ProviderEngine;
use super::types::{NewProvider, ProviderFilter, ProviderUpdate};

/// Prefix of encrypted config values.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Placeholder returned instead of secrets.
pub const REDACTED: &str = "********";

/// A decrypted provider and its engine.
#[derive(Debug, Clone)]
pub(crate) struct CachedProvider {
    pub provider: ProviderConfiguration,
    pub engine: ProviderEngine,
}

pub(crate) struct ProviderRegistry {
    store: Arc<dyn ProviderConfigStore>,
    cipher: TokenCipher,
    cache: DashMap<Uuid, Arc<CachedProvider>>,
    /// Bumped by every invalidation.
    epoch: AtomicU64,
    transport: HttpTransport,
    saml_settings: ValidationSettings,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("cached", &self.cache.len())
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    pub fn new(
        store: Arc<dyn ProviderConfigStore>,
        cipher: TokenCipher,
        transport: HttpTransport,
        saml_settings: ValidationSettings,
        verifier: Option<Arc<dyn SignatureVerifier>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            cipher,
            cache: DashMap::new(),
            epoch: AtomicU64::new(0),
            transport,
            saml_settings,
            verifier,
            events,
        }
    }

    pub const fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    pub async fn list(&self, filter: &ProviderFilter) -> CoordinatorResult<Vec<ProviderConfiguration>> {
        let criteria = ProviderSearchCriteria {
            provider_type: filter.provider_type,
            enabled_only: filter.enabled_only,
        };
        let providers = self.store.list(&criteria).await?;
        Ok(providers.into_iter().map(redact).collect())
    }

    pub async fn get(&self, id: Uuid) -> CoordinatorResult<ProviderConfiguration> {
        let provider = self
            .store
            .get(id)
            .await?
            .ok_or(CoordinatorError::ProviderNotFound(id))?;
        Ok(redact(provider))
    }

    pub async fn add(&self, input: NewProvider) -> CoordinatorResult<Uuid> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CoordinatorError::validation("provider name must not be empty"));
        }

        let mut provider = ProviderConfiguration::new(input.provider_type, name, input.config);
        provider.enabled = input.enabled;
        provider.metadata = input.metadata;
        self.check(&provider)?;

        self.encrypt_secrets(&mut provider.config)?;
        self.store.create(&provider).await?;

        info!(provider_id = %provider.id, provider_type = %provider.provider_type, "provider added");
        self.events.emit(
            Event::builder(EventType::ProviderCreated)
                .provider(provider.id.to_string())
                .detail("type", provider.provider_type.as_str())
                .build(),
        );
        Ok(provider.id)
    }

    pub async fn update(&self, id: Uuid, update: ProviderUpdate) -> CoordinatorResult<ProviderConfiguration> {
        let stored = self
            .store
            .get(id)
            .await?
            .ok_or(CoordinatorError::ProviderNotFound(id))?;

        let mut provider = self.decrypt(stored)?;
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(CoordinatorError::validation("provider name must not be empty"));
            }
            provider.name = name.to_string();
        }
        if let Some(mut patch) = update.config {
            // Echoed placeholders keep the stored secret.
            patch.retain(|key, value| {
                !(SENSITIVE_FIELDS.contains(&key.as_str()) && value.as_str() == Some(REDACTED))
            });
            provider.merge_config(patch);
        }
        if let Some(enabled) = update.enabled {
            provider.enabled = enabled;
        }
        if let Some(metadata) = update.metadata {
            provider.metadata = metadata;
        }
        provider.updated_at = Utc::now();
        self.check(&provider)?;

        self.encrypt_secrets(&mut provider.config)?;
        self.store.update(&provider).await?;
        self.invalidate(id);

        info!(provider_id = %id, "provider updated");
        self.events.emit(
            Event::builder(EventType::ProviderUpdated)
                .provider(id.to_string())
                .build(),
        );
        Ok(redact(provider))
    }

    /// Deletes the stored configuration. Session cascade is the caller's job.
    pub async fn delete(&self, id: Uuid) -> CoordinatorResult<()> {
        if !self.store.delete(id).await? {
            return Err(CoordinatorError::ProviderNotFound(id));
        }
        self.invalidate(id);
        info!(provider_id = %id, "provider deleted");
        self.events.emit(
            Event::builder(EventType::ProviderDeleted)
                .provider(id.to_string())
                .build(),
        );
        Ok(())
    }

    // ========================================================================
    // Cache
    // ========================================================================

    /// Returns the decrypted provider and its engine, loading it on a miss.
    pub async fn load(&self, id: Uuid) -> CoordinatorResult<Arc<CachedProvider>> {
        if let Some(cached) = self.cache.get(&id) {
            return Ok(Arc::clone(cached.value()));
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let stored = self
            .store
            .get(id)
            .await?
            .ok_or(CoordinatorError::ProviderNotFound(id))?;
        let provider = self.decrypt(stored)?;
        let engine = ProviderEngine::build(
            &provider,
            &self.transport,
            self.saml_settings,
            self.verifier.as_ref(),
        )?;
        let cached = Arc::new(CachedProvider { provider, engine });

        // The shard lock held by the entry orders this check against
        // `invalidate`, which bumps the epoch before removing.
        match self.cache.entry(id) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                if self.epoch.load(Ordering::Acquire) == epoch {
                    slot.insert(Arc::clone(&cached));
                    debug!(provider_id = %id, "provider cached");
                } else {
                    debug!(provider_id = %id, "provider changed during load, not cached");
                }
                Ok(cached)
            }
        }
    }

    /// Like [`Self::load`], keyed by the string id stored on sessions.
    pub async fn load_str(&self, id: &str) -> CoordinatorResult<Arc<CachedProvider>> {
        let uuid = Uuid::parse_str(id)
            .map_err(|_| CoordinatorError::NotFound(format!("provider {id}")))?;
        self.load(uuid).await
    }

    pub fn invalidate(&self, id: Uuid) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.remove(&id);
    }

    pub fn clear_cache(&self) -> usize {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let count = self.cache.len();
        self.cache.clear();
        count
    }

    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    // ========================================================================
    // Validation and secrets
    // ========================================================================

    /// Checks required fields and that the protocol config parses.
    fn check(&self, provider: &ProviderConfiguration) -> CoordinatorResult<()> {
        let missing = missing_fields(provider.provider_type, &provider.config);
        if !missing.is_empty() {
            return Err(CoordinatorError::validation(format!(
                "missing required fields for {}: {}",
                provider.provider_type,
                missing.join(", ")
            )));
        }
        ProviderEngine::build(provider, &self.transport, self.saml_settings, None).map_err(|e| {
            CoordinatorError::validation(format!("invalid {} configuration: {e}", provider.provider_type))
        })?;
        Ok(())
    }

    /// Seals every non-empty secret. Callers pass plaintext only: `update`
    /// decrypts the stored values before merging, so a value that happens
    /// to start with [`ENCRYPTED_PREFIX`] is still caller data.
    fn encrypt_secrets(&self, config: &mut Map<String, Value>) -> CoordinatorResult<()> {
        for field in SENSITIVE_FIELDS {
            if let Some(Value::String(value)) = config.get_mut(*field) {
                if !value.is_empty() {
                    *value = format!("{ENCRYPTED_PREFIX}{}", self.cipher.encrypt(value)?);
                }
            }
        }
        Ok(())
    }

    fn decrypt(&self, mut provider: ProviderConfiguration) -> CoordinatorResult<ProviderConfiguration> {
        for field in SENSITIVE_FIELDS {
            if let Some(Value::String(value)) = provider.config.get_mut(*field) {
                if let Some(sealed) = value.strip_prefix(ENCRYPTED_PREFIX) {
                    *value = self.cipher.decrypt(sealed)?;
                }
            }
        }
        Ok(provider)
    }
}

/// Replaces secret values with [`REDACTED`].
fn redact(mut provider: ProviderConfiguration) -> ProviderConfiguration {
    for field in SENSITIVE_FIELDS {
        if let Some(value) = provider.config.get_mut(*field) {
            if value.as_str().is_some_and(|s| !s.is_empty()) {
                *value = Value::String(REDACTED.to_string());
            }
        }
    }
    provider
}
