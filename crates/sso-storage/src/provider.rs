//! Provider configuration storage trait.

use async_trait::async_trait;
use sso_model::{ProviderConfiguration, ProviderType};
use uuid::Uuid;

use crate::error::StorageResult;

/// Storage for provider configurations.
///
/// Sensitive config values arrive here already encrypted; stores persist the
/// config map as-is.
#[async_trait]
pub trait ProviderConfigStore: Send + Sync {
    /// Creates a new provider.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the id already exists.
    async fn create(&self, provider: &ProviderConfiguration) -> StorageResult<()>;

    /// Replaces an existing provider.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the provider doesn't exist.
    async fn update(&self, provider: &ProviderConfiguration) -> StorageResult<()>;

    /// Deletes a provider. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> StorageResult<bool>;

    /// Gets a provider by ID.
    async fn get(&self, id: Uuid) -> StorageResult<Option<ProviderConfiguration>>;

    /// Lists providers matching the criteria, oldest first.
    async fn list(&self, criteria: &ProviderSearchCriteria) -> StorageResult<Vec<ProviderConfiguration>>;
}

/// Filters for [`ProviderConfigStore::list`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProviderSearchCriteria {
    /// Only this provider type.
    pub provider_type: Option<ProviderType>,
    /// Only enabled providers.
    pub enabled_only: bool,
}

impl ProviderSearchCriteria {
    /// Creates empty criteria.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            provider_type: None,
            enabled_only: false,
        }
    }

    /// Filters by provider type.
    #[must_use]
    pub const fn provider_type(mut self, provider_type: ProviderType) -> Self {
        self.provider_type = Some(provider_type);
        self
    }

    /// Only returns enabled providers.
    #[must_use]
    pub const fn enabled_only(mut self) -> Self {
        self.enabled_only = true;
        self
    }

    /// Returns whether a provider passes the filters.
    #[must_use]
    pub fn matches(&self, provider: &ProviderConfiguration) -> bool {
        self.provider_type.map_or(true, |t| t == provider.provider_type)
            && (!self.enabled_only || provider.enabled)
    }
}
