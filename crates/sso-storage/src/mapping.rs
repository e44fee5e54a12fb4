//! Identity mapping storage trait.

use async_trait::async_trait;
use sso_model::IdentityMapping;
use uuid::Uuid;

use crate::error::StorageResult;

/// Storage for identity mappings.
///
/// There is no delete: mappings are revoked, never removed.
#[async_trait]
pub trait IdentityMappingStore: Send + Sync {
    /// Inserts a new mapping.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the id already exists.
    async fn insert(&self, mapping: &IdentityMapping) -> StorageResult<()>;

    /// Replaces an existing mapping.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the mapping doesn't exist.
    async fn update(&self, mapping: &IdentityMapping) -> StorageResult<()>;

    /// Gets a mapping by ID.
    async fn get(&self, id: Uuid) -> StorageResult<Option<IdentityMapping>>;

    /// Lists every mapping of a DID, any status, oldest first.
    async fn list_by_did(&self, did: &str) -> StorageResult<Vec<IdentityMapping>>;

    /// Lists every mapping of a (provider, subject) pair, any status.
    async fn list_by_subject(
        &self,
        provider_id: &str,
        sso_subject: &str,
    ) -> StorageResult<Vec<IdentityMapping>>;

    /// Lists every mapping.
    async fn list_all(&self) -> StorageResult<Vec<IdentityMapping>>;
}
