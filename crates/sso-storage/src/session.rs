//! Session storage trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sso_model::{Session, SessionState};

use crate::error::StorageResult;

/// Storage for SSO sessions.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a new session.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the id already exists.
    async fn insert(&self, session: &Session) -> StorageResult<()>;

    /// Replaces an existing session.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the session doesn't exist.
    async fn update(&self, session: &Session) -> StorageResult<()>;

    /// Gets a session by ID.
    async fn get(&self, id: &str) -> StorageResult<Option<Session>>;

    /// Sets the state of a session. Returns whether it existed.
    async fn set_state(&self, id: &str, state: SessionState) -> StorageResult<bool>;

    /// Updates `last_activity_at`. Returns whether the session existed.
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> StorageResult<bool>;

    /// Deletes a session. Returns whether it existed.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Lists sessions of a user across all providers.
    async fn list_by_user(&self, user_did: &str) -> StorageResult<Vec<Session>>;

    /// Lists sessions of a user at one provider, oldest first.
    async fn list_by_user_and_provider(
        &self,
        user_did: &str,
        provider_id: &str,
    ) -> StorageResult<Vec<Session>>;

    /// Lists sessions of a provider.
    async fn list_by_provider(&self, provider_id: &str) -> StorageResult<Vec<Session>>;

    /// Lists every session.
    async fn list_all(&self) -> StorageResult<Vec<Session>>;

    /// Deletes all sessions of a user. Returns the deleted ids.
    async fn delete_by_user(&self, user_did: &str) -> StorageResult<Vec<String>>;

    /// Deletes all sessions of a provider. Returns the deleted ids.
    async fn delete_by_provider(&self, provider_id: &str) -> StorageResult<Vec<String>>;

    /// Deletes sessions that expired before `now` or are marked expired.
    /// Returns the deleted ids.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<Vec<String>>;
}
