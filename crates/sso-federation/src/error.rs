//! Federation error types.
//!
//! Conflict variants carry the identifiers a caller needs to resolve the
//! conflict, such as the DID already holding a subject.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during identity linking.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The exact (DID, provider, subject) link is already active.
    #[error("Identity already linked: {did} at provider {provider_id}")]
    AlreadyLinked {
        /// DID.
        did: String,
        /// Provider ID.
        provider_id: String,
    },

    /// The DID already holds another subject at this provider.
    #[error("DID {did} is already linked to provider {provider_id}")]
    ProviderAlreadyLinked {
        /// DID.
        did: String,
        /// Provider ID.
        provider_id: String,
    },

    /// The subject is already linked to another DID.
    #[error("Subject is already linked to {existing_did}")]
    SubjectAlreadyLinked {
        /// DID currently holding the subject.
        existing_did: String,
    },

    /// The DID holds the maximum number of links.
    #[error("DID {did} has reached the maximum of {max} linked identities")]
    MaxLinksReached {
        /// DID.
        did: String,
        /// Configured cap.
        max: usize,
    },

    /// No mapping for the DID at the provider.
    #[error("No linked identity for {did} at provider {provider_id}")]
    LinkNotFound {
        /// DID.
        did: String,
        /// Provider ID.
        provider_id: String,
    },

    /// Unknown mapping id.
    #[error("Mapping not found: {0}")]
    MappingNotFound(Uuid),

    /// The mapping's status does not allow the transition.
    #[error("Invalid mapping state: {0}")]
    InvalidState(String),

    /// Storage error when persisting mappings.
    #[error("Storage error: {0}")]
    Storage(#[from] sso_storage::StorageError),
}

impl FederationError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Checks if this is a link conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyLinked { .. }
                | Self::ProviderAlreadyLinked { .. }
                | Self::SubjectAlreadyLinked { .. }
                | Self::MaxLinksReached { .. }
        )
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::LinkNotFound { .. } | Self::MappingNotFound(_))
    }

    /// Returns a stable, machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::AlreadyLinked { .. } => "ALREADY_LINKED",
            Self::ProviderAlreadyLinked { .. } => "PROVIDER_ALREADY_LINKED",
            Self::SubjectAlreadyLinked { .. } => "SUBJECT_ALREADY_LINKED",
            Self::MaxLinksReached { .. } => "MAX_LINKS_REACHED",
            Self::LinkNotFound { .. } | Self::MappingNotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
