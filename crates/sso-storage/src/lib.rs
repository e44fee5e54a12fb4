//! # sso-storage
//!
//! Storage abstraction traits for the SSO core.
//!
//! The relational store itself lives outside this workspace; these traits
//! describe the key/row interface it must offer. In-memory implementations
//! are provided for development and tests.
//!
//! ## Provider Traits
//!
//! - [`ProviderConfigStore`] - provider configurations
//! - [`SessionStore`] - encrypted SSO sessions
//! - [`IdentityMappingStore`] - DID to provider-subject mappings

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod mapping;
pub mod memory;
pub mod provider;
pub mod session;

pub use error::{StorageError, StorageResult};
pub use mapping::IdentityMappingStore;
pub use memory::{InMemoryIdentityMappingStore, InMemoryProviderConfigStore, InMemorySessionStore};
pub use provider::{ProviderConfigStore, ProviderSearchCriteria};
pub use session::SessionStore;
