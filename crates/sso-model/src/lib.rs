//! # sso-model
//!
//! Domain models for the SSO core.
//!
//! - [`provider`] - identity provider configuration
//! - [`session`] - authenticated sessions and their token bundles
//! - [`mapping`] - DID to provider-subject identity mappings

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod mapping;
pub mod provider;
pub mod session;

pub use mapping::{IdentityAttributes, IdentityMapping, MappingStats, MappingStatus};
pub use provider::{ProviderConfiguration, ProviderType};
pub use session::{Session, SessionCount, SessionInfo, SessionState, TokenBundle};
