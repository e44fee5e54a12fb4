//! # sso-federation
//!
//! Links local decentralized identifiers (DIDs) to subjects at external SSO
//! providers.
//!
//! The [`IdentityBridge`] enforces one live link per (DID, provider) and per
//! (provider, subject), caps links per DID, and drives the
//! pending → verified → suspended / revoked state machine. Mappings are
//! never deleted; unlinking revokes them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bridge;
pub mod error;

pub use bridge::{IdentityBridge, DEFAULT_MAX_LINKS_PER_DID};
pub use error::{FederationError, FederationResult};
