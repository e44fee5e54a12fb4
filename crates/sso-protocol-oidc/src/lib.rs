//! # sso-protocol-oidc
//!
//! `OpenID` Connect / OAuth 2.0 relying-party engine.
//!
//! This crate talks to one configured provider at a time:
//! - Authorization URL construction with PKCE (S256)
//! - Code exchange and refresh
//! - `UserInfo` retrieval
//! - ID token claim validation (signatures are checked elsewhere)
//! - Token revocation (RFC 7009)
//! - Provider discovery
//!
//! ## Modules
//!
//! - [`claims`] - ID token claim types
//! - [`client`] - the per-provider client
//! - [`config`] - typed provider settings
//! - [`discovery`] - `OpenID` Provider Metadata client
//! - [`error`] - OIDC client error types
//! - [`http`] - bounded HTTP transport
//! - [`id_token`] - claim validation
//! - [`types`] - grant types, prompts and token hints

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod claims;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod id_token;
pub mod types;

// Re-export commonly used types
pub use claims::{Audience, IdTokenClaims};
pub use client::{AuthorizationOptions, OidcClient, RevocationOutcome};
pub use config::OidcClientConfig;
pub use discovery::ProviderMetadata;
pub use error::{ErrorResponse, OidcError, OidcResult};
pub use http::{HttpConfig, HttpResponse, HttpTransport};
pub use id_token::{IdTokenValidation, IdTokenValidationOptions, IdTokenViolation};
pub use types::{GrantType, Prompt, TokenTypeHint};
