//! SAML 2.0 service-provider engine.
//!
//! Covers the SP side of Web Browser SSO against a single identity provider:
//!
//! - **AuthnRequest generation** with the HTTP-Redirect binding
//! - **Response parsing** through a structural (quick-xml) or regex parser,
//!   chosen once per engine by capability probing
//! - **Condition validation** with configurable clock skew and policy
//! - **Signature handling** through a pluggable [`SignatureVerifier`]
//! - **SP metadata** and **LogoutRequest** generation
//!
//! # Example
//!
//! ```rust,ignore
//! use sso_protocol_saml::{SamlConfig, SamlEngine, ValidationSettings};
//!
//! let engine = SamlEngine::new(SamlConfig::from_provider(&provider)?, ValidationSettings::default());
//! let request = engine.generate_authn_request(None, Some(&state), &Default::default())?;
//! // redirect the browser to request.redirect_url ...
//! let parsed = engine.parse_assertion(&form["SAMLResponse"])?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod assertion;
pub mod authn_request;
pub mod bindings;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod logout;
pub mod metadata;
pub mod parser;
pub mod signature;

pub use assertion::{Conditions, SamlAssertion, SignatureStatus};
pub use authn_request::{AuthnRequest, AuthnRequestOptions};
pub use conditions::{validate_conditions, ConditionViolation};
pub use config::{ContactPerson, Organization, SamlConfig, ValidationSettings};
pub use constants::{NameIdFormat, SamlBinding};
pub use engine::{ParsedResponse, SamlEngine};
pub use error::{SamlError, SamlResult};
pub use logout::{LogoutRequest, LogoutRequestOptions};
pub use metadata::MetadataOptions;
pub use parser::{AssertionParser, RegexParser, StructuralParser};
pub use signature::{validate_certificate, CertificateInfo, SignatureVerifier};
