//! The SAML service-provider engine.
//!
//! One engine serves one configured identity provider. The assertion parser
//! is chosen once, at construction, by [`select_parser`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assertion::{Conditions, SamlAssertion, SignatureStatus};
use crate::authn_request::{build_authn_request, AuthnRequest, AuthnRequestOptions};
use crate::bindings::decode_post_message;
use crate::conditions::{validate_conditions, ConditionViolation};
use crate::config::{SamlConfig, ValidationSettings};
use crate::error::{SamlError, SamlResult};
use crate::logout::{build_logout_request, LogoutRequest, LogoutRequestOptions};
use crate::metadata::{generate_metadata, MetadataOptions};
use crate::parser::{select_parser, AssertionParser};
use crate::signature::{certificate_der, validate_certificate, CertificateInfo, SignatureVerifier};
use sso_core::ConditionPolicy;

/// A parsed and validated response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResponse {
    /// The extracted assertion.
    pub assertion: SamlAssertion,
    /// Condition violations tolerated under [`ConditionPolicy::Warn`].
    pub violations: Vec<ConditionViolation>,
}

/// SAML SP engine for a single IdP.
pub struct SamlEngine {
    config: SamlConfig,
    settings: ValidationSettings,
    parser: Arc<dyn AssertionParser>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl std::fmt::Debug for SamlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlEngine")
            .field("entity_id", &self.config.entity_id)
            .field("parser", &self.parser.name())
            .field("verifier", &self.verifier.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl SamlEngine {
    /// Creates an engine, probing for the assertion parser to use.
    #[must_use]
    pub fn new(config: SamlConfig, settings: ValidationSettings) -> Self {
        Self {
            config,
            settings,
            parser: select_parser(),
            verifier: None,
        }
    }

    /// Replaces the assertion parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn AssertionParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Sets the XML signature verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Provider configuration.
    pub fn config(&self) -> &SamlConfig {
        &self.config
    }

    /// Name of the selected parser.
    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }

    /// Builds an `AuthnRequest` with a fresh id unless one is given.
    pub fn generate_authn_request(
        &self,
        id: Option<&str>,
        relay_state: Option<&str>,
        options: &AuthnRequestOptions,
    ) -> SamlResult<AuthnRequest> {
        let id = id.map_or_else(sso_crypto::random::generate_saml_id, str::to_string);
        build_authn_request(&self.config, &id, relay_state, options, Utc::now())
    }

    /// Decodes, parses and validates a `SAMLResponse` form value.
    pub fn parse_assertion(&self, saml_response: &str) -> SamlResult<ParsedResponse> {
        self.parse_assertion_at(saml_response, Utc::now())
    }

    /// [`Self::parse_assertion`] evaluated at `now`.
    pub fn parse_assertion_at(
        &self,
        saml_response: &str,
        now: DateTime<Utc>,
    ) -> SamlResult<ParsedResponse> {
        let xml = decode_post_message(saml_response)?;
        let mut assertion = self.parser.parse(&xml)?.into_assertion()?;

        assertion.signature = self.check_signature(&xml, assertion.signature)?;

        let violations = self.validate_conditions(&assertion.conditions, now);
        if !violations.is_empty() {
            let summary = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            match self.settings.condition_policy {
                ConditionPolicy::Reject => return Err(SamlError::ConditionsNotMet(summary)),
                ConditionPolicy::Warn => warn!(
                    entity_id = %self.config.entity_id,
                    violations = %summary,
                    "SAML assertion conditions not met"
                ),
            }
        }

        debug!(
            parser = self.parser.name(),
            signature = ?assertion.signature,
            attributes = assertion.attributes.len(),
            "parsed SAML response"
        );
        Ok(ParsedResponse {
            assertion,
            violations,
        })
    }

    fn check_signature(&self, xml: &str, status: SignatureStatus) -> SamlResult<SignatureStatus> {
        let status = match (status, &self.verifier) {
            (SignatureStatus::Unverified, Some(verifier)) => {
                let der = certificate_der(&self.config.certificate)?;
                verifier
                    .verify(xml, &der)
                    .map_err(|e| SamlError::SignatureInvalid(e.to_string()))?;
                SignatureStatus::Verified
            }
            (SignatureStatus::Unverified, None) => {
                warn!(
                    idp = %self.config.idp_entity_id,
                    "SAML response signature present but NOT verified: no signature verifier configured"
                );
                SignatureStatus::Unverified
            }
            (other, _) => other,
        };

        if self.settings.require_signature_verification && status != SignatureStatus::Verified {
            return Err(SamlError::SignatureRequired(match status {
                SignatureStatus::Unsigned => "response is not signed".to_string(),
                _ => "no signature verifier available".to_string(),
            }));
        }
        Ok(status)
    }

    /// Checks conditions against this SP's entity id and clock skew.
    #[must_use]
    pub fn validate_conditions(
        &self,
        conditions: &Conditions,
        now: DateTime<Utc>,
    ) -> Vec<ConditionViolation> {
        validate_conditions(
            conditions,
            Some(&self.config.entity_id),
            now,
            self.settings.clock_skew,
        )
    }

    /// SP metadata XML.
    pub fn generate_metadata(&self, options: &MetadataOptions) -> SamlResult<String> {
        generate_metadata(&self.config, options)
    }

    /// Builds a `LogoutRequest` with a fresh id.
    pub fn build_logout_request(
        &self,
        name_id: &str,
        session_index: Option<&str>,
        options: &LogoutRequestOptions,
    ) -> SamlResult<LogoutRequest> {
        build_logout_request(
            &self.config,
            &sso_crypto::random::generate_saml_id(),
            name_id,
            session_index,
            options,
            Utc::now(),
        )
    }

    /// Structurally validates the configured IdP certificate.
    pub fn validate_certificate(&self) -> SamlResult<CertificateInfo> {
        validate_certificate(&self.config.certificate, Utc::now())
    }
}
