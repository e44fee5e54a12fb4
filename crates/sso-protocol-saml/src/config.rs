//! Typed service-provider configuration parsed from a provider's config map.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sso_core::config::ConditionPolicy;
use sso_model::{ProviderConfiguration, ProviderType};

use crate::constants::NameIdFormat;
use crate::error::{SamlError, SamlResult};

/// Organization block of SP metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    /// `OrganizationName`.
    pub name: String,
    /// `OrganizationDisplayName`; defaults to the name.
    pub display_name: Option<String>,
    /// `OrganizationURL`.
    pub url: String,
}

/// Contact block of SP metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPerson {
    /// `contactType` attribute (`technical`, `support`, ...).
    pub contact_type: String,
    /// `GivenName`.
    pub given_name: Option<String>,
    /// `EmailAddress`.
    pub email: String,
}

/// Settings for one SAML identity provider, seen from our SP.
#[derive(Clone, PartialEq, Eq)]
pub struct SamlConfig {
    /// Our SP entity id.
    pub entity_id: String,
    /// The IdP entity id.
    pub idp_entity_id: String,
    /// IdP single sign-on URL.
    pub sso_url: String,
    /// IdP single logout URL.
    pub slo_url: Option<String>,
    /// IdP signing certificate (PEM or base64 DER).
    pub certificate: String,
    /// Our assertion consumer service URL.
    pub acs_url: String,
    /// Our single logout URL, advertised in metadata.
    pub sp_slo_url: Option<String>,
    /// Requested NameID format.
    pub name_id_format: NameIdFormat,
    /// Our SP certificate, advertised in metadata.
    pub sp_certificate: Option<String>,
    /// Our SP private key.
    pub sp_private_key: Option<String>,
    /// `AuthnRequestsSigned` metadata flag.
    pub authn_requests_signed: bool,
    /// `WantAssertionsSigned` metadata flag.
    pub want_assertions_signed: bool,
    /// Default `ForceAuthn`.
    pub force_authn: bool,
    /// Default `IsPassive`.
    pub is_passive: bool,
    /// Default requested authentication context class URI.
    pub authn_context: Option<String>,
    /// `ProviderName` sent in requests.
    pub provider_name: Option<String>,
    /// Metadata organization.
    pub organization: Option<Organization>,
    /// Metadata contact.
    pub contact: Option<ContactPerson>,
}

impl SamlConfig {
    /// Parses the config map of a SAML provider.
    pub fn from_provider(provider: &ProviderConfiguration) -> SamlResult<Self> {
        if provider.provider_type != ProviderType::Saml {
            return Err(SamlError::InvalidConfig(format!(
                "provider type {} has no SAML configuration",
                provider.provider_type
            )));
        }
        let mut config = Self::from_map(&provider.config)?;
        if config.provider_name.is_none() && !provider.name.is_empty() {
            config.provider_name = Some(provider.name.clone());
        }
        Ok(config)
    }

    /// Parses a raw config map.
    pub fn from_map(config: &Map<String, Value>) -> SamlResult<Self> {
        let name_id_format = match optional(config, "nameIdFormat") {
            Some(value) => NameIdFormat::parse(&value).ok_or_else(|| {
                SamlError::InvalidConfig(format!("unknown NameID format: {value}"))
            })?,
            None => NameIdFormat::default(),
        };

        let organization = optional(config, "organizationName").map(|name| Organization {
            display_name: optional(config, "organizationDisplayName"),
            url: optional(config, "organizationUrl").unwrap_or_default(),
            name,
        });
        let contact = optional(config, "contactEmail").map(|email| ContactPerson {
            contact_type: optional(config, "contactType").unwrap_or_else(|| "technical".into()),
            given_name: optional(config, "contactName"),
            email,
        });

        Ok(Self {
            entity_id: required(config, "entityId")?,
            idp_entity_id: required(config, "idpEntityId")?,
            sso_url: required(config, "ssoUrl")?,
            slo_url: optional(config, "sloUrl"),
            certificate: required(config, "certificate")?,
            acs_url: required(config, "acsUrl")?,
            sp_slo_url: optional(config, "spSloUrl"),
            name_id_format,
            sp_certificate: optional(config, "spCertificate"),
            sp_private_key: optional(config, "spPrivateKey")
                .or_else(|| optional(config, "privateKey")),
            authn_requests_signed: flag(config, "authnRequestsSigned", false),
            want_assertions_signed: flag(config, "wantAssertionsSigned", true),
            force_authn: flag(config, "forceAuthn", false),
            is_passive: flag(config, "isPassive", false),
            authn_context: optional(config, "authnContext"),
            provider_name: optional(config, "providerName"),
            organization,
            contact,
        })
    }

    /// Returns the logout destination: the SLO URL, else the SSO URL.
    #[must_use]
    pub fn logout_destination(&self) -> &str {
        self.slo_url.as_deref().unwrap_or(&self.sso_url)
    }
}

impl std::fmt::Debug for SamlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlConfig")
            .field("entity_id", &self.entity_id)
            .field("idp_entity_id", &self.idp_entity_id)
            .field("sso_url", &self.sso_url)
            .field("slo_url", &self.slo_url)
            .field("acs_url", &self.acs_url)
            .field("sp_slo_url", &self.sp_slo_url)
            .field("name_id_format", &self.name_id_format)
            .field("sp_private_key", &self.sp_private_key.as_ref().map(|_| "[REDACTED]"))
            .field("want_assertions_signed", &self.want_assertions_signed)
            .finish_non_exhaustive()
    }
}

/// Validation policy applied by the engine to every parsed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    /// Tolerance for `NotBefore` / `NotOnOrAfter`.
    pub clock_skew: Duration,
    /// What to do with violated conditions.
    pub condition_policy: ConditionPolicy,
    /// Reject responses whose signature was not verified.
    pub require_signature_verification: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            clock_skew: Duration::from_secs(300),
            condition_policy: ConditionPolicy::Warn,
            require_signature_verification: false,
        }
    }
}

impl ValidationSettings {
    /// Builds settings from the shared runtime configuration.
    #[must_use]
    pub fn from_sso_config(config: &sso_core::SsoConfig) -> Self {
        Self {
            clock_skew: Duration::from_secs(config.saml_clock_skew_secs.max(0).unsigned_abs()),
            condition_policy: config.saml_condition_policy,
            require_signature_verification: config.require_signature_verification,
        }
    }
}

fn optional(config: &Map<String, Value>, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(config: &Map<String, Value>, key: &str) -> SamlResult<String> {
    optional(config, key).ok_or_else(|| SamlError::InvalidConfig(format!("{key} is required")))
}

fn flag(config: &Map<String, Value>, key: &str, default: bool) -> bool {
    match config.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => default,
    }
}
