//! Service-provider metadata generation.

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::config::{ContactPerson, Organization, SamlConfig};
use crate::constants::{NameIdFormat, SamlBinding, ATTRNAME_FORMAT_URI, MD_NS, SAMLP_NS, XMLDSIG_NS};
use crate::error::SamlResult;
use crate::signature::certificate_der;

/// Overrides applied on top of the provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataOptions {
    /// Single logout URL on our side; overrides `spSloUrl`. Without
    /// either, no `SingleLogoutService` is advertised.
    pub slo_url: Option<String>,
    /// `validUntil` attribute.
    pub valid_until: Option<chrono::DateTime<chrono::Utc>>,
    /// Organization block; overrides the configured one.
    pub organization: Option<Organization>,
    /// Contact block; overrides the configured one.
    pub contact: Option<ContactPerson>,
}

/// Requested attributes advertised in the `AttributeConsumingService`.
const REQUESTED_ATTRIBUTES: &[(&str, &str, bool)] = &[
    ("urn:oid:0.9.2342.19200300.100.1.3", "email", true),
    ("urn:oid:2.5.4.3", "name", false),
    ("urn:oid:2.16.840.1.113730.3.1.241", "displayName", false),
    ("urn:oid:1.3.6.1.4.1.5923.1.5.1.1", "groups", false),
];

/// Builds the SP `EntityDescriptor`.
pub fn generate_metadata(config: &SamlConfig, options: &MetadataOptions) -> SamlResult<String> {
    let entity_id = escape(config.entity_id.as_str());
    let acs_url = escape(config.acs_url.as_str());
    let slo_url = options
        .slo_url
        .as_deref()
        .or(config.sp_slo_url.as_deref())
        .map(|url| escape(url));

    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str(&format!(
        r#"<md:EntityDescriptor xmlns:md="{MD_NS}" xmlns:ds="{XMLDSIG_NS}" entityID="{entity_id}""#
    ));
    if let Some(until) = options.valid_until {
        xml.push_str(&format!(
            r#" validUntil="{}""#,
            crate::authn_request::saml_instant(until)
        ));
    }
    xml.push('>');

    xml.push_str(&format!(
        r#"<md:SPSSODescriptor AuthnRequestsSigned="{}" WantAssertionsSigned="{}" protocolSupportEnumeration="{SAMLP_NS}">"#,
        config.authn_requests_signed, config.want_assertions_signed
    ));

    if let Some(certificate) = &config.sp_certificate {
        // Normalize PEM or wrapped base64 to a single base64 line.
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(certificate_der(certificate)?);
        for usage in ["signing", "encryption"] {
            xml.push_str(&format!(
                r#"<md:KeyDescriptor use="{usage}"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{encoded}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>"#
            ));
        }
    }

    if let Some(slo_url) = &slo_url {
        for binding in [SamlBinding::HttpRedirect, SamlBinding::HttpPost] {
            xml.push_str(&format!(
                r#"<md:SingleLogoutService Binding="{}" Location="{slo_url}"/>"#,
                binding.uri()
            ));
        }
    }

    for format in NameIdFormat::ADVERTISED {
        xml.push_str(&format!("<md:NameIDFormat>{}</md:NameIDFormat>", format.uri()));
    }

    for (index, binding) in [SamlBinding::HttpPost, SamlBinding::HttpRedirect]
        .into_iter()
        .enumerate()
    {
        let default = if index == 0 { r#" isDefault="true""# } else { "" };
        xml.push_str(&format!(
            r#"<md:AssertionConsumerService Binding="{}" Location="{acs_url}" index="{index}"{default}/>"#,
            binding.uri()
        ));
    }

    xml.push_str(r#"<md:AttributeConsumingService index="0" isDefault="true">"#);
    xml.push_str(&format!(
        r#"<md:ServiceName xml:lang="en">{}</md:ServiceName>"#,
        escape(config.provider_name.as_deref().unwrap_or(&config.entity_id))
    ));
    for (name, friendly, required) in REQUESTED_ATTRIBUTES {
        xml.push_str(&format!(
            r#"<md:RequestedAttribute Name="{name}" NameFormat="{ATTRNAME_FORMAT_URI}" FriendlyName="{friendly}" isRequired="{required}"/>"#
        ));
    }
    xml.push_str("</md:AttributeConsumingService>");
    xml.push_str("</md:SPSSODescriptor>");

    if let Some(org) = options.organization.as_ref().or(config.organization.as_ref()) {
        let name = escape(org.name.as_str());
        let display = escape(org.display_name.as_deref().unwrap_or(&org.name));
        xml.push_str(&format!(
            r#"<md:Organization><md:OrganizationName xml:lang="en">{name}</md:OrganizationName><md:OrganizationDisplayName xml:lang="en">{display}</md:OrganizationDisplayName><md:OrganizationURL xml:lang="en">{}</md:OrganizationURL></md:Organization>"#,
            escape(org.url.as_str())
        ));
    }

    if let Some(contact) = options.contact.as_ref().or(config.contact.as_ref()) {
        xml.push_str(&format!(
            r#"<md:ContactPerson contactType="{}">"#,
            escape(contact.contact_type.as_str())
        ));
        if let Some(given_name) = &contact.given_name {
            xml.push_str(&format!(
                "<md:GivenName>{}</md:GivenName>",
                escape(given_name.as_str())
            ));
        }
        xml.push_str(&format!(
            "<md:EmailAddress>mailto:{}</md:EmailAddress></md:ContactPerson>",
            escape(contact.email.as_str())
        ));
    }

    xml.push_str("</md:EntityDescriptor>");
    Ok(xml)
}
