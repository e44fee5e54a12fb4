//! `AuthnRequest` generation.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::bindings::{encode_redirect_url, SamlMessageType};
use crate::config::SamlConfig;
use crate::constants::{NameIdFormat, SamlBinding, SAMLP_NS, SAML_NS};
use crate::error::SamlResult;

/// Per-request overrides of the provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthnRequestOptions {
    /// `ForceAuthn`.
    pub force_authn: Option<bool>,
    /// `IsPassive`.
    pub is_passive: Option<bool>,
    /// Requested authentication context class URI.
    pub authn_context: Option<String>,
    /// NameID format for the `NameIDPolicy`.
    pub name_id_format: Option<NameIdFormat>,
    /// `ProviderName`.
    pub provider_name: Option<String>,
}

/// A generated `AuthnRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthnRequest {
    /// Request `ID`; the IdP echoes it as `InResponseTo`.
    pub id: String,
    /// `IssueInstant`.
    pub issue_instant: DateTime<Utc>,
    /// Request XML.
    pub xml: String,
    /// HTTP-Redirect binding URL.
    pub redirect_url: String,
    /// Relay state carried alongside the request.
    pub relay_state: Option<String>,
}

/// Formats a timestamp the way SAML expects (`xs:dateTime`, UTC, `Z`).
pub(crate) fn saml_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Builds an `AuthnRequest` and its redirect URL.
pub fn build_authn_request(
    config: &SamlConfig,
    id: &str,
    relay_state: Option<&str>,
    options: &AuthnRequestOptions,
    issue_instant: DateTime<Utc>,
) -> SamlResult<AuthnRequest> {
    let force_authn = options.force_authn.unwrap_or(config.force_authn);
    let is_passive = options.is_passive.unwrap_or(config.is_passive);
    let name_id_format = options.name_id_format.unwrap_or(config.name_id_format);
    let authn_context = options
        .authn_context
        .as_deref()
        .or(config.authn_context.as_deref());
    let provider_name = options
        .provider_name
        .as_deref()
        .or(config.provider_name.as_deref());

    let mut xml = format!(
        r#"<samlp:AuthnRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="2.0" IssueInstant="{}" Destination="{}" AssertionConsumerServiceURL="{}" ProtocolBinding="{}""#,
        escape(id),
        saml_instant(issue_instant),
        escape(config.sso_url.as_str()),
        escape(config.acs_url.as_str()),
        SamlBinding::HttpPost.uri(),
    );
    if force_authn {
        xml.push_str(r#" ForceAuthn="true""#);
    }
    if is_passive {
        xml.push_str(r#" IsPassive="true""#);
    }
    if let Some(name) = provider_name {
        xml.push_str(&format!(r#" ProviderName="{}""#, escape(name)));
    }
    xml.push('>');

    xml.push_str(&format!(
        "<saml:Issuer>{}</saml:Issuer>",
        escape(config.entity_id.as_str())
    ));
    xml.push_str(&format!(
        r#"<samlp:NameIDPolicy Format="{}" AllowCreate="true"/>"#,
        name_id_format.uri()
    ));
    if let Some(class_ref) = authn_context {
        xml.push_str(&format!(
            r#"<samlp:RequestedAuthnContext Comparison="exact"><saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef></samlp:RequestedAuthnContext>"#,
            escape(class_ref)
        ));
    }
    xml.push_str("</samlp:AuthnRequest>");

    let redirect_url = encode_redirect_url(
        &xml,
        &config.sso_url,
        relay_state,
        SamlMessageType::Request,
    )?;

    Ok(AuthnRequest {
        id: id.to_string(),
        issue_instant,
        xml,
        redirect_url,
        relay_state: relay_state.map(str::to_string),
    })
}
