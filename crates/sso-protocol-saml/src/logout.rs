//! SP-initiated `LogoutRequest` generation.

use chrono::{DateTime, Duration, Utc};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::authn_request::saml_instant;
use crate::bindings::{encode_redirect_url, SamlMessageType};
use crate::config::SamlConfig;
use crate::constants::{SAMLP_NS, SAML_NS};
use crate::error::SamlResult;

/// Lifetime of a logout request (`NotOnOrAfter - IssueInstant`).
pub const LOGOUT_REQUEST_LIFETIME_SECS: i64 = 300;

/// Optional parts of a logout request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogoutRequestOptions {
    /// `Reason` URI, e.g. [`crate::constants::logout_reasons::USER`].
    pub reason: Option<String>,
    /// Relay state for the redirect binding.
    pub relay_state: Option<String>,
    /// Overrides the NameID format; the configured one is used otherwise.
    pub name_id_format: Option<String>,
}

/// A generated `LogoutRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// Request `ID`.
    pub id: String,
    /// Request XML.
    pub xml: String,
    /// Where the request is sent.
    pub destination: String,
    /// HTTP-Redirect binding URL.
    pub redirect_url: String,
    /// `NotOnOrAfter`.
    pub not_on_or_after: DateTime<Utc>,
}

/// Builds a `LogoutRequest` for `name_id`, addressed to the IdP's SLO
/// endpoint (the SSO endpoint when no SLO URL is configured).
pub fn build_logout_request(
    config: &SamlConfig,
    id: &str,
    name_id: &str,
    session_index: Option<&str>,
    options: &LogoutRequestOptions,
    now: DateTime<Utc>,
) -> SamlResult<LogoutRequest> {
    let destination = config.logout_destination().to_string();
    let not_on_or_after = now + Duration::seconds(LOGOUT_REQUEST_LIFETIME_SECS);
    let format = options
        .name_id_format
        .as_deref()
        .unwrap_or(config.name_id_format.uri());

    let mut xml = format!(
        r#"<samlp:LogoutRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="2.0" IssueInstant="{}" Destination="{}" NotOnOrAfter="{}""#,
        escape(id),
        saml_instant(now),
        escape(destination.as_str()),
        saml_instant(not_on_or_after),
    );
    if let Some(reason) = &options.reason {
        xml.push_str(&format!(r#" Reason="{}""#, escape(reason.as_str())));
    }
    xml.push('>');
    xml.push_str(&format!(
        "<saml:Issuer>{}</saml:Issuer>",
        escape(config.entity_id.as_str())
    ));
    xml.push_str(&format!(
        r#"<saml:NameID Format="{}">{}</saml:NameID>"#,
        escape(format),
        escape(name_id)
    ));
    if let Some(index) = session_index {
        xml.push_str(&format!(
            "<samlp:SessionIndex>{}</samlp:SessionIndex>",
            escape(index)
        ));
    }
    xml.push_str("</samlp:LogoutRequest>");

    let redirect_url = encode_redirect_url(
        &xml,
        &destination,
        options.relay_state.as_deref(),
        SamlMessageType::Request,
    )?;

    Ok(LogoutRequest {
        id: id.to_string(),
        xml,
        destination,
        redirect_url,
        not_on_or_after,
    })
}
