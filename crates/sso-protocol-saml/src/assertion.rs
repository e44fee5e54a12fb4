//! Parsed SAML assertion types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::friendly_name_for;
use crate::error::{SamlError, SamlResult};

/// Assertion `Conditions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    /// `NotBefore`.
    pub not_before: Option<DateTime<Utc>>,
    /// `NotOnOrAfter`.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// `AudienceRestriction/Audience` values.
    pub audiences: Vec<String>,
}

/// Outcome of signature handling for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// A signature was present and verified.
    Verified,
    /// A signature was present but no verifier was available.
    Unverified,
    /// No signature was present.
    Unsigned,
}

/// The identity data extracted from a SAML response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamlAssertion {
    /// Subject `NameID`.
    pub name_id: String,
    /// `NameID` `Format`.
    pub name_id_format: Option<String>,
    /// `AuthnStatement` `SessionIndex`.
    pub session_index: Option<String>,
    /// Assertion issuer, else the response issuer.
    pub issuer: Option<String>,
    /// `InResponseTo` of the response.
    pub in_response_to: Option<String>,
    /// Assertion conditions.
    pub conditions: Conditions,
    /// `AuthnStatement` `AuthnInstant`.
    pub authn_instant: Option<DateTime<Utc>>,
    /// `AuthnStatement` `SessionNotOnOrAfter`.
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    /// Attribute values keyed by friendly name.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Signature handling outcome.
    pub signature: SignatureStatus,
}

impl SamlAssertion {
    /// Latest instant a session built on this assertion may last until:
    /// `SessionNotOnOrAfter`, else the conditions' `NotOnOrAfter`.
    #[must_use]
    pub fn session_deadline(&self) -> Option<DateTime<Utc>> {
        self.session_not_on_or_after.or(self.conditions.not_on_or_after)
    }

    /// Returns the first value of an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the first value among several candidate attribute keys.
    #[must_use]
    pub fn first_attribute(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.attribute(key))
    }

    /// Returns the assertion as a JSON claims object.
    ///
    /// Single-valued attributes become strings; multi-valued ones arrays.
    /// `sub` carries the `NameID`.
    #[must_use]
    pub fn to_claims(&self) -> Value {
        let mut claims = serde_json::Map::new();
        for (key, values) in &self.attributes {
            let value = match values.as_slice() {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            claims.insert(key.clone(), value);
        }
        claims.insert("sub".to_string(), Value::String(self.name_id.clone()));
        if let Some(issuer) = &self.issuer {
            claims.insert("iss".to_string(), Value::String(issuer.clone()));
        }
        if let Some(index) = &self.session_index {
            claims.insert("sessionIndex".to_string(), Value::String(index.clone()));
        }
        Value::Object(claims)
    }
}

/// Returns the key an attribute is stored under.
///
/// Preference: `FriendlyName`, then the well-known name table, then the
/// last path segment of `Name`.
#[must_use]
pub fn attribute_key(name: &str, friendly_name: Option<&str>) -> String {
    if let Some(friendly) = friendly_name.map(str::trim).filter(|f| !f.is_empty()) {
        return friendly.to_string();
    }
    if let Some(friendly) = friendly_name_for(name) {
        return friendly.to_string();
    }
    name.rsplit(&['/', '#', ':'][..])
        .find(|segment| !segment.is_empty())
        .unwrap_or(name)
        .to_string()
}

/// Parses an `xs:dateTime` attribute value.
pub(crate) fn parse_instant(field: &str, value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidResponse(format!("invalid {field} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_key_prefers_friendly_name() {
        assert_eq!(
            attribute_key("urn:oid:0.9.2342.19200300.100.1.3", Some("email")),
            "email"
        );
        assert_eq!(
            attribute_key("urn:oid:0.9.2342.19200300.100.1.3", None),
            "mail"
        );
        assert_eq!(
            attribute_key("http://schemas.example.org/claims/department", Some("  ")),
            "department"
        );
        assert_eq!(attribute_key("urn:custom:costCenter", None), "costCenter");
        assert_eq!(attribute_key("plain", None), "plain");
    }

    #[test]
    fn claims_flatten_single_values() {
        let mut attributes = BTreeMap::new();
        attributes.insert("email".to_string(), vec!["a@example.com".to_string()]);
        attributes.insert(
            "groups".to_string(),
            vec!["admins".to_string(), "dev".to_string()],
        );
        let assertion = SamlAssertion {
            name_id: "user-1".to_string(),
            name_id_format: None,
            session_index: Some("_s1".to_string()),
            issuer: Some("https://idp".to_string()),
            in_response_to: None,
            conditions: Conditions::default(),
            authn_instant: None,
            session_not_on_or_after: None,
            attributes,
            signature: SignatureStatus::Unsigned,
        };

        let claims = assertion.to_claims();
        assert_eq!(claims["sub"], "user-1");
        assert_eq!(claims["email"], "a@example.com");
        assert_eq!(claims["groups"][1], "dev");
        assert_eq!(assertion.first_attribute(&["mail", "email"]), Some("a@example.com"));
    }

    #[test]
    fn instants_parse_with_offsets() {
        let at = parse_instant("NotBefore", "2026-03-01T12:00:00.123+01:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2026-03-01T11:00:00.123+00:00");
        assert!(parse_instant("NotBefore", "yesterday").is_err());
    }
}
