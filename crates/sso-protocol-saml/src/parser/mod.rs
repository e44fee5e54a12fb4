//! SAML `Response` parsers.
//!
//! Two independent implementations share one extraction contract:
//!
//! - [`StructuralParser`] walks the document with `quick-xml`
//! - [`RegexParser`] matches elements textually and needs no XML reader
//!
//! [`select_parser`] runs once when an engine is built and picks the
//! structural parser if it handles the built-in probe document.

mod pattern;
mod structural;

use std::sync::Arc;

pub use pattern::RegexParser;
pub use structural::StructuralParser;

use crate::assertion::{attribute_key, parse_instant, Conditions, SamlAssertion, SignatureStatus};
use crate::constants::status_codes;
use crate::error::{SamlError, SamlResult};

/// An `Attribute` as it appears in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAttribute {
    /// `Name`.
    pub name: String,
    /// `FriendlyName`.
    pub friendly_name: Option<String>,
    /// `AttributeValue` texts.
    pub values: Vec<String>,
}

/// Everything a parser extracts from a `Response`, still as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDocument {
    /// Top-level `StatusCode` `Value`.
    pub status_code: Option<String>,
    /// `StatusMessage`.
    pub status_message: Option<String>,
    /// `InResponseTo` of the `Response`.
    pub in_response_to: Option<String>,
    /// `Issuer` of the `Response`.
    pub response_issuer: Option<String>,
    /// `Issuer` of the `Assertion`.
    pub assertion_issuer: Option<String>,
    /// Whether an `Assertion` element was found.
    pub has_assertion: bool,
    /// Whether an `EncryptedAssertion` element was found.
    pub has_encrypted_assertion: bool,
    /// Subject `NameID` text.
    pub name_id: Option<String>,
    /// `NameID` `Format`.
    pub name_id_format: Option<String>,
    /// `SessionIndex`.
    pub session_index: Option<String>,
    /// `Conditions` `NotBefore`.
    pub not_before: Option<String>,
    /// `Conditions` `NotOnOrAfter`.
    pub not_on_or_after: Option<String>,
    /// `Audience` texts.
    pub audiences: Vec<String>,
    /// `AuthnInstant`.
    pub authn_instant: Option<String>,
    /// `AuthnStatement` `SessionNotOnOrAfter`.
    pub session_not_on_or_after: Option<String>,
    /// Attribute statements, in document order.
    pub attributes: Vec<RawAttribute>,
    /// Whether any `ds:Signature` element is present.
    pub has_signature: bool,
}

impl ResponseDocument {
    /// Fails with [`SamlError::StatusNotSuccess`] unless the top-level
    /// status is `Success`.
    pub fn check_status(&self) -> SamlResult<()> {
        match self.status_code.as_deref() {
            Some(status_codes::SUCCESS) => Ok(()),
            Some(code) => Err(SamlError::StatusNotSuccess {
                code: code.to_string(),
                message: self.status_message.clone(),
            }),
            None => Err(SamlError::MissingElement("Status/StatusCode".to_string())),
        }
    }

    /// Converts the document into a typed assertion.
    ///
    /// Checks the status first. Signature handling is left to the caller,
    /// so the result starts out as [`SignatureStatus::Unsigned`] or
    /// [`SignatureStatus::Unverified`] depending on signature presence.
    pub fn into_assertion(self) -> SamlResult<SamlAssertion> {
        self.check_status()?;

        if !self.has_assertion {
            return Err(if self.has_encrypted_assertion {
                SamlError::InvalidResponse("encrypted assertions are not supported".to_string())
            } else {
                SamlError::MissingElement("Assertion".to_string())
            });
        }

        let name_id = self
            .name_id
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| SamlError::MissingElement("Subject/NameID".to_string()))?;

        let conditions = Conditions {
            not_before: self
                .not_before
                .as_deref()
                .map(|v| parse_instant("NotBefore", v))
                .transpose()?,
            not_on_or_after: self
                .not_on_or_after
                .as_deref()
                .map(|v| parse_instant("NotOnOrAfter", v))
                .transpose()?,
            audiences: self.audiences,
        };
        let authn_instant = self
            .authn_instant
            .as_deref()
            .map(|v| parse_instant("AuthnInstant", v))
            .transpose()?;
        let session_not_on_or_after = self
            .session_not_on_or_after
            .as_deref()
            .map(|v| parse_instant("SessionNotOnOrAfter", v))
            .transpose()?;

        let mut attributes = std::collections::BTreeMap::<String, Vec<String>>::new();
        for attribute in self.attributes {
            let key = attribute_key(&attribute.name, attribute.friendly_name.as_deref());
            attributes.entry(key).or_default().extend(attribute.values);
        }

        Ok(SamlAssertion {
            name_id: name_id.trim().to_string(),
            name_id_format: self.name_id_format,
            session_index: self.session_index,
            issuer: self.assertion_issuer.or(self.response_issuer),
            in_response_to: self.in_response_to,
            conditions,
            authn_instant,
            session_not_on_or_after,
            attributes,
            signature: if self.has_signature {
                SignatureStatus::Unverified
            } else {
                SignatureStatus::Unsigned
            },
        })
    }
}

/// Extracts a [`ResponseDocument`] from `Response` XML.
pub trait AssertionParser: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Parses decoded `Response` XML.
    fn parse(&self, xml: &str) -> SamlResult<ResponseDocument>;
}

/// Document used to probe parser capability.
pub const PROBE_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_probe" Version="2.0" IssueInstant="2026-01-01T00:00:00Z">
  <saml:Issuer>https://probe.invalid/idp</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_probe_assertion" Version="2.0" IssueInstant="2026-01-01T00:00:00Z">
    <saml:Issuer>https://probe.invalid/idp</saml:Issuer>
    <saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent">probe&amp;user</saml:NameID></saml:Subject>
    <saml:Conditions NotBefore="2026-01-01T00:00:00Z" NotOnOrAfter="2026-01-01T00:05:00Z">
      <saml:AudienceRestriction><saml:Audience>https://probe.invalid/sp</saml:Audience></saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AuthnStatement AuthnInstant="2026-01-01T00:00:00Z" SessionIndex="_probe_session"/>
    <saml:AttributeStatement>
      <saml:Attribute Name="urn:oid:0.9.2342.19200300.100.1.3"><saml:AttributeValue>probe@probe.invalid</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#;

fn probe(parser: &dyn AssertionParser) -> bool {
    match parser.parse(PROBE_DOCUMENT) {
        Ok(doc) => {
            doc.name_id.as_deref() == Some("probe&user")
                && doc.session_index.as_deref() == Some("_probe_session")
                && doc.audiences == ["https://probe.invalid/sp"]
                && doc
                    .attributes
                    .first()
                    .is_some_and(|a| a.values == ["probe@probe.invalid"])
        }
        Err(e) => {
            tracing::debug!(parser = parser.name(), error = %e, "parser probe failed");
            false
        }
    }
}

/// Picks the parser to use for the lifetime of an engine.
#[must_use]
pub fn select_parser() -> Arc<dyn AssertionParser> {
    let structural = StructuralParser;
    if probe(&structural) {
        tracing::debug!(parser = structural.name(), "selected SAML parser");
        return Arc::new(structural);
    }
    tracing::warn!("structural SAML parser failed its probe, falling back to regex parser");
    Arc::new(RegexParser)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn parsers() -> [Box<dyn AssertionParser>; 2] {
        [Box::new(StructuralParser), Box::new(RegexParser)]
    }

    #[test]
    fn structural_parser_passes_the_probe() {
        assert!(probe(&StructuralParser));
        assert_eq!(select_parser().name(), "structural");
    }

    #[test]
    fn regex_parser_passes_the_probe() {
        assert!(probe(&RegexParser));
    }

    #[test]
    fn parsers_agree_on_a_signed_response() {
        let [structural, regex] = parsers();
        let a = structural.parse(SIGNED_RESPONSE).unwrap();
        let b = regex.parse(SIGNED_RESPONSE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signed_response_extracts_everything() {
        for parser in parsers() {
            let assertion = parser.parse(SIGNED_RESPONSE).unwrap().into_assertion().unwrap();
            let name = parser.name();

            assert_eq!(assertion.name_id, "alice@example.com", "{name}");
            assert_eq!(
                assertion.name_id_format.as_deref(),
                Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"),
                "{name}"
            );
            assert_eq!(assertion.session_index.as_deref(), Some("_sess42"), "{name}");
            assert_eq!(assertion.issuer.as_deref(), Some("https://idp.example.com"), "{name}");
            assert_eq!(assertion.in_response_to.as_deref(), Some("_req1"), "{name}");
            assert_eq!(assertion.conditions.audiences, ["https://sp.example.com"], "{name}");
            assert_eq!(
                assertion.conditions.not_on_or_after.unwrap().to_rfc3339(),
                "2026-03-01T12:10:00+00:00",
                "{name}"
            );
            assert!(assertion.authn_instant.is_some(), "{name}");
            assert_eq!(
                assertion.session_not_on_or_after.unwrap().to_rfc3339(),
                "2026-03-01T20:00:00+00:00",
                "{name}"
            );
            assert_eq!(assertion.signature, SignatureStatus::Unverified, "{name}");

            assert_eq!(assertion.attribute("mail"), Some("alice@example.com"), "{name}");
            assert_eq!(assertion.attribute("displayName"), Some("Alice & Co"), "{name}");
            assert_eq!(
                assertion.attributes["groups"],
                ["admins", "developers"],
                "{name}"
            );
            assert_eq!(assertion.attribute("department"), Some("R&D"), "{name}");
        }
    }

    #[test]
    fn non_success_status_is_reported() {
        for parser in parsers() {
            let err = parser
                .parse(FAILED_RESPONSE)
                .unwrap()
                .into_assertion()
                .unwrap_err();
            match err {
                SamlError::StatusNotSuccess { code, message } => {
                    assert_eq!(code, status_codes::RESPONDER, "{}", parser.name());
                    assert_eq!(message.as_deref(), Some("User cancelled"));
                }
                other => panic!("{}: unexpected {other:?}", parser.name()),
            }
        }
    }

    #[test]
    fn unprefixed_response_parses() {
        for parser in parsers() {
            let doc = parser.parse(UNPREFIXED_RESPONSE).unwrap();
            assert!(!doc.has_signature);
            let assertion = doc.into_assertion().unwrap();
            assert_eq!(assertion.name_id, "bob", "{}", parser.name());
            assert_eq!(assertion.attribute("email"), Some("bob@example.com"));
            assert_eq!(
                assertion.attributes.get("eduPersonEntitlement"),
                Some(&vec![String::new()]),
                "{}",
                parser.name()
            );
            assert_eq!(assertion.signature, SignatureStatus::Unsigned);
        }
    }

    #[test]
    fn missing_assertion_is_an_error() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:Response>"#;
        for parser in parsers() {
            let err = parser.parse(xml).unwrap().into_assertion().unwrap_err();
            assert!(matches!(err, SamlError::MissingElement(_)), "{}", parser.name());
        }
    }

    #[test]
    fn encrypted_assertion_is_rejected() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status><saml:EncryptedAssertion><xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"/></saml:EncryptedAssertion></samlp:Response>"#;
        for parser in parsers() {
            let err = parser.parse(xml).unwrap().into_assertion().unwrap_err();
            assert!(
                err.to_string().contains("encrypted"),
                "{}: {err}",
                parser.name()
            );
        }
    }
}
