//! Text-matching parser built on `regex`.
//!
//! Element names match with any namespace prefix (or none). Only
//! well-formed input is expected; the parser does not validate nesting.

use std::sync::LazyLock;

use quick_xml::escape::unescape;
use regex::Regex;

use crate::error::{SamlError, SamlResult};

use super::{AssertionParser, RawAttribute, ResponseDocument};

/// Locates elements with regular expressions instead of an XML reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexParser;

/// Optional namespace prefix.
const P: &str = r"(?:[\w.-]+:)?";

fn compile(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("{P}", P)).expect("SAML element pattern is a valid regex")
}

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<!--.*?-->"));
static DOCTYPE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)<!DOCTYPE"));
static RESPONSE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"<{P}Response\b([^>]*?)/?>"));
static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<{P}Status\b[^>]*>(.*?)</{P}Status>"));
static STATUS_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<{P}StatusCode\b([^>]*?)/?>"));
static STATUS_MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<{P}StatusMessage\b[^>]*>(.*?)</{P}StatusMessage>"));
static ASSERTION_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<{P}Assertion\b[^>]*>(.*?)</{P}Assertion>"));
static ENCRYPTED_ASSERTION_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<{P}EncryptedAssertion\b"));
static ISSUER_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<{P}Issuer\b[^>]*>(.*?)</{P}Issuer>"));
static SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"<{P}Signature\b"));
static SUBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<{P}Subject\b[^>]*>(.*?)</{P}Subject>"));
static NAME_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<{P}NameID\b([^>]*)>(.*?)</{P}NameID>"));
static CONDITIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?s)<{P}Conditions\b([^>]*?)(?:/>|>(.*?)</{P}Conditions>)")
});
static AUDIENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<{P}Audience\b[^>]*>(.*?)</{P}Audience>"));
static AUTHN_STATEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<{P}AuthnStatement\b([^>]*?)/?>"));
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?s)<{P}Attribute\b([^>]*?)(?:/>|>(.*?)</{P}Attribute>)")
});
static ATTRIBUTE_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?s)<{P}AttributeValue\b[^>]*?(?:/>|>(.*?)</{P}AttributeValue>)")
});
static XML_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"([\w.:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static CDATA_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<!\[CDATA\[(.*?)\]\]>"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"<[^>]*>"));

impl AssertionParser for RegexParser {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn parse(&self, xml: &str) -> SamlResult<ResponseDocument> {
        if DOCTYPE_RE.is_match(xml) {
            return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
        }
        let xml = COMMENT_RE.replace_all(xml, "");
        let xml = xml.as_ref();

        let mut doc = ResponseDocument {
            has_signature: SIGNATURE_RE.is_match(xml),
            has_encrypted_assertion: ENCRYPTED_ASSERTION_RE.is_match(xml),
            ..ResponseDocument::default()
        };

        if let Some(root) = RESPONSE_RE.captures(xml) {
            doc.in_response_to = xml_attr(group(&root, 1), "InResponseTo")?;
        }

        if let Some(status) = STATUS_RE.captures(xml) {
            let body = group(&status, 1);
            if let Some(code) = STATUS_CODE_RE.captures(body) {
                doc.status_code = xml_attr(group(&code, 1), "Value")?;
            }
            if let Some(message) = STATUS_MESSAGE_RE.captures(body) {
                doc.status_message = Some(text_content(group(&message, 1))?);
            }
        }

        let assertion = ASSERTION_RE.captures(xml);
        let prologue = match assertion.as_ref().and_then(|c| c.get(0)) {
            Some(m) => &xml[..m.start()],
            None => xml,
        };
        if let Some(issuer) = ISSUER_RE.captures(prologue) {
            doc.response_issuer = Some(text_content(group(&issuer, 1))?);
        }

        let Some(assertion) = assertion else {
            return Ok(doc);
        };
        doc.has_assertion = true;
        let body = group(&assertion, 1);

        if let Some(issuer) = ISSUER_RE.captures(body) {
            doc.assertion_issuer = Some(text_content(group(&issuer, 1))?);
        }

        if let Some(subject) = SUBJECT_RE.captures(body) {
            if let Some(name_id) = NAME_ID_RE.captures(group(&subject, 1)) {
                doc.name_id_format = xml_attr(group(&name_id, 1), "Format")?;
                doc.name_id = Some(text_content(group(&name_id, 2))?);
            }
        }

        if let Some(conditions) = CONDITIONS_RE.captures(body) {
            let attrs = group(&conditions, 1);
            doc.not_before = xml_attr(attrs, "NotBefore")?;
            doc.not_on_or_after = xml_attr(attrs, "NotOnOrAfter")?;
            for audience in AUDIENCE_RE.captures_iter(group(&conditions, 2)) {
                let text = text_content(group(&audience, 1))?;
                if !text.is_empty() {
                    doc.audiences.push(text);
                }
            }
        }

        if let Some(statement) = AUTHN_STATEMENT_RE.captures(body) {
            let attrs = group(&statement, 1);
            doc.authn_instant = xml_attr(attrs, "AuthnInstant")?;
            doc.session_index = xml_attr(attrs, "SessionIndex")?;
            doc.session_not_on_or_after = xml_attr(attrs, "SessionNotOnOrAfter")?;
        }

        for attribute in ATTRIBUTE_RE.captures_iter(body) {
            let attrs = group(&attribute, 1);
            let mut raw = RawAttribute {
                name: xml_attr(attrs, "Name")?.unwrap_or_default(),
                friendly_name: xml_attr(attrs, "FriendlyName")?,
                values: Vec::new(),
            };
            for value in ATTRIBUTE_VALUE_RE.captures_iter(group(&attribute, 2)) {
                raw.values.push(text_content(group(&value, 1))?);
            }
            doc.attributes.push(raw);
        }

        Ok(doc)
    }
}

fn group<'h>(captures: &regex::Captures<'h>, index: usize) -> &'h str {
    captures.get(index).map_or("", |m| m.as_str())
}

fn xml_unescape(raw: &str) -> SamlResult<String> {
    unescape(raw)
        .map(|s| s.into_owned())
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

/// Reads one attribute from the inside of a start tag.
fn xml_attr(attrs: &str, key: &str) -> SamlResult<Option<String>> {
    for captures in XML_ATTR_RE.captures_iter(attrs) {
        if group(&captures, 1) == key {
            let raw = captures
                .get(2)
                .or_else(|| captures.get(3))
                .map_or("", |m| m.as_str());
            return Ok(Some(xml_unescape(raw)?.trim().to_string()));
        }
    }
    Ok(None)
}

/// Returns the text content of an element body: tags removed, entities
/// resolved outside CDATA sections, result trimmed.
fn text_content(body: &str) -> SamlResult<String> {
    let mut text = String::new();
    let mut rest = 0;
    for cdata in CDATA_RE.captures_iter(body) {
        let Some(whole) = cdata.get(0) else { continue };
        text.push_str(&plain_text(&body[rest..whole.start()])?);
        text.push_str(group(&cdata, 1));
        rest = whole.end();
    }
    text.push_str(&plain_text(&body[rest..])?);
    Ok(text.trim().to_string())
}

/// Text between tags, each run trimmed, the way a trimming XML reader
/// reports it.
fn plain_text(fragment: &str) -> SamlResult<String> {
    let mut text = String::new();
    for run in TAG_RE.split(fragment).map(str::trim).filter(|s| !s.is_empty()) {
        text.push_str(&xml_unescape(run)?);
    }
    Ok(text)
}
