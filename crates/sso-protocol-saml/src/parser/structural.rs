//! Streaming parser built on `quick-xml`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

use super::{AssertionParser, RawAttribute, ResponseDocument};

/// Walks the event stream and tracks element nesting by local name.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    ResponseIssuer,
    AssertionIssuer,
    StatusMessage,
    NameId,
    Audience,
    AttributeValue,
}

struct Capture {
    target: Target,
    depth: usize,
    text: String,
}

impl AssertionParser for StructuralParser {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn parse(&self, xml: &str) -> SamlResult<ResponseDocument> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut doc = ResponseDocument::default();
        let mut stack: Vec<String> = Vec::new();
        let mut capture: Option<Capture> = None;
        let mut attribute: Option<RawAttribute> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = local_name(&e);
                    if let Some(target) = start_element(&mut doc, &mut attribute, &stack, &name, &e)? {
                        if capture.is_none() {
                            capture = Some(Capture {
                                target,
                                depth: stack.len(),
                                text: String::new(),
                            });
                        }
                    }
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    start_element(&mut doc, &mut attribute, &stack, &name, &e)?;
                    match name.as_str() {
                        "AttributeValue" => {
                            if let Some(attr) = attribute.as_mut() {
                                attr.values.push(String::new());
                            }
                        }
                        "Attribute" => {
                            if let Some(attr) = attribute.take() {
                                doc.attributes.push(attr);
                            }
                        }
                        _ => {}
                    }
                }
                Event::Text(e) => {
                    if let Some(capture) = capture.as_mut() {
                        capture.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let Some(capture) = capture.as_mut() {
                        capture.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::End(_) => {
                    let name = stack.pop().unwrap_or_default();
                    if capture.as_ref().is_some_and(|c| c.depth == stack.len()) {
                        if let Some(done) = capture.take() {
                            finish_capture(&mut doc, &mut attribute, done);
                        }
                    }
                    if name == "Attribute" {
                        if let Some(attr) = attribute.take() {
                            doc.attributes.push(attr);
                        }
                    }
                }
                Event::DocType(_) => {
                    return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(doc)
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, key: &str) -> SamlResult<Option<String>> {
    for attribute in e.attributes().flatten() {
        if attribute.key.as_ref() == key.as_bytes() {
            return Ok(Some(attribute.unescape_value()?.trim().to_string()));
        }
    }
    Ok(None)
}

/// Handles an opening (or empty) element and returns the text target it
/// starts, if any.
fn start_element(
    doc: &mut ResponseDocument,
    attribute: &mut Option<RawAttribute>,
    stack: &[String],
    name: &str,
    e: &BytesStart<'_>,
) -> SamlResult<Option<Target>> {
    let parent = stack.last().map(String::as_str);
    let target = match (name, parent) {
        ("Response", None) => {
            doc.in_response_to = attr(e, "InResponseTo")?;
            None
        }
        ("StatusCode", Some("Status")) => {
            if doc.status_code.is_none() {
                doc.status_code = attr(e, "Value")?;
            }
            None
        }
        ("StatusMessage", Some("Status")) => Some(Target::StatusMessage),
        ("Issuer", Some("Response")) => Some(Target::ResponseIssuer),
        ("Issuer", Some("Assertion")) => Some(Target::AssertionIssuer),
        ("Assertion", _) => {
            doc.has_assertion = true;
            None
        }
        ("EncryptedAssertion", _) => {
            doc.has_encrypted_assertion = true;
            None
        }
        ("Signature", _) => {
            doc.has_signature = true;
            None
        }
        ("NameID", Some("Subject")) if doc.name_id.is_none() => {
            doc.name_id_format = attr(e, "Format")?;
            Some(Target::NameId)
        }
        ("Conditions", _) if doc.not_before.is_none() && doc.not_on_or_after.is_none() => {
            doc.not_before = attr(e, "NotBefore")?;
            doc.not_on_or_after = attr(e, "NotOnOrAfter")?;
            None
        }
        ("Audience", _) => Some(Target::Audience),
        ("AuthnStatement", _) if doc.authn_instant.is_none() && doc.session_index.is_none() => {
            doc.authn_instant = attr(e, "AuthnInstant")?;
            doc.session_index = attr(e, "SessionIndex")?;
            doc.session_not_on_or_after = attr(e, "SessionNotOnOrAfter")?;
            None
        }
        ("Attribute", _) => {
            *attribute = Some(RawAttribute {
                name: attr(e, "Name")?.unwrap_or_default(),
                friendly_name: attr(e, "FriendlyName")?,
                values: Vec::new(),
            });
            None
        }
        ("AttributeValue", _) if attribute.is_some() => Some(Target::AttributeValue),
        _ => None,
    };
    Ok(target)
}

fn finish_capture(doc: &mut ResponseDocument, attribute: &mut Option<RawAttribute>, capture: Capture) {
    let text = capture.text.trim().to_string();
    match capture.target {
        Target::ResponseIssuer => {
            doc.response_issuer.get_or_insert(text);
        }
        Target::AssertionIssuer => {
            doc.assertion_issuer.get_or_insert(text);
        }
        Target::StatusMessage => {
            doc.status_message.get_or_insert(text);
        }
        Target::NameId => {
            doc.name_id.get_or_insert(text);
        }
        Target::Audience => {
            if !text.is_empty() {
                doc.audiences.push(text);
            }
        }
        Target::AttributeValue => {
            if let Some(attr) = attribute.as_mut() {
                attr.values.push(text);
            }
        }
    }
}
