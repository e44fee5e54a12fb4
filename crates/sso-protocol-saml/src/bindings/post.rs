//! HTTP-POST binding decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{SamlError, SamlResult};

/// Maximum encoded size accepted for a POSTed message (512 KiB).
pub const MAX_ENCODED_SIZE: usize = 512 * 1024;

/// Decodes a `SAMLResponse` form value into XML.
///
/// Input that is not valid base64 but already looks like XML (starts with
/// `<`) is returned as-is.
pub fn decode_post_message(encoded: &str) -> SamlResult<String> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(SamlError::InvalidResponse("empty SAML message".to_string()));
    }
    if trimmed.len() > MAX_ENCODED_SIZE {
        return Err(SamlError::InvalidResponse(format!(
            "SAML message exceeds maximum size ({} > {MAX_ENCODED_SIZE} bytes)",
            trimmed.len()
        )));
    }

    // Line-wrapped base64 is common in form posts.
    let compact: String = trimmed.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8(bytes)
            .map_err(|e| SamlError::InvalidResponse(format!("invalid UTF-8 in message: {e}"))),
        Err(_) if trimmed.starts_with('<') => Ok(trimmed.to_string()),
        Err(e) => Err(SamlError::Base64Decode(e.to_string())),
    }
}
