//! HTTP-Redirect binding.
//!
//! Messages travel as URL query parameters: raw DEFLATE, then base64, then
//! URL encoding.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{SamlError, SamlResult};

use super::SamlMessageType;

/// Maximum inflated size accepted when decoding (64 KiB).
const MAX_DECOMPRESSED_SIZE: u64 = 64 * 1024;

/// Builds the redirect URL carrying `xml` to `destination`.
///
/// Existing query parameters on `destination` are preserved.
pub fn encode_redirect_url(
    xml: &str,
    destination: &str,
    relay_state: Option<&str>,
    message_type: SamlMessageType,
) -> SamlResult<String> {
    let compressed = deflate_compress(xml.as_bytes())?;
    let encoded = STANDARD.encode(compressed);

    let separator = if destination.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{destination}{separator}{}={}",
        message_type.param_name(),
        urlencoding::encode(&encoded)
    );
    if let Some(state) = relay_state.filter(|s| !s.is_empty()) {
        url.push_str("&RelayState=");
        url.push_str(&urlencoding::encode(state));
    }
    Ok(url)
}

/// Decodes a base64 + DEFLATE message parameter value.
///
/// The value must already be URL-decoded.
pub fn decode_redirect_message(encoded: &str) -> SamlResult<String> {
    let compressed = STANDARD.decode(encoded.trim())?;

    let mut xml = String::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(MAX_DECOMPRESSED_SIZE)
        .read_to_string(&mut xml)?;
    if xml.len() as u64 >= MAX_DECOMPRESSED_SIZE {
        return Err(SamlError::Deflate(
            "inflated message exceeds 64 KiB".to_string(),
        ));
    }
    Ok(xml)
}

fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
