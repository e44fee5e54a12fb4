//! Cryptographically secure random generation.
//!
//! This module provides secure random values for:
//! - OAuth `state` tokens and OIDC nonces
//! - Session identifiers
//! - SAML message IDs
//!
//! All functions use the thread-local CSPRNG.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Generates a cryptographically secure random byte array.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a random alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a URL-safe base64-encoded random string from `byte_len` bytes.
#[must_use]
pub fn random_base64url(byte_len: usize) -> String {
    let bytes = random_bytes(byte_len);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Generates an OAuth `state` token (256 bits, base64url).
#[must_use]
pub fn generate_state() -> String {
    random_base64url(32)
}

/// Generates an OIDC nonce (128 bits, base64url).
#[must_use]
pub fn generate_nonce() -> String {
    random_base64url(16)
}

/// Generates a session identifier.
#[must_use]
pub fn generate_session_id() -> String {
    random_alphanumeric(32)
}

/// Generates a SAML message ID.
///
/// XML IDs must not start with a digit, so the value is prefixed with `_`.
#[must_use]
pub fn generate_saml_id() -> String {
    let bytes = random_bytes(20);
    let mut id = String::with_capacity(41);
    id.push('_');
    for b in bytes {
        id.push_str(&format!("{b:02x}"));
    }
    id
}
