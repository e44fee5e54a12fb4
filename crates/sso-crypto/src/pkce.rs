//! PKCE (RFC 7636) verifier and challenge generation.

use crate::hash::sha256_base64url;
use crate::random::random_base64url;

/// Minimum verifier length allowed by RFC 7636.
pub const MIN_VERIFIER_LEN: usize = 43;

/// Maximum verifier length allowed by RFC 7636.
pub const MAX_VERIFIER_LEN: usize = 128;

/// The only challenge method this crate emits.
pub const CHALLENGE_METHOD_S256: &str = "S256";

/// A PKCE code verifier together with its S256 challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// The secret code verifier (kept by the client).
    pub code_verifier: String,
    /// `base64url(sha256(code_verifier))`, sent in the authorization request.
    pub code_challenge: String,
}

impl PkcePair {
    /// Generates a fresh pair with a 43-character verifier.
    #[must_use]
    pub fn generate() -> Self {
        // 32 random bytes encode to exactly 43 base64url characters.
        Self::from_verifier(random_base64url(32))
    }

    /// Generates a pair whose verifier has `len` characters.
    ///
    /// `len` is clamped to the 43..=128 range.
    #[must_use]
    pub fn with_length(len: usize) -> Self {
        let len = len.clamp(MIN_VERIFIER_LEN, MAX_VERIFIER_LEN);
        // 3 bytes per 4 characters, rounded up, then truncated to the exact length.
        let mut verifier = random_base64url(len.div_ceil(4) * 3);
        verifier.truncate(len);
        Self::from_verifier(verifier)
    }

    /// Builds the pair for an existing verifier.
    #[must_use]
    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = challenge_for(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }

    /// Returns the challenge method name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        CHALLENGE_METHOD_S256
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// Computes the S256 challenge for a verifier.
#[must_use]
pub fn challenge_for(code_verifier: &str) -> String {
    sha256_base64url(code_verifier.as_bytes())
}

/// Checks a verifier's length and character set.
#[must_use]
pub fn is_valid_verifier(code_verifier: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&code_verifier.len())
        && code_verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Verifies a verifier against a stored S256 challenge.
#[must_use]
pub fn verify(code_verifier: &str, code_challenge: &str) -> bool {
    is_valid_verifier(code_verifier) && challenge_for(code_verifier) == code_challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7636_test_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

        assert_eq!(challenge_for(verifier), challenge);
        assert!(verify(verifier, challenge));
    }

    #[test]
    fn generated_pairs_satisfy_the_s256_relation() {
        for _ in 0..50 {
            let pair = PkcePair::generate();
            assert_eq!(pair.code_challenge, challenge_for(&pair.code_verifier));
            assert!(is_valid_verifier(&pair.code_verifier));
            assert_eq!(pair.code_verifier.len(), 43);
        }
    }

    #[test]
    fn custom_lengths_are_clamped() {
        assert_eq!(PkcePair::with_length(10).code_verifier.len(), 43);
        assert_eq!(PkcePair::with_length(64).code_verifier.len(), 64);
        assert_eq!(PkcePair::with_length(500).code_verifier.len(), 128);
    }

    #[test]
    fn verification_fails_on_mismatch() {
        let pair = PkcePair::generate();
        let other = PkcePair::generate();
        assert!(!verify(&pair.code_verifier, &other.code_challenge));
    }

    #[test]
    fn short_verifier_is_invalid() {
        assert!(!is_valid_verifier("tooshort"));
        assert!(!verify("tooshort", &challenge_for("tooshort")));
    }

    #[test]
    fn debug_redacts_verifier() {
        let pair = PkcePair::generate();
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains(&pair.code_verifier));
        assert!(rendered.contains("REDACTED"));
    }
}
