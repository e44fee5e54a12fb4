//! Token-at-rest encryption.
//!
//! [`TokenCipher`] seals token bundles and provider secrets with AES-256-GCM.
//! The wire format is `base64(nonce || ciphertext || tag)` with a fresh
//! 96-bit nonce per message.
//!
//! Two instantiations are used in practice:
//! - a manager-scoped cipher keyed from `SSO_ENCRYPTION_KEY` (or an
//!   ephemeral per-process key when unset)
//! - a session-scoped cipher whose key is derived from characteristics of
//!   the host, so session blobs copied to another machine do not decrypt

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use aws_lc_rs::hkdf;
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const HKDF_SALT: &[u8] = b"sso-core/token-cipher/v1";

/// Which key a cipher was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherScope {
    /// Key derived from a configured secret.
    Manager,
    /// Random key that lives only as long as the process.
    Ephemeral,
    /// Key derived from host characteristics.
    Machine,
}

/// AES-256-GCM cipher for opaque token strings.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; KEY_LEN],
    scope: CipherScope,
}

impl TokenCipher {
    /// Builds a cipher from a configured secret.
    ///
    /// A secret that is valid base64 for exactly 32 bytes is used as the raw
    /// key; anything else is treated as a passphrase and stretched with
    /// HKDF-SHA256.
    pub fn from_secret(secret: &str) -> CryptoResult<Self> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey("secret must not be empty".to_string()));
        }

        let key = match STANDARD.decode(secret.trim()) {
            Ok(raw) if raw.len() == KEY_LEN => {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&raw);
                key
            }
            _ => derive_key(secret.as_bytes(), b"manager")?,
        };

        Ok(Self {
            key,
            scope: CipherScope::Manager,
        })
    }

    /// Builds a cipher with a random key that is never persisted.
    pub fn ephemeral() -> CryptoResult<Self> {
        let mut key = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CryptoError::Random)?;
        Ok(Self {
            key,
            scope: CipherScope::Ephemeral,
        })
    }

    /// Builds the manager cipher from an optional secret.
    ///
    /// Without a secret the cipher is ephemeral and a warning is logged,
    /// since encrypted sessions and provider secrets will not survive a
    /// restart.
    pub fn for_manager(secret: Option<&str>) -> CryptoResult<Self> {
        match secret {
            Some(secret) => Self::from_secret(secret),
            None => {
                tracing::warn!(
                    "SSO_ENCRYPTION_KEY is not set; using an ephemeral key. \
                     Encrypted sessions and provider secrets will be unreadable after restart"
                );
                Self::ephemeral()
            }
        }
    }

    /// Builds a cipher keyed from characteristics of the current machine.
    pub fn machine_bound() -> CryptoResult<Self> {
        let fingerprint = machine_fingerprint();
        let key = derive_key(fingerprint.as_bytes(), b"session")?;
        Ok(Self {
            key,
            scope: CipherScope::Machine,
        })
    }

    /// Returns the key scope.
    #[must_use]
    pub const fn scope(&self) -> CipherScope {
        self.scope
    }

    /// Encrypts a string.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        self.seal(plaintext.as_bytes(), &[])
    }

    /// Decrypts a string produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> CryptoResult<String> {
        let plaintext = self.open(encoded, &[])?;
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".to_string()))
    }

    /// Encrypts a string bound to a context label (e.g. a session id).
    ///
    /// The same context must be supplied to decrypt.
    pub fn encrypt_bound(&self, plaintext: &str, context: &str) -> CryptoResult<String> {
        self.seal(plaintext.as_bytes(), context.as_bytes())
    }

    /// Decrypts a string produced by [`TokenCipher::encrypt_bound`].
    pub fn decrypt_bound(&self, encoded: &str, context: &str) -> CryptoResult<String> {
        let plaintext = self.open(encoded, context.as_bytes())?;
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".to_string()))
    }

    fn sealing_key(&self) -> CryptoResult<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| CryptoError::InvalidKey("AES-256-GCM key rejected".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Random)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let key = self.sealing_key()?;
        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| CryptoError::Encryption)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + in_out.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&in_out);
        Ok(STANDARD.encode(combined))
    }

    fn open(&self, encoded: &str, aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let combined = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::Decryption("ciphertext is not valid base64".to_string()))?;

        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CryptoError::Decryption("invalid nonce".to_string()))?;

        let key = self.sealing_key()?;
        let mut in_out = sealed.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| CryptoError::Decryption("authentication tag mismatch".to_string()))?;
        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

struct KeyLen(usize);

impl hkdf::KeyType for KeyLen {
    fn len(&self) -> usize {
        self.0
    }
}

fn derive_key(ikm: &[u8], info: &[u8]) -> CryptoResult<[u8; KEY_LEN]> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT);
    let prk = salt.extract(ikm);
    let info = [info];
    let okm = prk
        .expand(&info, KeyLen(KEY_LEN))
        .map_err(|_| CryptoError::KeyDerivation)?;

    let mut key = [0u8; KEY_LEN];
    okm.fill(&mut key).map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

/// Collects stable host characteristics.
///
/// Missing sources are skipped; the OS and architecture are always present
/// so the fingerprint is never empty.
fn machine_fingerprint() -> String {
    let mut parts: Vec<String> = vec![
        std::env::consts::OS.to_string(),
        std::env::consts::ARCH.to_string(),
    ];

    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id", "/etc/hostname"] {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }

    for var in ["HOSTNAME", "COMPUTERNAME", "USER", "USERNAME"] {
        if let Ok(value) = std::env::var(var) {
            parts.push(value);
        }
    }

    parts.join("|")
}
