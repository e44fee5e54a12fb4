//! # sso-crypto
//!
//! Cryptographic operations for the SSO core using aws-lc-rs.
//!
//! - [`random`] - state tokens, nonces and identifiers
//! - [`hash`] - SHA-256 digests
//! - [`pkce`] - RFC 7636 verifier/challenge pairs
//! - [`cipher`] - AES-256-GCM encryption of tokens and secrets at rest

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod error;
pub mod hash;
pub mod pkce;
pub mod random;

pub use cipher::{CipherScope, TokenCipher};
pub use error::{CryptoError, CryptoResult};
pub use hash::{sha256, sha256_base64url};
pub use pkce::PkcePair;
