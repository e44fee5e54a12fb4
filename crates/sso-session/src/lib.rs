//! # sso-session
//!
//! Encrypted SSO session management.
//!
//! Sessions hold the provider tokens in a single AES-256-GCM blob bound to
//! the session id and to this machine. The [`SessionManager`] enforces the
//! per-(DID, provider) cap, expires sessions lazily on read and arms a
//! [`RefreshScheduler`] timer for sessions that carry a refresh token.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod manager;
pub mod scheduler;

pub use error::{SessionError, SessionResult};
pub use manager::{CreatedSession, DecryptedSession, RefreshGuard, SessionContext, SessionManager, SessionSettings};
pub use scheduler::{RefreshError, RefreshHandler, RefreshScheduler};
