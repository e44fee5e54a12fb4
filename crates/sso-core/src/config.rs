//! Configuration management for the SSO core.
//!
//! Configuration is loaded from environment variables (optionally via a
//! `.env` file) with defaults suitable for a single-instance deployment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How violated SAML assertion conditions are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionPolicy {
    /// Log violations as warnings and accept the assertion.
    #[default]
    Warn,
    /// Reject assertions whose conditions are violated.
    Reject,
}

impl fmt::Display for ConditionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => f.write_str("warn"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for ConditionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(Error::Config(format!("unknown SAML condition policy: {other}"))),
        }
    }
}

/// Runtime configuration shared by every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Secret that seeds the manager-level token cipher.
    ///
    /// When absent an ephemeral per-process key is generated and everything
    /// encrypted with it becomes unreadable after a restart.
    #[serde(skip_serializing)]
    pub encryption_secret: Option<String>,

    /// Maximum number of active sessions per (user DID, provider) pair.
    pub max_sessions_per_user: usize,

    /// Session lifetime in seconds when the provider does not report `expires_in`.
    pub default_session_ttl_secs: u64,

    /// How long before expiry a scheduled refresh fires, in seconds.
    pub refresh_threshold_secs: u64,

    /// Per-request timeout for provider HTTP calls, in seconds.
    pub http_timeout_secs: u64,

    /// Upper bound on provider response bodies, in bytes.
    pub http_max_response_bytes: usize,

    /// Timeout for each connectivity probe, in seconds.
    pub connection_test_timeout_secs: u64,

    /// Lifetime of a pending authorization state, in seconds.
    pub pending_state_ttl_secs: u64,

    /// Interval between pending-state sweeps, in seconds.
    pub pending_sweep_interval_secs: u64,

    /// Maximum number of non-revoked identity links per DID.
    pub max_links_per_did: usize,

    /// Clock skew tolerated when checking SAML conditions, in seconds.
    pub saml_clock_skew_secs: i64,

    /// Treatment of violated SAML conditions.
    pub saml_condition_policy: ConditionPolicy,

    /// Reject SAML responses whose signature could not be verified.
    pub require_signature_verification: bool,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            encryption_secret: None,
            max_sessions_per_user: 10,
            default_session_ttl_secs: 3600,
            refresh_threshold_secs: 300,
            http_timeout_secs: 15,
            http_max_response_bytes: 1024 * 1024,
            connection_test_timeout_secs: 10,
            pending_state_ttl_secs: 600,
            pending_sweep_interval_secs: 60,
            max_links_per_did: 10,
            saml_clock_skew_secs: 300,
            saml_condition_policy: ConditionPolicy::Warn,
            require_signature_verification: false,
        }
    }
}

impl SsoConfig {
    /// Loads configuration from environment variables.
    ///
    /// Unset variables fall back to [`SsoConfig::default`]; set but
    /// unparseable variables are configuration errors.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let saml_condition_policy = match std::env::var("SSO_SAML_CONDITION_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.saml_condition_policy,
        };

        let require_signature_verification = std::env::var("SSO_REQUIRE_SIGNATURE_VERIFICATION")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(defaults.require_signature_verification);

        let config = Self {
            encryption_secret: std::env::var("SSO_ENCRYPTION_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            max_sessions_per_user: env_or("SSO_MAX_SESSIONS_PER_USER", defaults.max_sessions_per_user)?,
            default_session_ttl_secs: env_or("SSO_DEFAULT_SESSION_TTL", defaults.default_session_ttl_secs)?,
            refresh_threshold_secs: env_or("SSO_REFRESH_THRESHOLD", defaults.refresh_threshold_secs)?,
            http_timeout_secs: env_or("SSO_HTTP_TIMEOUT", defaults.http_timeout_secs)?,
            http_max_response_bytes: env_or(
                "SSO_HTTP_MAX_RESPONSE_BYTES",
                defaults.http_max_response_bytes,
            )?,
            connection_test_timeout_secs: env_or(
                "SSO_CONNECTION_TEST_TIMEOUT",
                defaults.connection_test_timeout_secs,
            )?,
            pending_state_ttl_secs: env_or("SSO_PENDING_STATE_TTL", defaults.pending_state_ttl_secs)?,
            pending_sweep_interval_secs: env_or(
                "SSO_PENDING_SWEEP_INTERVAL",
                defaults.pending_sweep_interval_secs,
            )?,
            max_links_per_did: env_or("SSO_MAX_LINKS_PER_DID", defaults.max_links_per_did)?,
            saml_clock_skew_secs: env_or("SSO_SAML_CLOCK_SKEW", defaults.saml_clock_skew_secs)?,
            saml_condition_policy,
            require_signature_verification,
        };

        config.validate()?;
        Ok(config)
    }

    /// Creates a configuration for testing with a fixed encryption secret.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            encryption_secret: Some("test-encryption-secret-do-not-use".to_string()),
            ..Self::default()
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions_per_user == 0 {
            return Err(Error::Config("max_sessions_per_user must be at least 1".to_string()));
        }
        if self.max_links_per_did == 0 {
            return Err(Error::Config("max_links_per_did must be at least 1".to_string()));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::Config("http_timeout_secs must be positive".to_string()));
        }
        if self.saml_clock_skew_secs < 0 {
            return Err(Error::Config("saml_clock_skew_secs must not be negative".to_string()));
        }
        Ok(())
    }

    /// Returns the HTTP request timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Returns the connectivity probe timeout.
    #[must_use]
    pub const fn connection_test_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_test_timeout_secs)
    }

    /// Returns the pending authorization state lifetime.
    #[must_use]
    pub const fn pending_state_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_state_ttl_secs)
    }

    /// Returns the pending-state sweep interval.
    #[must_use]
    pub const fn pending_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pending_sweep_interval_secs)
    }

    /// Returns the refresh threshold.
    #[must_use]
    pub const fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {key}: {value}"))),
        Err(_) => Ok(default),
    }
}
