//! Server configuration.
//!
//! Wraps the shared [`SsoConfig`] with the settings only the binary needs.
//! Loaded from environment variables with sensible defaults.

use std::time::Duration;

use sso_core::SsoConfig;

/// Configuration of the `sso-server` binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Coordinator configuration.
    pub sso: SsoConfig,

    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Interval of the expired-session sweep in seconds.
    pub session_sweep_interval_secs: u64,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let sso = SsoConfig::from_env()?;

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let session_sweep_interval_secs = std::env::var("SSO_SESSION_SWEEP_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300); // 5 minutes

        let event_channel_capacity = std::env::var("SSO_EVENT_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);

        if session_sweep_interval_secs == 0 {
            anyhow::bail!("SSO_SESSION_SWEEP_INTERVAL must be positive");
        }

        Ok(Self {
            sso,
            log_level,
            session_sweep_interval_secs,
            event_channel_capacity,
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            sso: SsoConfig::for_testing(),
            log_level: "debug".to_string(),
            session_sweep_interval_secs: 60,
            event_channel_capacity: 256,
        }
    }

    /// Returns the expired-session sweep interval.
    #[must_use]
    pub const fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }

    /// Returns the pending-state sweep interval.
    #[must_use]
    pub const fn pending_sweep_interval(&self) -> Duration {
        self.sso.pending_sweep_interval()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sso: SsoConfig::default(),
            log_level: "info".to_string(),
            session_sweep_interval_secs: 300,
            event_channel_capacity: 1024,
        }
    }
}
