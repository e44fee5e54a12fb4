//! # sso-server
//!
//! SSO coordinator and the `sso-server` binary.
//!
//! This crate ties the lower layers together:
//! - Provider registry with encrypted secrets and a decrypted cache
//! - Login orchestration for OAuth 2.0 / OIDC (PKCE) and SAML 2.0
//! - Logout with best-effort token revocation, token refresh
//! - Session and identity-link operations
//!
//! Every coordinator operation returns an [`OperationResult`], the camelCase
//! `{ success, data?, error? }` envelope.
//!
//! ## Usage
//!
//! ```ignore
//! use sso_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config)?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod result;

pub use config::ServerConfig;
pub use coordinator::{
    CallbackParams, CallbackResult, CleanupResult, ConnectionCheck, ConnectionTestResult,
    CoordinatorBuilder, LoginInitiation, LoginOptions, LogoutResult, LogoutTarget, NewProvider,
    PendingAuthorization, ProviderDeletion, ProviderFilter, ProviderUpdate, SsoCoordinator,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use result::{OperationError, OperationResult};

use std::sync::Arc;

use tokio::task::JoinHandle;

/// The SSO server: a coordinator plus its background maintenance.
pub struct Server {
    config: ServerConfig,
    coordinator: Arc<SsoCoordinator>,
}

impl Server {
    /// Creates a server over in-memory stores.
    ///
    /// Must be called inside a Tokio runtime so the pending-state sweep
    /// starts.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let coordinator = SsoCoordinator::builder(config.sso.clone())
            .event_capacity(config.event_channel_capacity)
            .build()?;

        tracing::info!(
            session_sweep_secs = config.session_sweep_interval_secs,
            pending_sweep_secs = config.pending_sweep_interval().as_secs(),
            "SSO server initialized"
        );
        Ok(Self { config, coordinator })
    }

    /// Returns the coordinator.
    #[must_use]
    pub fn coordinator(&self) -> Arc<SsoCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs until a shutdown signal arrives, then shuts the coordinator
    /// down.
    pub async fn run(self) -> anyhow::Result<()> {
        let sweeper = self.spawn_session_sweep();

        shutdown_signal().await;

        sweeper.abort();
        self.coordinator.shutdown();
        tracing::info!("Server shutdown complete");
        Ok(())
    }

    fn spawn_session_sweep(&self) -> JoinHandle<()> {
        let coordinator = Arc::clone(&self.coordinator);
        let interval = self.config.session_sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match coordinator.clean_expired_sessions().await.into_result() {
                    Ok(cleanup) if cleanup.removed > 0 => {
                        tracing::info!(removed = cleanup.removed, "expired sessions removed");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(code = %e.code, error = %e.message, "session sweep failed"),
                }
            }
        })
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
