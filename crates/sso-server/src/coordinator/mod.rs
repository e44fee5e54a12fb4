//! The SSO coordinator.
//!
//! Ties the protocol engines, the session manager and the identity bridge
//! together behind one set of operations. Every public operation returns an
//! [`OperationResult`](crate::OperationResult) and never panics on bad input.
//!
//! All mutable state (provider cache, pending states, refresh timers, the
//! sweep task) belongs to one coordinator instance and is released by
//! [`SsoCoordinator::shutdown`].

mod auth;
mod connection;
mod flow;
mod operations;
mod pending;
mod registry;
mod types;

pub use connection::{ConnectionCheck, ConnectionTestResult};
pub use pending::PendingAuthorization;
pub use registry::{ENCRYPTED_PREFIX, REDACTED};
pub use types::{
    CallbackParams, CallbackResult, CleanupResult, LoginInitiation, LoginOptions, LogoutResult,
    LogoutTarget, NewProvider, ProviderDeletion, ProviderFilter, ProviderUpdate,
};

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sso_core::{ChannelEventSink, Event, EventSink, SsoConfig};
use sso_crypto::TokenCipher;
use sso_federation::IdentityBridge;
use sso_protocol_oidc::{HttpConfig, HttpTransport};
use sso_protocol_saml::{SignatureVerifier, ValidationSettings};
use sso_session::{RefreshError, RefreshHandler, SessionManager, SessionSettings};
use sso_storage::{
    IdentityMappingStore, InMemoryIdentityMappingStore, InMemoryProviderConfigStore,
    InMemorySessionStore, ProviderConfigStore, SessionStore,
};

use crate::error::CoordinatorResult;

use self::pending::PendingStates;
use self::registry::ProviderRegistry;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Builder for [`SsoCoordinator`]. Stores default to in-memory ones.
#[must_use]
pub struct CoordinatorBuilder {
    config: SsoConfig,
    provider_store: Option<Arc<dyn ProviderConfigStore>>,
    session_store: Option<Arc<dyn SessionStore>>,
    mapping_store: Option<Arc<dyn IdentityMappingStore>>,
    session_cipher: Option<TokenCipher>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    event_capacity: usize,
}

impl CoordinatorBuilder {
    /// Uses a provider configuration store.
    pub fn provider_store(mut self, store: Arc<dyn ProviderConfigStore>) -> Self {
        self.provider_store = Some(store);
        self
    }

    /// Uses a session store.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Uses an identity mapping store.
    pub fn mapping_store(mut self, store: Arc<dyn IdentityMappingStore>) -> Self {
        self.mapping_store = Some(store);
        self
    }

    /// Encrypts session tokens with `cipher` instead of the machine-bound
    /// key.
    pub fn session_cipher(mut self, cipher: TokenCipher) -> Self {
        self.session_cipher = Some(cipher);
        self
    }

    /// Verifies SAML response signatures with `verifier`.
    pub fn signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Sets the event broadcast capacity.
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Builds the coordinator.
    ///
    /// Inside a Tokio runtime this also starts the pending-state sweep.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or encryption key.
    pub fn build(self) -> CoordinatorResult<Arc<SsoCoordinator>> {
        let config = self.config;
        config.validate()?;

        let events = Arc::new(ChannelEventSink::new(self.event_capacity));
        let sink: Arc<dyn EventSink> = events.clone();

        let transport = HttpTransport::new(HttpConfig {
            timeout: config.http_timeout(),
            max_response_bytes: config.http_max_response_bytes,
        })?;
        let manager_cipher = TokenCipher::for_manager(config.encryption_secret.as_deref())?;

        let registry = ProviderRegistry::new(
            self.provider_store
                .unwrap_or_else(|| Arc::new(InMemoryProviderConfigStore::new())),
            manager_cipher,
            transport,
            ValidationSettings::from_sso_config(&config),
            self.verifier,
            Arc::clone(&sink),
        );

        let session_store = self
            .session_store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        let settings = SessionSettings::from_sso_config(&config);
        let sessions = match self.session_cipher {
            Some(cipher) => SessionManager::with_cipher(session_store, settings, Arc::clone(&sink), cipher),
            None => SessionManager::new(session_store, settings, Arc::clone(&sink))?,
        };

        let bridge = IdentityBridge::new(
            self.mapping_store
                .unwrap_or_else(|| Arc::new(InMemoryIdentityMappingStore::new())),
            Arc::clone(&sink),
            config.max_links_per_did,
        );

        let coordinator = Arc::new(SsoCoordinator {
            pending: PendingStates::new(config.pending_state_ttl()),
            config,
            registry,
            sessions,
            bridge,
            events,
            sweep: parking_lot::Mutex::new(None),
        });

        let weak: Weak<SsoCoordinator> = Arc::downgrade(&coordinator);
        let handler: Weak<dyn RefreshHandler> = weak;
        coordinator.sessions.set_refresh_handler(handler);
        coordinator.start_pending_sweep();

        info!(
            max_sessions_per_user = coordinator.config.max_sessions_per_user,
            condition_policy = ?coordinator.config.saml_condition_policy,
            "SSO coordinator ready"
        );
        Ok(coordinator)
    }
}

/// Orchestrates providers, logins, sessions and identity links.
pub struct SsoCoordinator {
    config: SsoConfig,
    registry: ProviderRegistry,
    pending: PendingStates,
    sessions: SessionManager,
    bridge: IdentityBridge,
    events: Arc<ChannelEventSink>,
    sweep: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SsoCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoCoordinator")
            .field("registry", &self.registry)
            .field("pending", &self.pending.len())
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl SsoCoordinator {
    /// Starts building a coordinator.
    pub fn builder(config: SsoConfig) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            provider_store: None,
            session_store: None,
            mapping_store: None,
            session_cipher: None,
            verifier: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Builds a coordinator over in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or encryption key.
    pub fn new(config: SsoConfig) -> CoordinatorResult<Arc<Self>> {
        Self::builder(config).build()
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &SsoConfig {
        &self.config
    }

    /// The session manager.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The identity bridge.
    #[must_use]
    pub const fn bridge(&self) -> &IdentityBridge {
        &self.bridge
    }

    /// Number of logins awaiting their callback.
    #[must_use]
    pub fn pending_logins(&self) -> usize {
        self.pending.len()
    }

    /// Subscribes to security events emitted after this call.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    /// Drops pending states older than the TTL. Returns how many.
    pub fn sweep_pending_states(&self) -> usize {
        let removed = self.pending.sweep(Utc::now());
        if removed > 0 {
            debug!(removed, "expired pending states swept");
        }
        removed
    }

    /// Cancels refresh timers and the sweep task, and clears the pending
    /// table and the provider cache.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweep.lock().take() {
            handle.abort();
        }
        let timers = self.sessions.shutdown();
        let pending = self.pending.clear();
        let cached = self.registry.clear_cache();
        info!(timers, pending, cached, "SSO coordinator shut down");
    }

    fn start_pending_sweep(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no Tokio runtime; pending-state sweep not started");
            return;
        };

        let interval = self.config.pending_sweep_interval().max(Duration::from_secs(1));
        let weak = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else { break };
                coordinator.sweep_pending_states();
            }
        });
        *self.sweep.lock() = Some(handle);
    }
}

impl Drop for SsoCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl RefreshHandler for SsoCoordinator {
    async fn refresh_session(&self, session_id: &str) -> Result<(), RefreshError> {
        self.refresh_session_tokens(session_id)
            .await
            .map(|_| ())
            .map_err(|e| Box::new(e) as RefreshError)
    }
}
