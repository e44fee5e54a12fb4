//! Security event logging for the SSO core.
//!
//! Every login, callback, refresh, logout and identity-link transition is
//! recorded as an [`Event`] and handed to an [`EventSink`]. Events include:
//! - Timestamp and unique id
//! - Event type and outcome
//! - Provider, DID and session (when available)
//! - Source IP (when available)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Authentication events
    /// Login initiated (redirect built).
    LoginInitiated,
    /// Login completed.
    Login,
    /// Login failed.
    LoginError,
    /// Logout.
    Logout,
    /// Token refresh.
    RefreshToken,
    /// Token refresh failed.
    RefreshTokenError,
    /// Token revoked at the provider.
    RevokeGrant,

    // Session events
    /// Session evicted because the per-user cap was reached.
    SessionEvicted,
    /// Session found expired.
    SessionExpired,

    // Provider configuration events
    /// Provider created.
    ProviderCreated,
    /// Provider updated.
    ProviderUpdated,
    /// Provider deleted.
    ProviderDeleted,

    // Identity events
    /// Identity linked (or reactivated).
    IdentityLinked,
    /// Identity link verified.
    IdentityVerified,
    /// Identity link suspended.
    IdentitySuspended,
    /// Identity unlinked.
    IdentityUnlinked,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A security event for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Outcome of the event.
    pub outcome: EventOutcome,

    /// Identity provider involved.
    pub provider_id: Option<String>,

    /// Local DID involved.
    pub did: Option<String>,

    /// Session ID.
    pub session_id: Option<String>,

    /// Source IP address.
    pub ip_address: Option<String>,

    /// Error message (for failure events).
    pub error: Option<String>,

    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Returns the value of a detail entry.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    provider_id: Option<String>,
    did: Option<String>,
    session_id: Option<String>,
    ip_address: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            provider_id: None,
            did: None,
            session_id: None,
            ip_address: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to success.
    #[must_use]
    pub const fn success(mut self) -> Self {
        self.outcome = EventOutcome::Success;
        self
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the provider ID.
    #[must_use]
    pub fn provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Sets the DID.
    #[must_use]
    pub fn did(mut self, did: impl Into<String>) -> Self {
        self.did = Some(did.into());
        self
    }

    /// Sets the DID if one is present.
    #[must_use]
    pub fn maybe_did(mut self, did: Option<&str>) -> Self {
        self.did = did.map(str::to_string);
        self
    }

    /// Sets the session ID.
    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the IP address.
    #[must_use]
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            provider_id: self.provider_id,
            did: self.did,
            session_id: self.session_id,
            ip_address: self.ip_address,
            error: self.error,
            details: self.details,
        }
    }
}

/// Destination for security events.
pub trait EventSink: Send + Sync {
    /// Records an event. Must not block.
    fn emit(&self, event: Event);
}

/// Sink that writes events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        log_event(&event);
    }
}

/// Sink that logs events and broadcasts them to subscribers.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: broadcast::Sender<Event>,
}

impl ChannelEventSink {
    /// Creates a sink buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for ChannelEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: Event) {
        log_event(&event);
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

fn log_event(event: &Event) {
    match event.outcome {
        EventOutcome::Success => tracing::info!(
            event_id = %event.id,
            event_type = ?event.event_type,
            provider_id = event.provider_id.as_deref(),
            did = event.did.as_deref(),
            session_id = event.session_id.as_deref(),
            "security event"
        ),
        EventOutcome::Failure => tracing::warn!(
            event_id = %event.id,
            event_type = ?event.event_type,
            provider_id = event.provider_id.as_deref(),
            did = event.did.as_deref(),
            session_id = event.session_id.as_deref(),
            error = event.error.as_deref(),
            "security event failed"
        ),
    }
}
