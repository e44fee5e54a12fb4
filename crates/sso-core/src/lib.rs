//! # sso-core
//!
//! Core configuration, error handling and audit events for the SSO core.
//!
//! Every other crate in the workspace depends on this one for the shared
//! [`SsoConfig`] and the security event pipeline.
//!
//! ## Modules
//!
//! - [`config`] - Runtime configuration loaded from the environment
//! - [`error`] - Workspace-level error type
//! - [`event`] - Security events and event sinks

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::{ConditionPolicy, SsoConfig};
pub use error::{Error, Result};
pub use event::{
    ChannelEventSink, Event, EventBuilder, EventOutcome, EventSink, EventType, TracingEventSink,
};
