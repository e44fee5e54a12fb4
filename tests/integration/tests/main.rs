//! End-to-End Integration Tests
//!
//! These tests drive the SSO coordinator over in-memory stores against
//! wiremock identity providers.

mod common;
mod auth_flows;
mod identity;
mod provider_admin;
mod saml_flows;
mod sessions;
