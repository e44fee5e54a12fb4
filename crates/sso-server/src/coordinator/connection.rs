//! Provider connectivity checks.
//!
//! Endpoints are probed with `HEAD`; any status below 500 means the host is
//! up and serving. SAML providers additionally get a structural check of
//! the IdP certificate.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use uuid::Uuid;

use sso_model::ProviderType;
use sso_protocol_oidc::{HttpTransport, OidcError};

use super::flow::ProviderEngine;
use super::registry::CachedProvider;

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    /// What was checked, e.g. `token_endpoint`.
    pub name: String,
    /// Probed URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Whether the check passed.
    pub success: bool,
    /// HTTP status of the probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Time taken in milliseconds.
    pub latency_ms: u64,
    /// Failure reason or extra information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of `test_connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    /// Tested provider.
    pub provider_id: Uuid,
    /// Its type.
    pub provider_type: ProviderType,
    /// Whether every check passed.
    pub success: bool,
    /// Individual checks in a fixed order.
    pub checks: Vec<ConnectionCheck>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs every check for a provider. Probes run concurrently.
pub(crate) async fn test_provider(
    cached: &CachedProvider,
    transport: &HttpTransport,
    timeout: Duration,
) -> ConnectionTestResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let mut probes: Vec<(&'static str, Option<String>)> = Vec::new();
    match &cached.engine {
        ProviderEngine::OAuth(flow) => {
            let config = flow.client().config();
            probes.push(("authorization_endpoint", Some(config.authorization_endpoint.clone())));
            probes.push(("token_endpoint", Some(config.token_endpoint.clone())));
            if config.oidc || config.userinfo_endpoint.is_some() {
                probes.push(("userinfo_endpoint", config.userinfo_endpoint.clone()));
            }
            if let Some(discovery) = config.discovery_url() {
                probes.push(("discovery", Some(discovery)));
            }
        }
        ProviderEngine::Saml(flow) => {
            let config = flow.engine().config();
            probes.push(("sso_url", Some(config.sso_url.clone())));
            if let Some(slo) = &config.slo_url {
                probes.push(("slo_url", Some(slo.clone())));
            }
        }
    }

    let mut set = JoinSet::new();
    for (index, (name, target)) in probes.into_iter().enumerate() {
        let transport = transport.clone();
        set.spawn(async move { (index, probe(&transport, name, target, timeout).await) });
    }
    let mut probed = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => probed.push(result),
            Err(e) => tracing::warn!(error = %e, "connection probe task failed"),
        }
    }
    probed.sort_by_key(|(index, _)| *index);
    checks.extend(probed.into_iter().map(|(_, check)| check));

    if let Some(flow) = cached.engine.saml() {
        let started = Instant::now();
        let check = match flow.engine().validate_certificate() {
            Ok(info) => ConnectionCheck {
                name: "certificate".to_string(),
                target: None,
                success: true,
                status: None,
                latency_ms: elapsed_ms(started),
                message: Some(format!("{} valid until {}", info.subject, info.not_after)),
            },
            Err(e) => ConnectionCheck {
                name: "certificate".to_string(),
                target: None,
                success: false,
                status: None,
                latency_ms: elapsed_ms(started),
                message: Some(e.to_string()),
            },
        };
        checks.push(check);
    }

    let success = !checks.is_empty() && checks.iter().all(|c| c.success);
    tracing::info!(
        provider_id = %cached.provider.id,
        success,
        checks = checks.len(),
        "connection test finished"
    );
    ConnectionTestResult {
        provider_id: cached.provider.id,
        provider_type: cached.provider.provider_type,
        success,
        checks,
        duration_ms: elapsed_ms(started),
    }
}

async fn probe(
    transport: &HttpTransport,
    name: &'static str,
    target: Option<String>,
    timeout: Duration,
) -> ConnectionCheck {
    let started = Instant::now();
    let Some(url) = target else {
        return ConnectionCheck {
            name: name.to_string(),
            target: None,
            success: false,
            status: None,
            latency_ms: 0,
            message: Some("endpoint not configured".to_string()),
        };
    };

    let (success, status, message) = match transport.head(&url, timeout).await {
        Ok(status) if status < 500 => (true, Some(status), None),
        Ok(status) => (false, Some(status), Some(format!("server error {status}"))),
        Err(OidcError::Timeout) => (false, None, Some(format!("no response within {}s", timeout.as_secs()))),
        Err(e) => (false, None, Some(e.to_string())),
    };
    ConnectionCheck {
        name: name.to_string(),
        target: Some(url),
        success,
        status,
        latency_ms: elapsed_ms(started),
        message,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
