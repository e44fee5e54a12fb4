//! DID to provider-subject identity mappings.
//!
//! Mappings are never hard-deleted. Unlinking moves a mapping to
//! [`MappingStatus::Revoked`], and a later link of the same triple reactivates
//! the row instead of inserting a new one.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Verification status of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    /// Linked but not yet verified.
    Pending,
    /// Verified by an explicit call.
    Verified,
    /// Temporarily disabled.
    Suspended,
    /// Unlinked; kept for audit.
    Revoked,
}

impl MappingStatus {
    /// Returns the wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }

    /// Pending or verified.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Verified)
    }

    /// Rank used by reverse lookup; lower wins. Revoked has no rank.
    #[must_use]
    pub const fn lookup_rank(&self) -> Option<u8> {
        match self {
            Self::Verified => Some(0),
            Self::Pending => Some(1),
            Self::Suspended => Some(2),
            Self::Revoked => None,
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile attributes captured from the provider at link time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAttributes {
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Group memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Everything the provider returned.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw_claims: Value,
}

impl IdentityAttributes {
    /// Builds attributes from an OIDC userinfo or ID-token claim set.
    #[must_use]
    pub fn from_claims(claims: &Value) -> Self {
        let text = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);
        let groups = claims
            .get("groups")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            email: text("email"),
            display_name: text("name").or_else(|| text("preferred_username")),
            groups,
            avatar_url: text("picture"),
            raw_claims: claims.clone(),
        }
    }
}

/// A link between a DID and a subject at a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMapping {
    /// Mapping ID.
    pub id: Uuid,
    /// Local DID.
    pub did: String,
    /// Provider ID.
    pub provider_id: String,
    /// Subject at the provider.
    pub sso_subject: String,
    /// Captured attributes.
    pub attributes: IdentityAttributes,
    /// Status.
    pub status: MappingStatus,
    /// When the mapping was last verified.
    pub verified_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl IdentityMapping {
    /// Creates a pending mapping.
    #[must_use]
    pub fn new(
        did: impl Into<String>,
        provider_id: impl Into<String>,
        sso_subject: impl Into<String>,
        attributes: IdentityAttributes,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            did: did.into(),
            provider_id: provider_id.into(),
            sso_subject: sso_subject.into(),
            attributes,
            status: MappingStatus::Pending,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns whether this mapping is pending or verified.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Sets the status and bumps `updated_at`.
    pub fn set_status(&mut self, status: MappingStatus) {
        self.status = status;
        if status == MappingStatus::Verified {
            self.verified_at = Some(Utc::now());
        }
        self.updated_at = Utc::now();
    }
}

/// Aggregate statistics over all mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingStats {
    /// All mappings including revoked.
    pub total: usize,
    /// Count per status.
    pub by_status: HashMap<MappingStatus, usize>,
    /// Non-revoked count per provider.
    pub by_provider: HashMap<String, usize>,
    /// DIDs with at least one pending or verified mapping.
    pub unique_dids: usize,
    /// Verified mappings.
    pub verified: usize,
    /// Pending mappings.
    pub pending: usize,
    /// Mappings created in the last 24 hours.
    pub created_last_24h: usize,
}
