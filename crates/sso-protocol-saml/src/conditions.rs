//! Assertion condition checks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assertion::Conditions;

/// A failed condition check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionViolation {
    /// `NotBefore` is still in the future beyond the skew.
    NotYetValid {
        /// `NotBefore`.
        not_before: DateTime<Utc>,
    },
    /// `NotOnOrAfter` has passed beyond the skew.
    Expired {
        /// `NotOnOrAfter`.
        not_on_or_after: DateTime<Utc>,
    },
    /// None of the audiences names this SP.
    AudienceMismatch {
        /// Our entity id.
        expected: String,
        /// Audiences found.
        actual: Vec<String>,
    },
}

impl std::fmt::Display for ConditionViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotYetValid { not_before } => {
                write!(f, "assertion not valid before {}", not_before.to_rfc3339())
            }
            Self::Expired { not_on_or_after } => write!(
                f,
                "assertion expired at {} (NotOnOrAfter)",
                not_on_or_after.to_rfc3339()
            ),
            Self::AudienceMismatch { expected, actual } => write!(
                f,
                "audience {expected} not in [{}]",
                actual.join(", ")
            ),
        }
    }
}

/// Checks `conditions` at `now`, tolerating `clock_skew` on both bounds.
///
/// An empty audience list restricts nothing. Every violation is returned;
/// an empty list means the conditions hold.
#[must_use]
pub fn validate_conditions(
    conditions: &Conditions,
    expected_audience: Option<&str>,
    now: DateTime<Utc>,
    clock_skew: Duration,
) -> Vec<ConditionViolation> {
    let skew = chrono::Duration::from_std(clock_skew).unwrap_or(chrono::Duration::zero());
    let mut violations = Vec::new();

    if let Some(not_before) = conditions.not_before {
        if now + skew < not_before {
            violations.push(ConditionViolation::NotYetValid { not_before });
        }
    }
    if let Some(not_on_or_after) = conditions.not_on_or_after {
        if now - skew >= not_on_or_after {
            violations.push(ConditionViolation::Expired { not_on_or_after });
        }
    }
    if let Some(expected) = expected_audience {
        if !conditions.audiences.is_empty()
            && !conditions.audiences.iter().any(|a| a == expected)
        {
            violations.push(ConditionViolation::AudienceMismatch {
                expected: expected.to_string(),
                actual: conditions.audiences.clone(),
            });
        }
    }

    violations
}
