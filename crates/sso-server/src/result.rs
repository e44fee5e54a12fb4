//! The envelope every public coordinator operation returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Error part of an [`OperationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct OperationError {
    /// Stable machine-readable code, e.g. `INVALID_STATE`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&CoordinatorError> for OperationError {
    fn from(err: &CoordinatorError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// `{ success, data?, error? }`, serialized as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl<T> OperationResult<T> {
    /// A successful result.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(err: &CoordinatorError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.into()),
        }
    }

    /// Returns the error code of a failed result.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    /// Converts back into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<T, OperationError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(OperationError {
                code: "INTERNAL_ERROR".to_string(),
                message: "operation returned no data".to_string(),
                details: None,
            }),
        }
    }
}

impl<T> From<CoordinatorResult<T>> for OperationResult<T> {
    fn from(result: CoordinatorResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(&err),
        }
    }
}

/// Logs a failed operation and wraps the result.
pub(crate) fn respond<T>(operation: &'static str, result: CoordinatorResult<T>) -> OperationResult<T> {
    if let Err(err) = &result {
        if err.is_server_error() {
            tracing::error!(operation, code = err.code(), error = %err, "operation failed");
        } else {
            tracing::debug!(operation, code = err.code(), error = %err, "operation failed");
        }
    }
    result.into()
}
