use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::RecordId;

/// Call-level failures. Anything here fails the whole batch; per-record
/// problems are reported in-line as [`RecordError`] instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration is inconsistent (zero dimensions, missing endpoint, ...).
    #[error("invalid gateway config: {0}")]
    InvalidConfig(String),
    /// The request carried no records.
    #[error("batch must contain at least one record")]
    EmptyBatch,
    /// The request carried more records than the configured maximum.
    #[error("batch of {size} records exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },
    /// Two records share an identifier, so results could not be correlated.
    #[error("duplicate recordId {0} in batch")]
    DuplicateRecordId(RecordId),
    /// No record could reach the embedding provider.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The overall batch deadline elapsed before every record finished.
    #[error("batch did not complete within {0:?}")]
    Timeout(std::time::Duration),
    /// The outbound HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Client(String),
}

impl GatewayError {
    /// Structural request errors are the caller's fault (HTTP 4xx).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GatewayError::EmptyBatch
                | GatewayError::BatchTooLarge { .. }
                | GatewayError::DuplicateRecordId(_)
        )
    }
}

/// Per-record error taxonomy. Serialized in snake_case, which is also the
/// string reported back to callers in the response `errors[].message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    ResourceNotFound,
    ResourceUnauthorized,
    ResourceUnreachable,
    ProviderTimeout,
    ProviderRateLimited,
    ProviderContractViolation,
    ProviderNoResult,
    ProviderUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::ResourceNotFound => "resource_not_found",
            ErrorCode::ResourceUnauthorized => "resource_unauthorized",
            ErrorCode::ResourceUnreachable => "resource_unreachable",
            ErrorCode::ProviderTimeout => "provider_timeout",
            ErrorCode::ProviderRateLimited => "provider_rate_limited",
            ErrorCode::ProviderContractViolation => "provider_contract_violation",
            ErrorCode::ProviderNoResult => "provider_no_result",
            ErrorCode::ProviderUnavailable => "provider_unavailable",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single record failed. `message` is operator-facing detail and must
/// not contain credentials; callers only ever see `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub code: ErrorCode,
    pub message: String,
}

impl RecordError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RecordError {}
