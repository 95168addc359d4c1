//! Embedding providers.
//!
//! A provider turns a slice of [`ProviderInput`]s into vectors. Every input
//! carries a gateway-assigned `key`; outputs are matched back to inputs by
//! that key alone, so a provider may answer in any order, drop inputs, or
//! report per-input errors without breaking correlation.

mod http;
mod stub;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ErrorCode, GatewayError, RecordError};
use crate::resilience::Retryable;
use crate::types::Modality;

pub use http::HttpProvider;
pub use stub::StubProvider;

/// What the provider is asked to embed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderContent {
    /// Signed image URL the provider fetches itself. Contains a credential
    /// when the caller supplied an access token; never log it.
    ImageUrl(String),
    /// Image bytes downloaded by the gateway.
    ImageBytes(Bytes),
    Text(String),
}

impl ProviderContent {
    pub fn modality(&self) -> Modality {
        match self {
            ProviderContent::ImageUrl(_) | ProviderContent::ImageBytes(_) => Modality::Image,
            ProviderContent::Text(_) => Modality::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderInput {
    /// Correlation key, unique within one gateway call.
    pub key: usize,
    pub content: ProviderContent,
}

impl ProviderInput {
    pub fn new(key: usize, content: ProviderContent) -> Self {
        Self { key, content }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub key: usize,
    pub result: Result<Vec<f32>, RecordError>,
}

impl ProviderOutput {
    pub fn vector(key: usize, vector: Vec<f32>) -> Self {
        Self {
            key,
            result: Ok(vector),
        }
    }

    pub fn error(key: usize, error: RecordError) -> Self {
        Self {
            key,
            result: Err(error),
        }
    }
}

/// Failure of a whole provider sub-call. Every record in the sub-call
/// inherits the resulting [`ErrorCode`].
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider answered {status}: {message}")]
    Unavailable { status: u16, message: String },
    #[error("could not reach provider: {0}")]
    Connect(String),
    #[error("provider rejected the request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("provider circuit is open")]
    CircuitOpen,
    #[error("outbound rate limit exhausted")]
    Throttled,
}

impl ProviderError {
    /// Whether this failure says something about provider health. Rejections
    /// of bad input and throttling do not.
    pub fn is_provider_fault(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::Unavailable { .. }
                | ProviderError::Connect(_)
                | ProviderError::Malformed(_)
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::Timeout(_) => ErrorCode::ProviderTimeout,
            ProviderError::RateLimited { .. } | ProviderError::Throttled => {
                ErrorCode::ProviderRateLimited
            }
            ProviderError::Unavailable { .. }
            | ProviderError::Connect(_)
            | ProviderError::CircuitOpen => ErrorCode::ProviderUnavailable,
            ProviderError::Malformed(_) => ErrorCode::ProviderContractViolation,
            // Bad credentials on our side: nothing the caller can fix.
            ProviderError::Rejected {
                status: 401 | 403, ..
            } => ErrorCode::ProviderUnavailable,
            ProviderError::Rejected { code, .. } => classify_rejection(code),
        }
    }

    pub fn record_error(&self) -> RecordError {
        RecordError::new(self.code(), self.to_string())
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Unavailable { .. }
                | ProviderError::Connect(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Image fetch failures reported by Azure AI Vision style providers.
const IMAGE_FETCH_CODES: &[&str] = &[
    "InvalidImageUrl",
    "InvalidImageUrlOrContent",
    "FailedToDownloadImage",
];

/// Map a provider rejection code to the taxonomy. Codes already in the
/// taxonomy (batch providers may use them) pass straight through.
pub(crate) fn classify_rejection(code: &str) -> ErrorCode {
    if let Ok(known) = serde_json::from_value::<ErrorCode>(serde_json::Value::String(code.into()))
    {
        return known;
    }
    if IMAGE_FETCH_CODES.contains(&code) {
        ErrorCode::ResourceUnreachable
    } else {
        ErrorCode::InvalidInput
    }
}

/// A remote (or local) multimodal embedding model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &str;

    /// Most inputs accepted in one `embed` call.
    fn max_batch_size(&self) -> usize {
        1
    }

    /// Whether images and texts share one vector space, i.e. whether a
    /// single call may mix modalities.
    fn joint_embedding(&self) -> bool {
        true
    }

    /// Embed `inputs`. `Err` fails every input in the call; per-input
    /// failures go in the returned outputs instead.
    async fn embed(&self, inputs: &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError>;
}

/// Build the provider named by `config.kind`.
pub fn build_provider(
    config: &ProviderConfig,
    dimensions: usize,
) -> Result<Arc<dyn EmbeddingProvider>, GatewayError> {
    config.validate()?;
    let provider: Arc<dyn EmbeddingProvider> = match config.kind {
        ProviderKind::Vision | ProviderKind::Batch => Arc::new(HttpProvider::new(config)?),
        ProviderKind::Stub => Arc::new(StubProvider::new(dimensions)),
    };
    Ok(provider)
}
