use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::GatewayError;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use crate::secret::Secret;

/// Everything a [`Gateway`](crate::Gateway) needs, passed in at construction.
///
/// # Example
/// ```no_run
/// use gateway::{GatewayConfig, ProviderConfig, ProviderKind};
///
/// let cfg = GatewayConfig {
///     provider: ProviderConfig {
///         kind: ProviderKind::Vision,
///         endpoint: Some("https://my-vision.cognitiveservices.azure.com".into()),
///         api_key: Some("subscription-key".into()),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// cfg.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Fixed dimensionality every returned vector must have.
    pub dimensions: usize,
    /// Largest batch accepted per call.
    pub max_batch_size: usize,
    /// Upper bound on concurrent resolutions and concurrent provider sub-calls.
    pub max_concurrency: usize,
    /// Records per provider sub-call (further capped by what the provider accepts).
    pub provider_batch_size: usize,
    /// Deadline for a whole `embed` call. Nothing is returned if it elapses.
    #[serde(rename = "batch_timeout_ms", with = "crate::serde_millis")]
    pub batch_timeout: Duration,
    /// L2-normalize vectors before returning them.
    pub normalize: bool,
    pub resolve: ResolveConfig,
    pub provider: ProviderConfig,
    pub retry: RetryConfig,
    /// Circuit breaker on provider health; `None` disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Outbound throttle; `None` disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dimensions: 1024,
            max_batch_size: 10,
            max_concurrency: 8,
            provider_batch_size: 1,
            batch_timeout: Duration::from_secs(30),
            normalize: false,
            resolve: ResolveConfig::default(),
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
            rate_limit: None,
        }
    }
}

impl GatewayConfig {
    /// Reject configurations that could never produce a well-formed response.
    pub fn validate(&self) -> Result<(), GatewayError> {
        self.validate_limits()?;
        self.provider.validate()
    }

    /// Checks that do not depend on which provider is plugged in.
    pub fn validate_limits(&self) -> Result<(), GatewayError> {
        if self.dimensions == 0 {
            return Err(GatewayError::InvalidConfig(
                "dimensions must be greater than zero".into(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(GatewayError::InvalidConfig(
                "max_batch_size must be greater than zero".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(GatewayError::InvalidConfig(
                "max_concurrency must be greater than zero".into(),
            ));
        }
        if self.provider_batch_size == 0 {
            return Err(GatewayError::InvalidConfig(
                "provider_batch_size must be greater than zero".into(),
            ));
        }
        if self.provider.request_timeout > self.batch_timeout {
            return Err(GatewayError::InvalidConfig(format!(
                "provider request_timeout ({:?}) exceeds batch_timeout ({:?})",
                self.provider.request_timeout, self.batch_timeout
            )));
        }
        if let Some(rate) = &self.rate_limit {
            if rate.requests_per_second <= 0.0 || rate.burst_size == 0 {
                return Err(GatewayError::InvalidConfig(
                    "rate_limit needs a positive requests_per_second and burst_size".into(),
                ));
            }
        }
        Ok(())
    }
}

/// How image references are turned into something the provider can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    /// Hand the signed URL to the provider and let it fetch the image.
    #[default]
    Forward,
    /// Download the bytes through the gateway and upload them to the provider.
    Fetch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub mode: ResolveMode,
    /// Timeout for a single blob download in `fetch` mode.
    #[serde(rename = "timeout_ms", with = "crate::serde_millis")]
    pub timeout: Duration,
    /// Largest image accepted in `fetch` mode.
    pub max_image_bytes: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            mode: ResolveMode::Forward,
            timeout: Duration::from_secs(10),
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Which wire protocol the embedding provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Azure AI Vision style `retrieval:vectorizeImage` / `retrieval:vectorizeText`,
    /// one record per call.
    #[default]
    Vision,
    /// Generic batched JSON endpoint correlating inputs by id.
    Batch,
    /// Deterministic in-process vectors for local development.
    Stub,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Vision => "vision",
            ProviderKind::Batch => "batch",
            ProviderKind::Stub => "stub",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Base URL of the provider (required for `vision` and `batch`).
    pub endpoint: Option<String>,
    pub api_key: Option<Secret>,
    /// Header carrying the API key.
    pub api_key_header: String,
    /// `api-version` query parameter for `vision`.
    pub api_version: String,
    /// `model-version` query parameter for `vision`.
    pub model_version: String,
    /// Timeout for one provider sub-call attempt.
    #[serde(rename = "request_timeout_ms", with = "crate::serde_millis")]
    pub request_timeout: Duration,
    #[serde(rename = "connect_timeout_ms", with = "crate::serde_millis")]
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Whether images and texts land in one shared vector space. When false
    /// the gateway never mixes modalities in one sub-call.
    pub joint_embedding: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Vision,
            endpoint: None,
            api_key: None,
            api_key_header: "Ocp-Apim-Subscription-Key".into(),
            api_version: "2024-02-01".into(),
            model_version: "2023-04-15".into(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
            joint_embedding: true,
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.kind == ProviderKind::Stub {
            return Ok(());
        }
        let endpoint = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                GatewayError::InvalidConfig(format!(
                    "provider.endpoint is required for the {} provider",
                    self.kind.as_str()
                ))
            })?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(GatewayError::InvalidConfig(
                "provider.endpoint must be an http(s) URL".into(),
            ));
        }
        if self.api_key_header.trim().is_empty() {
            return Err(GatewayError::InvalidConfig(
                "provider.api_key_header must not be empty".into(),
            ));
        }
        Ok(())
    }
}
