//! Turning an [`ImageReference`] into something a provider can embed.
//!
//! In `forward` mode the access token is appended to the URL and the signed
//! URL is handed to the provider. In `fetch` mode the gateway downloads the
//! blob itself, which lets it tell "not found" from "unauthorized" before
//! the provider is involved.

use bytes::BytesMut;
use reqwest::StatusCode;

use crate::config::{ResolveConfig, ResolveMode};
use crate::error::{ErrorCode, GatewayError, RecordError};
use crate::provider::ProviderContent;
use crate::secret::{redact_url, Secret};
use crate::types::ImageReference;

/// Append an opaque access token to `url` as its query string. The token is
/// never parsed: a leading `?` is tolerated, and `&` joins it onto a URL
/// that already has a query.
pub fn sign_url(url: &str, token: Option<&Secret>) -> String {
    let token = match token {
        Some(token) if !token.is_empty() => token.expose().trim(),
        _ => return url.to_owned(),
    };
    let token = token.strip_prefix('?').unwrap_or(token);
    if token.is_empty() {
        return url.to_owned();
    }

    let separator = if url.contains('?') {
        if url.ends_with('?') || url.ends_with('&') {
            ""
        } else {
            "&"
        }
    } else {
        "?"
    };
    format!("{url}{separator}{token}")
}

/// Only absolute http(s) URLs with a host are accepted.
pub fn validate_image_url(url: &str) -> Result<(), RecordError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(RecordError::invalid_input("imageUrl is empty"));
    }
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|_| RecordError::invalid_input("imageUrl is not a valid absolute URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RecordError::invalid_input("imageUrl must use http or https"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(RecordError::invalid_input("imageUrl has no host"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ImageResolver {
    config: ResolveConfig,
    client: reqwest::Client,
}

impl ImageResolver {
    pub fn new(config: ResolveConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn mode(&self) -> ResolveMode {
        self.config.mode
    }

    pub async fn resolve(&self, image: &ImageReference) -> Result<ProviderContent, RecordError> {
        validate_image_url(&image.url)?;
        let signed = sign_url(image.url.trim(), image.access_token.as_ref());
        match self.config.mode {
            ResolveMode::Forward => Ok(ProviderContent::ImageUrl(signed)),
            ResolveMode::Fetch => self.fetch(&signed).await.map(ProviderContent::ImageBytes),
        }
    }

    async fn fetch(&self, signed: &str) -> Result<bytes::Bytes, RecordError> {
        let shown = redact_url(signed);
        let mut response = self.client.get(signed).send().await.map_err(|e| {
            tracing::debug!(url = %shown, error = %e.without_url(), "image download failed");
            RecordError::new(ErrorCode::ResourceUnreachable, "image could not be downloaded")
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %shown, status = status.as_u16(), "image download rejected");
            return Err(status_to_error(status));
        }

        let max = self.config.max_image_bytes;
        if response.content_length().is_some_and(|len| len as usize > max) {
            return Err(too_large(max));
        }

        let mut body = BytesMut::new();
        loop {
            let chunk = response.chunk().await.map_err(|e| {
                tracing::debug!(url = %shown, error = %e.without_url(), "image download interrupted");
                RecordError::new(ErrorCode::ResourceUnreachable, "image download was interrupted")
            })?;
            let Some(chunk) = chunk else { break };
            if body.len() + chunk.len() > max {
                return Err(too_large(max));
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(RecordError::invalid_input("image is empty"));
        }
        Ok(body.freeze())
    }
}

fn status_to_error(status: StatusCode) -> RecordError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            RecordError::new(ErrorCode::ResourceNotFound, "image does not exist")
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RecordError::new(
            ErrorCode::ResourceUnauthorized,
            "access to the image was denied",
        ),
        other => RecordError::new(
            ErrorCode::ResourceUnreachable,
            format!("image host answered {}", other.as_u16()),
        ),
    }
}

fn too_large(max: usize) -> RecordError {
    RecordError::invalid_input(format!("image exceeds {max} bytes"))
}
