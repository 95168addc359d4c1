use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{
    classify_rejection, EmbeddingProvider, ProviderContent, ProviderError, ProviderInput,
    ProviderOutput,
};
use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ErrorCode, GatewayError, RecordError};
use crate::secret::scrub_urls;
use crate::types::Modality;

/// Inputs per call accepted by the batched wire format.
const BATCH_MAX_INPUTS: usize = 256;
/// Longest upstream error text kept for logs.
const MAX_ERROR_TEXT: usize = 256;

/// Provider reached over HTTP, speaking either the Azure AI Vision
/// `retrieval:vectorize*` protocol or the batched JSON protocol.
#[derive(Debug)]
pub struct HttpProvider {
    client: reqwest::Client,
    kind: ProviderKind,
    endpoint: String,
    api_key: Option<(HeaderName, HeaderValue)>,
    api_version: String,
    model_version: String,
    request_timeout: Duration,
    joint_embedding: bool,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        Self::with_client(config, client)
    }

    /// Use a caller-built client (shared pool, custom TLS, ...).
    pub fn with_client(config: &ProviderConfig, client: reqwest::Client) -> Result<Self, GatewayError> {
        if config.kind == ProviderKind::Stub {
            return Err(GatewayError::InvalidConfig(
                "the stub provider does not speak HTTP".into(),
            ));
        }
        let endpoint = config
            .endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| GatewayError::InvalidConfig("provider.endpoint is required".into()))?
            .to_owned();

        let api_key = match &config.api_key {
            Some(key) if !key.is_empty() => {
                let name = HeaderName::from_bytes(config.api_key_header.trim().as_bytes())
                    .map_err(|_| {
                        GatewayError::InvalidConfig(format!(
                            "provider.api_key_header {:?} is not a valid header name",
                            config.api_key_header
                        ))
                    })?;
                let mut value = HeaderValue::from_str(key.expose().trim()).map_err(|_| {
                    GatewayError::InvalidConfig("provider.api_key is not a valid header value".into())
                })?;
                value.set_sensitive(true);
                Some((name, value))
            }
            _ => None,
        };

        Ok(Self {
            client,
            kind: config.kind,
            endpoint,
            api_key,
            api_version: config.api_version.clone(),
            model_version: config.model_version.clone(),
            request_timeout: config.request_timeout,
            joint_embedding: config.joint_embedding,
        })
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.api_key {
            Some((name, value)) => request.header(name.clone(), value.clone()),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, self.request_timeout))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<Value>().await.map_err(|e| {
                ProviderError::Malformed(format!("invalid JSON body: {}", e.without_url()))
            });
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(status_error(
            status.as_u16(),
            retry_after,
            &body,
            self.request_timeout,
        ))
    }

    fn vision_request(&self, content: &ProviderContent) -> reqwest::RequestBuilder {
        let operation = match content.modality() {
            Modality::Image => "retrieval:vectorizeImage",
            Modality::Text => "retrieval:vectorizeText",
        };
        let url = format!("{}/computervision/{operation}", self.endpoint);
        let request = self.post(&url).query(&[
            ("api-version", self.api_version.as_str()),
            ("model-version", self.model_version.as_str()),
        ]);
        match content {
            ProviderContent::ImageUrl(url) => request.json(&json!({ "url": url })),
            ProviderContent::ImageBytes(bytes) => request
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
            ProviderContent::Text(text) => request.json(&json!({ "text": text })),
        }
    }

    async fn embed_one(&self, input: &ProviderInput) -> Result<Vec<f32>, ProviderError> {
        let value = self.send(self.vision_request(&input.content)).await?;
        match value {
            Value::Object(mut map) => {
                let vector = map.remove("vector").ok_or_else(|| {
                    ProviderError::Malformed("response is missing `vector`".into())
                })?;
                parse_embedding_vector(vector).map_err(ProviderError::Malformed)
            }
            _ => Err(ProviderError::Malformed(
                "response must be a JSON object".into(),
            )),
        }
    }

    async fn embed_vision(
        &self,
        inputs: &[ProviderInput],
    ) -> Result<Vec<ProviderOutput>, ProviderError> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.embed_one(input).await {
                Ok(vector) => outputs.push(ProviderOutput::vector(input.key, vector)),
                // A rejection concerns this input only.
                Err(err @ ProviderError::Rejected { .. }) => {
                    outputs.push(ProviderOutput::error(input.key, err.record_error()))
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outputs)
    }

    async fn embed_batch(
        &self,
        inputs: &[ProviderInput],
    ) -> Result<Vec<ProviderOutput>, ProviderError> {
        let payload = build_batch_payload(inputs);
        let value = self.send(self.post(&self.endpoint).json(&payload)).await?;
        parse_batch_response(value, inputs)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn max_batch_size(&self) -> usize {
        match self.kind {
            ProviderKind::Batch => BATCH_MAX_INPUTS,
            _ => 1,
        }
    }

    fn joint_embedding(&self) -> bool {
        self.joint_embedding
    }

    async fn embed(&self, inputs: &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError> {
        match self.kind {
            ProviderKind::Batch => self.embed_batch(inputs).await,
            _ => self.embed_vision(inputs).await,
        }
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Connect(err.without_url().to_string())
    }
}

/// `Retry-After` as delay-seconds or as an HTTP-date. A date already in the
/// past means retry now.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

fn status_error(status: u16, retry_after: Option<Duration>, body: &str, timeout: Duration) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after },
        408 => ProviderError::Timeout(timeout),
        500..=599 => ProviderError::Unavailable {
            status,
            message: summarize(body),
        },
        _ => {
            let (code, message) = parse_error_body(body);
            ProviderError::Rejected {
                status,
                code: code.unwrap_or_else(|| format!("Http{status}")),
                message: message.unwrap_or_else(|| summarize(body)),
            }
        }
    }
}

/// `{"error": {"code", "message", "innererror": {"code"}}}`. The inner code
/// is the more specific one when present.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let error = match map.remove("error") {
        Some(Value::Object(error)) => error,
        _ => map,
    };
    let inner_code = error
        .get("innererror")
        .and_then(|inner| inner.get("code"))
        .and_then(Value::as_str);
    let code = inner_code
        .or_else(|| error.get("code").and_then(Value::as_str))
        .map(str::to_owned);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(summarize);
    (code, message)
}

fn summarize(text: &str) -> String {
    scrub_urls(text.trim()).chars().take(MAX_ERROR_TEXT).collect()
}

/// `{"inputs": [{"id": "<key>", "text" | "imageUrl" | "image": ...}]}`
fn build_batch_payload(inputs: &[ProviderInput]) -> Value {
    let items: Vec<Value> = inputs
        .iter()
        .map(|input| {
            let id = input.key.to_string();
            match &input.content {
                ProviderContent::ImageUrl(url) => json!({ "id": id, "imageUrl": url }),
                ProviderContent::ImageBytes(bytes) => {
                    json!({ "id": id, "image": BASE64.encode(bytes) })
                }
                ProviderContent::Text(text) => json!({ "id": id, "text": text }),
            }
        })
        .collect();
    json!({ "inputs": items })
}

/// Accepts either `{"results": [{"id", "vector" | "error"}]}` or the
/// OpenAI-style `{"data": [{"index", "embedding"}]}`.
fn parse_batch_response(
    value: Value,
    inputs: &[ProviderInput],
) -> Result<Vec<ProviderOutput>, ProviderError> {
    let Value::Object(mut map) = value else {
        return Err(ProviderError::Malformed(
            "response must be a JSON object".into(),
        ));
    };

    if let Some(results) = map.remove("results") {
        let Value::Array(items) = results else {
            return Err(ProviderError::Malformed("`results` must be an array".into()));
        };
        return Ok(items.into_iter().filter_map(parse_result_item).collect());
    }

    if let Some(data) = map.remove("data") {
        let Value::Array(items) = data else {
            return Err(ProviderError::Malformed("`data` must be an array".into()));
        };
        let mut outputs = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            let Value::Object(mut obj) = item else {
                return Err(ProviderError::Malformed(
                    "unexpected entry inside `data` array".into(),
                ));
            };
            let index = match obj.get("index") {
                Some(index) => index.as_u64().map(|i| i as usize),
                None => Some(position),
            };
            let Some(input) = index.and_then(|i| inputs.get(i)) else {
                tracing::warn!(position, "provider returned an out-of-range index");
                continue;
            };
            outputs.push(match obj.remove("embedding") {
                Some(embedding) => vector_output(input.key, embedding),
                None => ProviderOutput::error(
                    input.key,
                    RecordError::new(
                        ErrorCode::ProviderContractViolation,
                        "missing `embedding` field in data item",
                    ),
                ),
            });
        }
        return Ok(outputs);
    }

    Err(ProviderError::Malformed(
        "unsupported response shape".into(),
    ))
}

fn parse_result_item(item: Value) -> Option<ProviderOutput> {
    let Value::Object(mut obj) = item else {
        tracing::warn!("provider returned a non-object result item");
        return None;
    };
    let key = match obj.get("id") {
        Some(Value::String(id)) => id.parse::<usize>().ok(),
        Some(Value::Number(id)) => id.as_u64().map(|id| id as usize),
        _ => None,
    };
    let Some(key) = key else {
        tracing::warn!("provider returned a result without a usable id");
        return None;
    };

    if let Some(error) = obj.remove("error") {
        return Some(ProviderOutput::error(key, item_error(error)));
    }
    match obj.remove("vector").or_else(|| obj.remove("embedding")) {
        Some(vector) => Some(vector_output(key, vector)),
        None => Some(ProviderOutput::error(
            key,
            RecordError::new(
                ErrorCode::ProviderContractViolation,
                "result has neither `vector` nor `error`",
            ),
        )),
    }
}

fn item_error(error: Value) -> RecordError {
    let fields = match error {
        Value::Object(fields) => fields,
        Value::String(message) => {
            let mut fields = Map::new();
            fields.insert("message".into(), Value::String(message));
            fields
        }
        _ => Map::new(),
    };
    let code = fields
        .get("code")
        .and_then(Value::as_str)
        .map(classify_rejection)
        .unwrap_or(ErrorCode::InvalidInput);
    let message = fields
        .get("message")
        .and_then(Value::as_str)
        .map(summarize)
        .unwrap_or_else(|| "provider rejected the input".into());
    RecordError::new(code, message)
}

fn vector_output(key: usize, value: Value) -> ProviderOutput {
    match parse_embedding_vector(value) {
        Ok(vector) => ProviderOutput::vector(key, vector),
        Err(message) => ProviderOutput::error(
            key,
            RecordError::new(ErrorCode::ProviderContractViolation, message),
        ),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, String> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| "non-finite embedding value".to_string()),
                _ => Err("embedding entries must be numbers".to_string()),
            })
            .collect(),
        _ => Err("embedding vector must be an array".to_string()),
    }
}
