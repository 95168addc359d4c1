use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::{ErrorCode, GatewayError, RecordError};
use crate::normalize::{all_finite, l2_normalize_in_place};
use crate::provider::{
    build_provider, EmbeddingProvider, ProviderContent, ProviderError, ProviderInput,
    ProviderOutput,
};
use crate::resilience::{execute_with_retry_before, CircuitBreaker, CircuitState, TokenBucket};
use crate::resolve::{validate_image_url, ImageResolver};
use crate::types::{
    BatchRequest, BatchResponse, ImageReference, Modality, OutputRecord, Payload, RecordId,
    RecordResult, RecordStage,
};
use crate::wire::{SkillRequest, SkillResponse};

/// Batch vectorization front door.
///
/// A gateway owns its provider, connection pools, circuit breaker and rate
/// limiter. It is `Send + Sync`; share it behind an `Arc` and call
/// [`Gateway::embed`] from as many tasks as needed.
pub struct Gateway {
    config: GatewayConfig,
    provider: Arc<dyn EmbeddingProvider>,
    resolver: ImageResolver,
    breaker: Option<CircuitBreaker>,
    limiter: Option<TokenBucket>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One input record's progress through a call.
struct Slot {
    record_id: RecordId,
    stage: RecordStage,
    result: Option<RecordResult>,
}

impl Slot {
    fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            stage: RecordStage::Pending,
            result: None,
        }
    }

    fn advance(&mut self, next: RecordStage) {
        if self.stage.can_advance_to(next) {
            self.stage = next;
        } else {
            tracing::warn!(record_id = %self.record_id, from = ?self.stage, to = ?next, "illegal stage transition ignored");
        }
    }

    fn fail(&mut self, error: RecordError) {
        if self.stage.is_terminal() {
            return;
        }
        tracing::debug!(record_id = %self.record_id, code = %error.code, detail = %error.message, "record failed");
        self.stage = RecordStage::Failed;
        self.result = Some(RecordResult::Error(error));
    }

    fn succeed(&mut self, vector: Vec<f32>) {
        if self.stage.can_advance_to(RecordStage::Succeeded) {
            self.stage = RecordStage::Succeeded;
            self.result = Some(RecordResult::Vector(vector));
        }
    }

    fn finish(&mut self, result: RecordResult) {
        match result {
            RecordResult::Vector(vector) => self.succeed(vector),
            RecordResult::Error(error) => self.fail(error),
        }
    }

    fn into_output(self) -> OutputRecord {
        match (self.stage.is_terminal(), self.result) {
            (true, Some(result)) => OutputRecord {
                record_id: self.record_id,
                result,
            },
            _ => {
                tracing::error!(record_id = %self.record_id, stage = ?self.stage, "record never reached a terminal stage");
                OutputRecord::failed(
                    self.record_id,
                    RecordError::internal("record was not processed"),
                )
            }
        }
    }
}

impl Gateway {
    /// Build a gateway and the provider its config names.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let provider = build_provider(&config.provider, config.dimensions)?;
        Self::with_provider(config, provider)
    }

    /// Build a gateway around an already constructed provider. The provider
    /// section of `config` is not consulted except for its timeouts.
    pub fn with_provider(
        config: GatewayConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, GatewayError> {
        config.validate_limits()?;
        let resolver = ImageResolver::new(config.resolve.clone())?;
        let breaker = config.circuit_breaker.map(CircuitBreaker::new);
        let limiter = config.rate_limit.map(TokenBucket::new);
        tracing::info!(
            provider = provider.name(),
            dimensions = config.dimensions,
            max_batch_size = config.max_batch_size,
            resolve_mode = ?config.resolve.mode,
            "gateway ready"
        );
        Ok(Self {
            config,
            provider,
            resolver,
            breaker,
            limiter,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Provider circuit state; always `Closed` when the breaker is disabled.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker
            .as_ref()
            .map_or(CircuitState::Closed, CircuitBreaker::current_state)
    }

    /// Embed every record of `batch`.
    ///
    /// Per-record problems come back in-line; `Err` is reserved for
    /// call-level failures (malformed batch, batch timeout, provider down).
    pub async fn embed(&self, batch: BatchRequest) -> Result<BatchResponse, GatewayError> {
        let records = batch
            .records
            .into_iter()
            .map(|record| (record.record_id, Ok(record.payload)))
            .collect();
        self.embed_records(records).await
    }

    /// [`Gateway::embed`] over the JSON wire contract. Records whose `data`
    /// could not be dispatched fail individually with `invalid_input`.
    pub async fn embed_skill(&self, request: SkillRequest) -> Result<SkillResponse, GatewayError> {
        self.embed_records(request.into_records())
            .await
            .map(SkillResponse::from)
    }

    async fn embed_records(
        &self,
        records: Vec<(RecordId, Result<Payload, RecordError>)>,
    ) -> Result<BatchResponse, GatewayError> {
        self.check_structure(&records)?;

        let started = Instant::now();
        let size = records.len();
        metrics::counter!("vecgate_batches_total").increment(1);
        let span = tracing::info_span!("embed_batch", size, provider = self.provider.name());

        let deadline = started + provider_budget(self.config.batch_timeout);
        let outcome = tokio::time::timeout(self.config.batch_timeout, self.run(records, deadline))
            .instrument(span)
            .await;
        metrics::histogram!("vecgate_batch_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    size,
                    timeout_ms = self.config.batch_timeout.as_millis() as u64,
                    "batch timed out"
                );
                Err(GatewayError::Timeout(self.config.batch_timeout))
            }
        }
    }

    fn check_structure(
        &self,
        records: &[(RecordId, Result<Payload, RecordError>)],
    ) -> Result<(), GatewayError> {
        if records.is_empty() {
            return Err(GatewayError::EmptyBatch);
        }
        if records.len() > self.config.max_batch_size {
            return Err(GatewayError::BatchTooLarge {
                size: records.len(),
                max: self.config.max_batch_size,
            });
        }
        let mut seen = HashSet::with_capacity(records.len());
        for (record_id, _) in records {
            if !seen.insert(record_id) {
                return Err(GatewayError::DuplicateRecordId(record_id.clone()));
            }
        }
        Ok(())
    }

    async fn run(
        &self,
        records: Vec<(RecordId, Result<Payload, RecordError>)>,
        deadline: Instant,
    ) -> Result<BatchResponse, GatewayError> {
        let mut slots = Vec::with_capacity(records.len());
        let mut images: Vec<(usize, ImageReference)> = Vec::new();
        let mut ready: Vec<ProviderInput> = Vec::with_capacity(records.len());

        // --- Per-record validation ---
        for (key, (record_id, payload)) in records.into_iter().enumerate() {
            let mut slot = Slot::new(record_id);
            match payload.and_then(validate_payload) {
                Ok(Payload::Image(image)) => {
                    slot.advance(RecordStage::Resolving);
                    images.push((key, image));
                }
                Ok(Payload::Text(query)) => {
                    slot.advance(RecordStage::Invoking);
                    ready.push(ProviderInput::new(key, ProviderContent::Text(query.text)));
                }
                Err(error) => slot.fail(error),
            }
            slots.push(slot);
        }

        // --- Resolution ---
        let resolver = &self.resolver;
        let resolved: Vec<(usize, Result<ProviderContent, RecordError>)> = stream::iter(images)
            .map(|(key, image)| async move { (key, resolver.resolve(&image).await) })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;
        for (key, result) in resolved {
            match result {
                Ok(content) => {
                    slots[key].advance(RecordStage::Invoking);
                    ready.push(ProviderInput::new(key, content));
                }
                Err(error) => slots[key].fail(error),
            }
        }
        ready.sort_by_key(|input| input.key);
        let invoked: Vec<usize> = ready.iter().map(|input| input.key).collect();

        // --- Provider sub-calls ---
        let sub_calls = self.plan_sub_calls(ready);
        let results: Vec<Vec<(usize, RecordResult)>> = stream::iter(sub_calls)
            .map(|inputs| self.invoke(inputs, deadline))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;
        for (key, result) in results.into_iter().flatten() {
            slots[key].finish(result);
        }

        // --- Assembly ---
        let all_unavailable = !invoked.is_empty()
            && invoked.iter().all(|&key| {
                matches!(
                    &slots[key].result,
                    Some(RecordResult::Error(e)) if e.code == ErrorCode::ProviderUnavailable
                )
            });

        let response = BatchResponse {
            records: slots.into_iter().map(Slot::into_output).collect(),
        };
        record_outcomes(&response);

        if all_unavailable {
            tracing::warn!(records = invoked.len(), "no record reached a healthy provider");
            return Err(GatewayError::ProviderUnavailable(format!(
                "{} provider is not accepting requests",
                self.provider.name()
            )));
        }

        tracing::info!(
            records = response.len(),
            succeeded = response.succeeded(),
            failed = response.failed(),
            "batch embedded"
        );
        Ok(response)
    }

    /// Split inputs into provider calls: by modality when the provider has
    /// no joint space, then into chunks the provider accepts.
    fn plan_sub_calls(&self, inputs: Vec<ProviderInput>) -> Vec<Vec<ProviderInput>> {
        let chunk_size = self
            .config
            .provider_batch_size
            .min(self.provider.max_batch_size())
            .max(1);

        let groups: Vec<Vec<ProviderInput>> = if self.provider.joint_embedding() {
            vec![inputs]
        } else {
            let (images, texts): (Vec<_>, Vec<_>) = inputs
                .into_iter()
                .partition(|input| input.content.modality() == Modality::Image);
            vec![images, texts]
        };

        groups
            .into_iter()
            .flat_map(|group| {
                let mut chunks = Vec::with_capacity(group.len().div_ceil(chunk_size));
                let mut iter = group.into_iter().peekable();
                while iter.peek().is_some() {
                    chunks.push(iter.by_ref().take(chunk_size).collect::<Vec<_>>());
                }
                chunks
            })
            .collect()
    }

    /// Run one sub-call and produce a result for every key in it.
    async fn invoke(
        &self,
        inputs: Vec<ProviderInput>,
        deadline: Instant,
    ) -> Vec<(usize, RecordResult)> {
        let keys: Vec<usize> = inputs.iter().map(|input| input.key).collect();
        match self.call_provider(&inputs, deadline).await {
            Ok(outputs) => self.correlate(&keys, outputs),
            Err(err) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    records = keys.len(),
                    code = %err.code(),
                    error = %err,
                    "provider sub-call failed"
                );
                let error = err.record_error();
                keys.into_iter()
                    .map(|key| (key, RecordResult::Error(error.clone())))
                    .collect()
            }
        }
    }

    /// One sub-call with its retries. Every attempt's timeout is capped by
    /// `deadline`, and no retry starts that could not finish before it.
    async fn call_provider(
        &self,
        inputs: &[ProviderInput],
        deadline: Instant,
    ) -> Result<Vec<ProviderOutput>, ProviderError> {
        let provider_label = self.provider.name().to_owned();

        let permit = match &self.breaker {
            Some(breaker) => match breaker.acquire() {
                Some(permit) => Some(permit),
                None => {
                    metrics::counter!("vecgate_provider_calls_total", "provider" => provider_label, "outcome" => "circuit_open")
                        .increment(1);
                    return Err(ProviderError::CircuitOpen);
                }
            },
            None => None,
        };

        let provider = &self.provider;
        let limiter = self.limiter.as_ref();
        let request_timeout = self.config.provider.request_timeout;

        let outcome = execute_with_retry_before(&self.config.retry, deadline, move |attempt| async move {
            if attempt > 0 {
                tracing::debug!(attempt, provider = provider.name(), "retrying provider call");
            }
            if let Some(limiter) = limiter {
                if !limiter.acquire().await {
                    return Err(ProviderError::Throttled);
                }
            }
            let timeout = request_timeout.min(deadline.saturating_duration_since(Instant::now()));
            if timeout.is_zero() {
                return Err(ProviderError::Timeout(timeout));
            }
            match tokio::time::timeout(timeout, provider.embed(inputs)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            }
        })
        .await;

        if let Some(permit) = permit {
            match &outcome.result {
                Ok(_) => permit.success(),
                Err(err) if err.is_provider_fault() => permit.failure(),
                Err(_) => permit.neutral(),
            }
        }

        let label = match &outcome.result {
            Ok(_) => "ok",
            Err(err) => err.code().as_str(),
        };
        metrics::counter!("vecgate_provider_calls_total", "provider" => provider_label, "outcome" => label)
            .increment(1);
        if outcome.attempts > 1 {
            tracing::debug!(
                attempts = outcome.attempts,
                elapsed_ms = outcome.total_duration.as_millis() as u64,
                "provider call needed retries"
            );
        }
        outcome.into_result()
    }

    /// Match outputs to inputs by key. Unknown and repeated keys are dropped;
    /// keys the provider never answered fail with `provider_no_result`.
    fn correlate(&self, keys: &[usize], outputs: Vec<ProviderOutput>) -> Vec<(usize, RecordResult)> {
        let expected: HashSet<usize> = keys.iter().copied().collect();
        let mut by_key: HashMap<usize, Result<Vec<f32>, RecordError>> =
            HashMap::with_capacity(keys.len());

        for output in outputs {
            if !expected.contains(&output.key) {
                tracing::warn!(key = output.key, "provider answered an input it was not sent");
                continue;
            }
            if by_key.contains_key(&output.key) {
                tracing::warn!(key = output.key, "provider answered the same input twice");
                continue;
            }
            by_key.insert(output.key, output.result);
        }

        keys.iter()
            .map(|&key| {
                let result = match by_key.remove(&key) {
                    Some(Ok(vector)) => self.check_vector(vector),
                    Some(Err(error)) => RecordResult::Error(error),
                    None => RecordResult::Error(RecordError::new(
                        ErrorCode::ProviderNoResult,
                        "provider returned no result for this input",
                    )),
                };
                (key, result)
            })
            .collect()
    }

    fn check_vector(&self, mut vector: Vec<f32>) -> RecordResult {
        if vector.len() != self.config.dimensions {
            return RecordResult::Error(RecordError::new(
                ErrorCode::ProviderContractViolation,
                format!(
                    "vector has {} dimensions, expected {}",
                    vector.len(),
                    self.config.dimensions
                ),
            ));
        }
        if !all_finite(&vector) {
            return RecordResult::Error(RecordError::new(
                ErrorCode::ProviderContractViolation,
                "vector contains non-finite values",
            ));
        }
        if self.config.normalize {
            l2_normalize_in_place(&mut vector);
        }
        RecordResult::Vector(vector)
    }
}

/// Share of the batch budget given to provider work; the rest is kept for
/// correlation and assembly so a slow provider ends as `provider_timeout`
/// records rather than a timed-out batch.
fn provider_budget(batch_timeout: Duration) -> Duration {
    let reserve = (batch_timeout / 10).min(Duration::from_millis(500));
    batch_timeout - reserve
}

fn validate_payload(payload: Payload) -> Result<Payload, RecordError> {
    match &payload {
        Payload::Text(query) => {
            if query.text.trim().is_empty() {
                return Err(RecordError::invalid_input("text is empty"));
            }
        }
        Payload::Image(image) => validate_image_url(&image.url)?,
    }
    Ok(payload)
}

fn record_outcomes(response: &BatchResponse) {
    for record in &response.records {
        let outcome = match &record.result {
            RecordResult::Vector(_) => "success",
            RecordResult::Error(err) => err.code.as_str(),
        };
        metrics::counter!("vecgate_records_total", "outcome" => outcome).increment(1);
    }
}
