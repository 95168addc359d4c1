//! Gateway behavior against in-process fake providers.
//!
//! Covers correlation, per-record failure isolation, retries, the circuit
//! breaker and the batch deadline without touching the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vecgate::{
    BatchRequest, CircuitBreakerConfig, CircuitState, EmbeddingProvider, ErrorCode, Gateway,
    GatewayConfig, GatewayError, ImageReference, InputRecord, Modality, ProviderContent,
    ProviderError, ProviderInput, ProviderKind, ProviderOutput, RateLimitConfig, RecordError,
    RecordId, RetryConfig, SkillRequest,
};

const DIMS: usize = 4;

type Handler =
    dyn Fn(usize, &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError> + Send + Sync;

struct FakeProvider {
    handler: Box<Handler>,
    max_batch: usize,
    joint: bool,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ProviderInput>>>,
}

impl FakeProvider {
    fn new(
        handler: impl Fn(usize, &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            max_batch: 64,
            joint: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn echo() -> Self {
        Self::new(|_, inputs| Ok(inputs.iter().map(echo_output).collect()))
    }

    fn with_joint(mut self, joint: bool) -> Self {
        self.joint = joint;
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<Vec<ProviderInput>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    fn joint_embedding(&self) -> bool {
        self.joint
    }

    async fn embed(&self, inputs: &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(inputs.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(call, inputs)
    }
}

/// Vector whose components encode the input length, so tests can tell
/// which input a vector was computed from.
fn content_vector(content: &ProviderContent) -> Vec<f32> {
    let marker = match content {
        ProviderContent::Text(text) => text.len() as f32,
        ProviderContent::ImageUrl(url) => 1000.0 + url.len() as f32,
        ProviderContent::ImageBytes(bytes) => 2000.0 + bytes.len() as f32,
    };
    vec![marker; DIMS]
}

fn echo_output(input: &ProviderInput) -> ProviderOutput {
    ProviderOutput::vector(input.key, content_vector(&input.content))
}

fn config() -> GatewayConfig {
    let mut cfg = GatewayConfig::default();
    cfg.dimensions = DIMS;
    cfg.max_batch_size = 32;
    cfg.provider_batch_size = 8;
    cfg.retry = RetryConfig::disabled();
    cfg.provider.kind = ProviderKind::Stub;
    cfg
}

/// Refuses, hangs or answers depending on the current mode.
#[derive(Default)]
struct SwitchProvider {
    mode: AtomicUsize,
}

impl SwitchProvider {
    const HEALTHY: usize = 0;
    const REFUSE: usize = 1;
    const HANG: usize = 2;

    fn set(&self, mode: usize) {
        self.mode.store(mode, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for SwitchProvider {
    fn name(&self) -> &str {
        "switch"
    }

    async fn embed(&self, inputs: &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError> {
        match self.mode.load(Ordering::SeqCst) {
            Self::REFUSE => Err(ProviderError::Connect("connection refused".into())),
            Self::HANG => std::future::pending().await,
            _ => Ok(inputs.iter().map(echo_output).collect()),
        }
    }
}

/// Wraps a provider and stalls every sub-call that contains `text`.
struct SlowFor {
    text: &'static str,
    inner: Arc<FakeProvider>,
}

impl SlowFor {
    fn new(text: &'static str, inner: Arc<FakeProvider>) -> Self {
        Self { text, inner }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowFor {
    fn name(&self) -> &str {
        "slow-for"
    }

    async fn embed(&self, inputs: &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError> {
        let stalls = inputs
            .iter()
            .any(|i| matches!(&i.content, ProviderContent::Text(t) if t == self.text));
        if stalls {
            return std::future::pending().await;
        }
        self.inner.embed(inputs).await
    }
}

fn gateway(cfg: GatewayConfig, provider: &Arc<FakeProvider>) -> Gateway {
    Gateway::with_provider(cfg, provider.clone()).unwrap()
}

fn texts(items: &[&str]) -> BatchRequest {
    BatchRequest::new(
        items
            .iter()
            .enumerate()
            .map(|(i, text)| InputRecord::text(i as i64, *text))
            .collect(),
    )
}

fn code_of(response: &vecgate::BatchResponse, id: i64) -> Option<ErrorCode> {
    response
        .get(&RecordId::Integer(id))
        .and_then(|r| r.error())
        .map(|e| e.code)
}

#[tokio::test]
async fn reordered_outputs_are_correlated_by_key() {
    let provider = Arc::new(FakeProvider::new(|_, inputs| {
        Ok(inputs.iter().rev().map(echo_output).collect())
    }));
    let gw = gateway(config(), &provider);

    let response = gw.embed(texts(&["a", "bb", "ccc"])).await.unwrap();

    assert_eq!(response.len(), 3);
    for (i, record) in response.records.iter().enumerate() {
        assert_eq!(record.record_id, RecordId::Integer(i as i64));
        assert_eq!(record.result.vector().unwrap()[0], (i + 1) as f32);
    }
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn missing_output_fails_only_that_record() {
    let provider = Arc::new(FakeProvider::new(|_, inputs| {
        Ok(inputs
            .iter()
            .filter(|input| !matches!(&input.content, ProviderContent::Text(t) if t == "bb"))
            .map(echo_output)
            .collect())
    }));
    let gw = gateway(config(), &provider);

    let response = gw.embed(texts(&["a", "bb", "ccc"])).await.unwrap();

    assert_eq!(response.succeeded(), 2);
    assert_eq!(code_of(&response, 1), Some(ErrorCode::ProviderNoResult));
}

#[tokio::test]
async fn wrong_dimension_is_a_contract_violation() {
    let provider = Arc::new(FakeProvider::new(|_, inputs| {
        Ok(inputs
            .iter()
            .map(|input| match &input.content {
                ProviderContent::Text(t) if t == "short" => {
                    ProviderOutput::vector(input.key, vec![0.5; DIMS - 1])
                }
                _ => echo_output(input),
            })
            .collect())
    }));
    let gw = gateway(config(), &provider);

    let response = gw.embed(texts(&["ok", "short"])).await.unwrap();

    assert!(response.records[0].result.is_vector());
    assert_eq!(code_of(&response, 1), Some(ErrorCode::ProviderContractViolation));
}

#[tokio::test]
async fn unknown_and_repeated_keys_are_ignored() {
    let provider = Arc::new(FakeProvider::new(|_, inputs| {
        let mut outputs: Vec<ProviderOutput> = inputs.iter().map(echo_output).collect();
        outputs.push(ProviderOutput::vector(inputs[0].key, vec![9.0; DIMS]));
        outputs.push(ProviderOutput::vector(999, vec![7.0; DIMS]));
        Ok(outputs)
    }));
    let gw = gateway(config(), &provider);

    let response = gw.embed(texts(&["abcd", "ef"])).await.unwrap();

    assert_eq!(response.len(), 2);
    assert_eq!(response.records[0].result.vector().unwrap()[0], 4.0);
    assert_eq!(response.records[1].result.vector().unwrap()[0], 2.0);
}

#[tokio::test]
async fn per_input_provider_errors_stay_in_line() {
    let provider = Arc::new(FakeProvider::new(|_, inputs| {
        Ok(inputs
            .iter()
            .map(|input| match &input.content {
                ProviderContent::ImageUrl(_) => ProviderOutput::error(
                    input.key,
                    RecordError::new(ErrorCode::ResourceUnreachable, "download failed"),
                ),
                _ => echo_output(input),
            })
            .collect())
    }));
    let gw = gateway(config(), &provider);

    let batch = BatchRequest::new(vec![
        InputRecord::image(
            "img",
            ImageReference::new("https://acct.blob.core.windows.net/c/missing.jpg"),
        ),
        InputRecord::text("txt", "a red bicycle"),
    ]);
    let response = gw.embed(batch).await.unwrap();

    assert_eq!(
        response.get(&"img".into()).and_then(|r| r.error()).map(|e| e.code),
        Some(ErrorCode::ResourceUnreachable)
    );
    assert!(response.get(&"txt".into()).unwrap().is_vector());
}

#[tokio::test]
async fn invalid_records_never_reach_the_provider() {
    let provider = Arc::new(FakeProvider::echo());
    let gw = gateway(config(), &provider);

    let batch = BatchRequest::new(vec![
        InputRecord::text(0, "   "),
        InputRecord::image(1, ImageReference::new("ftp://host/file.png")),
        InputRecord::image(2, ImageReference::new("not a url")),
        InputRecord::text(3, "valid"),
    ]);
    let response = gw.embed(batch).await.unwrap();

    assert_eq!(code_of(&response, 0), Some(ErrorCode::InvalidInput));
    assert_eq!(code_of(&response, 1), Some(ErrorCode::InvalidInput));
    assert_eq!(code_of(&response, 2), Some(ErrorCode::InvalidInput));
    assert!(response.records[3].result.is_vector());

    let seen = provider.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 1);
}

#[tokio::test]
async fn all_invalid_batch_returns_without_calling_provider() {
    let provider = Arc::new(FakeProvider::echo());
    let gw = gateway(config(), &provider);

    let response = gw.embed(texts(&["", " "])).await.unwrap();

    assert_eq!(response.failed(), 2);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn access_token_is_appended_to_the_forwarded_url() {
    let provider = Arc::new(FakeProvider::echo());
    let gw = gateway(config(), &provider);

    let batch = BatchRequest::new(vec![InputRecord::image(
        0,
        ImageReference::new("https://acct.blob.core.windows.net/c/a.jpg")
            .with_token("?sv=2023-01-03&sig=abc"),
    )]);
    gw.embed(batch).await.unwrap();

    let seen = provider.seen();
    assert_eq!(
        seen[0][0].content,
        ProviderContent::ImageUrl(
            "https://acct.blob.core.windows.net/c/a.jpg?sv=2023-01-03&sig=abc".into()
        )
    );
}

#[tokio::test]
async fn modalities_are_split_without_joint_embedding() {
    let provider = Arc::new(FakeProvider::echo().with_joint(false));
    let gw = gateway(config(), &provider);

    let batch = BatchRequest::new(vec![
        InputRecord::text(0, "one"),
        InputRecord::image(1, ImageReference::new("https://h/1.png")),
        InputRecord::text(2, "two"),
        InputRecord::image(3, ImageReference::new("https://h/2.png")),
    ]);
    let response = gw.embed(batch).await.unwrap();

    assert_eq!(response.succeeded(), 4);
    let seen = provider.seen();
    assert_eq!(seen.len(), 2);
    for call in seen {
        let first = call[0].content.modality();
        assert!(call.iter().all(|input| input.content.modality() == first));
    }
}

#[tokio::test]
async fn mixed_modalities_share_a_call_with_joint_embedding() {
    let provider = Arc::new(FakeProvider::echo());
    let gw = gateway(config(), &provider);

    let batch = BatchRequest::new(vec![
        InputRecord::text(0, "one"),
        InputRecord::image(1, ImageReference::new("https://h/1.png")),
    ]);
    gw.embed(batch).await.unwrap();

    let seen = provider.seen();
    assert_eq!(seen.len(), 1);
    let modalities: Vec<Modality> = seen[0].iter().map(|i| i.content.modality()).collect();
    assert_eq!(modalities, vec![Modality::Text, Modality::Image]);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let provider = Arc::new(FakeProvider::new(|call, inputs| {
        if call < 2 {
            Err(ProviderError::Unavailable {
                status: 503,
                message: "warming up".into(),
            })
        } else {
            Ok(inputs.iter().map(echo_output).collect())
        }
    }));
    let mut cfg = config();
    cfg.retry = RetryConfig::default()
        .with_max_retries(3)
        .with_base_delay(Duration::from_millis(1))
        .with_jitter(false);
    let gw = gateway(cfg, &provider);

    let response = gw.embed(texts(&["a", "b"])).await.unwrap();

    assert_eq!(response.succeeded(), 2);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn permanent_rejections_are_not_retried() {
    let provider = Arc::new(FakeProvider::new(|_, _| {
        Err(ProviderError::Rejected {
            status: 400,
            code: "InvalidRequest".into(),
            message: "unsupported text".into(),
        })
    }));
    let mut cfg = config();
    cfg.retry = RetryConfig::default()
        .with_max_retries(3)
        .with_base_delay(Duration::from_millis(1));
    let gw = gateway(cfg, &provider);

    let response = gw.embed(texts(&["a"])).await.unwrap();

    assert_eq!(code_of(&response, 0), Some(ErrorCode::InvalidInput));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn exhausted_rate_limit_retries_surface_per_record() {
    let provider = Arc::new(FakeProvider::new(|_, _| {
        Err(ProviderError::RateLimited {
            retry_after: Some(Duration::from_millis(1)),
        })
    }));
    let mut cfg = config();
    cfg.retry = RetryConfig::default()
        .with_max_retries(1)
        .with_base_delay(Duration::from_millis(1))
        .with_jitter(false);
    let gw = gateway(cfg, &provider);

    let response = gw.embed(texts(&["a", "b"])).await.unwrap();

    assert_eq!(code_of(&response, 0), Some(ErrorCode::ProviderRateLimited));
    assert_eq!(code_of(&response, 1), Some(ErrorCode::ProviderRateLimited));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn slow_sub_call_times_out_per_record() {
    let provider = Arc::new(FakeProvider::echo().with_delay(Duration::from_millis(300)));
    let mut cfg = config();
    cfg.provider.request_timeout = Duration::from_millis(20);
    cfg.batch_timeout = Duration::from_secs(5);
    let gw = gateway(cfg, &provider);

    let response = gw.embed(texts(&["a"])).await.unwrap();

    assert_eq!(code_of(&response, 0), Some(ErrorCode::ProviderTimeout));
}

#[tokio::test]
async fn hanging_provider_with_default_retries_times_out_per_record() {
    let provider = Arc::new(FakeProvider::echo().with_delay(Duration::from_secs(3600)));
    let mut cfg = config();
    cfg.retry = RetryConfig::default();
    cfg.provider.request_timeout = Duration::from_millis(200);
    cfg.batch_timeout = Duration::from_secs(1);
    let gw = gateway(cfg, &provider);

    let started = std::time::Instant::now();
    let response = gw.embed(texts(&["a"])).await.unwrap();

    assert_eq!(code_of(&response, 0), Some(ErrorCode::ProviderTimeout));
    assert!(provider.calls() >= 2, "retried while time remained");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn timed_out_records_do_not_sink_finished_ones() {
    let slow = Arc::new(SlowFor::new("slow", Arc::new(FakeProvider::echo())));
    let mut cfg = config();
    cfg.provider_batch_size = 1;
    cfg.retry = RetryConfig::default();
    cfg.provider.request_timeout = Duration::from_millis(150);
    cfg.batch_timeout = Duration::from_millis(600);
    let gw = Gateway::with_provider(cfg, slow).unwrap();

    let response = gw.embed(texts(&["fast", "slow"])).await.unwrap();

    assert!(response.get(&RecordId::Integer(0)).unwrap().is_vector());
    assert_eq!(code_of(&response, 1), Some(ErrorCode::ProviderTimeout));
}

#[tokio::test]
async fn batch_deadline_fails_the_whole_call() {
    let provider = Arc::new(FakeProvider::echo());
    let mut cfg = config();
    cfg.max_concurrency = 1;
    cfg.provider_batch_size = 1;
    cfg.provider.request_timeout = Duration::from_millis(50);
    cfg.batch_timeout = Duration::from_millis(100);
    cfg.rate_limit = Some(RateLimitConfig {
        requests_per_second: 0.5,
        burst_size: 1,
        max_wait: Duration::from_secs(5),
    });
    let gw = gateway(cfg, &provider);

    let err = gw.embed(texts(&["a", "b"])).await.unwrap_err();

    assert!(matches!(err, GatewayError::Timeout(_)));
}

#[tokio::test]
async fn cancelled_probe_does_not_wedge_the_circuit() {
    let provider = Arc::new(SwitchProvider::default());
    let mut cfg = config();
    cfg.circuit_breaker = Some(
        CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_reset_timeout(Duration::from_millis(20)),
    );
    let gw = Gateway::with_provider(cfg, provider.clone()).unwrap();

    provider.set(SwitchProvider::REFUSE);
    assert!(gw.embed(texts(&["a"])).await.is_err());
    assert_eq!(gw.circuit_state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(30)).await;
    provider.set(SwitchProvider::HANG);
    let abandoned = tokio::time::timeout(Duration::from_millis(50), gw.embed(texts(&["a"]))).await;
    assert!(abandoned.is_err());

    provider.set(SwitchProvider::HEALTHY);
    let response = gw.embed(texts(&["a"])).await.unwrap();
    assert!(response.records[0].result.is_vector());
    assert_eq!(gw.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn unreachable_provider_fails_the_call_and_opens_the_circuit() {
    let provider = Arc::new(FakeProvider::new(|_, _| {
        Err(ProviderError::Connect("connection refused".into()))
    }));
    let mut cfg = config();
    cfg.circuit_breaker = Some(
        CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_reset_timeout(Duration::from_secs(60)),
    );
    let gw = gateway(cfg, &provider);

    let err = gw.embed(texts(&["a", "b"])).await.unwrap_err();
    assert!(matches!(err, GatewayError::ProviderUnavailable(_)));
    assert_eq!(gw.circuit_state(), CircuitState::Open);

    // Circuit open: rejected without another provider call.
    let err = gw.embed(texts(&["a"])).await.unwrap_err();
    assert!(matches!(err, GatewayError::ProviderUnavailable(_)));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn partial_unavailability_keeps_the_batch() {
    let provider = Arc::new(FakeProvider::new(|_, inputs| {
        match &inputs[0].content {
            ProviderContent::Text(t) if t == "down" => Err(ProviderError::Unavailable {
                status: 502,
                message: "bad gateway".into(),
            }),
            _ => Ok(inputs.iter().map(echo_output).collect()),
        }
    }));
    let mut cfg = config();
    cfg.provider_batch_size = 1;
    cfg.circuit_breaker = None;
    let gw = gateway(cfg, &provider);

    let response = gw.embed(texts(&["up", "down"])).await.unwrap();

    assert!(response.records[0].result.is_vector());
    assert_eq!(code_of(&response, 1), Some(ErrorCode::ProviderUnavailable));
}

#[tokio::test]
async fn gateways_do_not_share_breaker_state() {
    let failing = Arc::new(FakeProvider::new(|_, _| {
        Err(ProviderError::Connect("refused".into()))
    }));
    let healthy = Arc::new(FakeProvider::echo());
    let mut cfg = config();
    cfg.circuit_breaker = Some(CircuitBreakerConfig::default().with_failure_threshold(1));

    let a = gateway(cfg.clone(), &failing);
    let b = gateway(cfg, &healthy);

    assert!(a.embed(texts(&["x"])).await.is_err());
    assert_eq!(a.circuit_state(), CircuitState::Open);
    assert_eq!(b.circuit_state(), CircuitState::Closed);
    assert_eq!(b.embed(texts(&["x"])).await.unwrap().succeeded(), 1);
}

#[tokio::test]
async fn outbound_throttle_fails_records_as_rate_limited() {
    let provider = Arc::new(FakeProvider::echo());
    let mut cfg = config();
    cfg.max_concurrency = 1;
    cfg.provider_batch_size = 1;
    cfg.rate_limit = Some(RateLimitConfig {
        requests_per_second: 0.001,
        burst_size: 1,
        max_wait: Duration::ZERO,
    });
    let gw = gateway(cfg, &provider);

    let response = gw.embed(texts(&["a", "b"])).await.unwrap();

    assert_eq!(response.succeeded(), 1);
    assert_eq!(response.failed(), 1);
    assert_eq!(provider.calls(), 1);
    let throttled = response
        .records
        .iter()
        .filter_map(|r| r.result.error())
        .next()
        .unwrap();
    assert_eq!(throttled.code, ErrorCode::ProviderRateLimited);
}

#[tokio::test]
async fn structural_errors_reject_the_batch() {
    let provider = Arc::new(FakeProvider::echo());
    let mut cfg = config();
    cfg.max_batch_size = 2;
    let gw = gateway(cfg, &provider);

    assert!(matches!(
        gw.embed(BatchRequest::default()).await,
        Err(GatewayError::EmptyBatch)
    ));
    assert!(matches!(
        gw.embed(texts(&["a", "b", "c"])).await,
        Err(GatewayError::BatchTooLarge { size: 3, max: 2 })
    ));
    let duplicate = BatchRequest::new(vec![InputRecord::text(1, "a"), InputRecord::text(1, "b")]);
    assert!(matches!(
        gw.embed(duplicate).await,
        Err(GatewayError::DuplicateRecordId(RecordId::Integer(1)))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn normalized_vectors_have_unit_length() {
    let provider = Arc::new(FakeProvider::echo());
    let mut cfg = config();
    cfg.normalize = true;
    let gw = gateway(cfg, &provider);

    let response = gw.embed(texts(&["abc"])).await.unwrap();

    let vector = response.records[0].result.vector().unwrap();
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn stub_gateway_is_deterministic() {
    let mut cfg = config();
    cfg.dimensions = 16;
    let gw = Gateway::new(cfg).unwrap();
    let batch = BatchRequest::new(vec![
        InputRecord::text("t", "green apple"),
        InputRecord::image("i", ImageReference::new("https://h/apple.jpg").with_token("sig=1")),
    ]);

    let first = gw.embed(batch.clone()).await.unwrap();
    let second = gw.embed(batch).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.records[0].result.vector().unwrap().len(), 16);
}

#[tokio::test]
async fn skill_contract_round_trip() {
    let provider = Arc::new(FakeProvider::echo());
    let gw = gateway(config(), &provider);

    let request: SkillRequest = serde_json::from_value(serde_json::json!({
        "values": [
            { "recordId": "a", "data": { "text": "hello" } },
            { "recordId": "b", "data": {} },
            { "recordId": "c", "data": { "imageUrl": "https://h/x.png", "text": "both" } }
        ]
    }))
    .unwrap();

    let response = gw.embed_skill(request).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["values"][0]["recordId"], "a");
    assert_eq!(json["values"][0]["data"]["vector"].as_array().unwrap().len(), DIMS);
    assert_eq!(json["values"][1]["errors"][0]["message"], "invalid_input");
    assert_eq!(json["values"][2]["errors"][0]["message"], "invalid_input");
    assert!(json["values"][1].get("data").is_none());
}
