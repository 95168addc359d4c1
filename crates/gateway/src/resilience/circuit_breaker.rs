//! Circuit breaker for the embedding provider.
//!
//! After a run of consecutive transient failures the breaker opens and
//! sub-calls fail fast with `provider_unavailable` instead of piling more
//! load on a struggling provider. Once the reset timeout passes a single
//! probe is let through (half-open); its outcome closes or re-opens the
//! circuit.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Duration to wait before letting a probe through (half-open).
    #[serde(with = "crate::serde_millis")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected until the reset timeout elapses.
    Open,
    /// One probe request is allowed through.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    last_state_change: Instant,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    failure_count: AtomicU64,
    rejected_count: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                last_state_change: Instant::now(),
                probe_in_flight: false,
            }),
            failure_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if a request should be allowed through. A caller admitted here
    /// must report the outcome; prefer [`CircuitBreaker::acquire`], which
    /// releases a half-open probe slot on drop.
    pub fn allow_request(&self) -> bool {
        self.admit().is_some()
    }

    /// Admit one call, returning a permit that reports its outcome.
    pub fn acquire(&self) -> Option<CallPermit<'_>> {
        self.admit().map(|probe| CallPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// `Some(true)` for the half-open probe, `Some(false)` for a normal call.
    fn admit(&self) -> Option<bool> {
        let mut inner = self.lock();

        let admitted = match inner.state {
            CircuitState::Closed => Some(false),
            CircuitState::Open => {
                if inner.last_state_change.elapsed() >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_state_change = Instant::now();
                    inner.probe_in_flight = true;
                    Some(true)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(true)
                }
            }
        };

        if admitted.is_none() {
            self.rejected_count.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.failure_count.store(0, Ordering::Relaxed);
        if inner.state != CircuitState::Closed {
            tracing::info!("provider circuit closed");
            inner.state = CircuitState::Closed;
            inner.last_state_change = Instant::now();
        }
        inner.probe_in_flight = false;
    }

    /// Record a transient failure. Permanent rejections (bad input) say
    /// nothing about provider health and should not be recorded.
    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                if failures >= u64::from(self.config.failure_threshold) {
                    tracing::warn!(failures, "provider circuit opened");
                    inner.state = CircuitState::Open;
                    inner.last_state_change = Instant::now();
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("provider probe failed, circuit re-opened");
                inner.state = CircuitState::Open;
                inner.last_state_change = Instant::now();
            }
            CircuitState::Open => {}
        }
        inner.probe_in_flight = false;
    }

    /// Release a half-open probe slot without judging the provider, e.g.
    /// when the probe was rejected for bad input.
    pub fn record_neutral(&self) {
        self.lock().probe_in_flight = false;
    }

    pub fn current_state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_healthy(&self) -> bool {
        self.current_state() != CircuitState::Open
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.last_state_change = Instant::now();
        inner.probe_in_flight = false;
        self.failure_count.store(0, Ordering::Relaxed);
    }
}

/// One admitted call. Dropping a probe permit without an outcome (the call
/// was cancelled or timed out upstream) frees the half-open slot so the next
/// call can probe again.
#[must_use = "dropping the permit releases it without an outcome"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CallPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }

    pub fn neutral(mut self) {
        self.settled = true;
        if self.probe {
            self.breaker.record_neutral();
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            tracing::debug!("half-open probe abandoned");
            self.breaker.record_neutral();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_reset_timeout(Duration::from_millis(reset_ms)),
        )
    }

    #[test]
    fn opens_after_threshold() {
        let cb = breaker(2, 1_000);
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Open);
        assert!(!cb.allow_request());
        assert_eq!(cb.rejected(), 1);
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker(3, 1_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn half_open_lets_one_probe_through() {
        let cb = breaker(1, 20);
        cb.record_failure();
        assert!(!cb.allow_request());

        thread::sleep(Duration::from_millis(30));
        assert!(cb.allow_request());
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);
        assert!(!cb.allow_request(), "second probe must wait");

        cb.record_success();
        assert_eq!(cb.current_state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn failed_probe_reopens() {
        let cb = breaker(1, 20);
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn neutral_outcome_frees_probe_slot() {
        let cb = breaker(1, 20);
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));
        assert!(cb.allow_request());
        cb.record_neutral();
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);
        assert!(cb.allow_request());
    }

    #[test]
    fn dropped_probe_permit_frees_slot() {
        let cb = breaker(1, 20);
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));

        let probe = cb.acquire().unwrap();
        assert!(probe.is_probe());
        assert!(cb.acquire().is_none());
        drop(probe);

        assert_eq!(cb.current_state(), CircuitState::HalfOpen);
        let probe = cb.acquire().unwrap();
        probe.success();
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn closed_permit_drop_leaves_probe_alone() {
        let cb = breaker(2, 20);
        let normal = cb.acquire().unwrap();
        assert!(!normal.is_probe());
        cb.record_failure();
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));
        let _probe = cb.acquire().unwrap();

        drop(normal);
        assert!(cb.acquire().is_none(), "probe still in flight");
    }

    #[test]
    fn reset_closes() {
        let cb = breaker(1, 60_000);
        cb.record_failure();
        assert!(!cb.is_healthy());
        cb.reset();
        assert!(cb.is_healthy());
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn config_serde_uses_millis() {
        let cfg: CircuitBreakerConfig =
            serde_json::from_str(r#"{"failure_threshold":3,"reset_timeout":1500}"#).unwrap();
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.reset_timeout, Duration::from_millis(1500));
    }
}
