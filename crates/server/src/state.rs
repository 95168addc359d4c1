use crate::config::ServerConfig;
use crate::error::ServerResult;
use dashmap::DashMap;
use gateway::Gateway;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

/// Rate limit bucket used when authentication is disabled.
const ANONYMOUS: usize = usize::MAX;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key slot -> (count, window_start).
    /// Keyed by position in `config.api_keys` so key material is held once.
    pub rate_limiter: Arc<DashMap<usize, (u32, Instant)>>,

    /// Gateway instance (shared across requests)
    pub gateway: Arc<Gateway>,

    /// Prometheus exporter handle, present once the recorder is installed
    pub metrics: Option<PrometheusHandle>,

    pub started_at: Instant,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let gateway = Gateway::new(config.gateway.clone())?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// Build state around an existing gateway, e.g. one wired to a custom provider.
    pub fn with_gateway(config: ServerConfig, gateway: Arc<Gateway>) -> Self {
        Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            gateway,
            metrics: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Match a presented key against the configured ones in constant time.
    /// Every configured key is compared so timing does not reveal which matched.
    pub fn match_api_key(&self, presented: &str) -> Option<usize> {
        let mut matched = None;
        for (slot, key) in self.config.api_keys.iter().enumerate() {
            if key.is_empty() {
                continue;
            }
            let equal: bool = presented.as_bytes().ct_eq(key.expose().as_bytes()).into();
            if equal && matched.is_none() {
                matched = Some(slot);
            }
        }
        matched
    }

    /// Check if API key is valid
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.match_api_key(key).is_some()
    }

    /// Check rate limit for a key slot; `None` is the unauthenticated bucket.
    pub fn check_rate_limit(&self, slot: Option<usize>) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;
        if limit == 0 {
            return true;
        }

        let mut entry = self
            .rate_limiter
            .entry(slot.unwrap_or(ANONYMOUS))
            .or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset if window has passed
        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}
