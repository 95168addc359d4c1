//! Provider resilience: retry policy, circuit breaker and outbound rate limiting.
//!
//! All three are plain values owned by a [`Gateway`](crate::Gateway) instance,
//! so gateways pointed at different providers never share state.

mod circuit_breaker;
mod rate_limit;
mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::{RateLimitConfig, RateLimitStats, TokenBucket};
pub use retry::{
    execute_with_retry_async, execute_with_retry_before, execute_with_retry_if, RetryConfig,
    RetryResult, Retryable,
};
