//! Typed error kind and the resilience primitives (retry, circuit breaker,
//! fallback, timeout) used throughout the Kairos runtime.
//!
//! Mirrors the shape of a single concrete error type carrying rich context
//! rather than an exception hierarchy: one type, variant by `kind`.

mod breaker;
mod cancellation;
mod error;
mod fallback;
mod retry;
mod timeout;

pub use breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use cancellation::CancellationToken;
pub use error::{ErrorKind, KairosError, KairosResult};
pub use fallback::{Fallback, GracefulDegradation};
pub use retry::{RetryConfig, retry, retry_with};
pub use timeout::timeout;
