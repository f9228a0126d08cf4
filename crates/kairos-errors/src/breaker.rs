use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{KairosError, KairosResult};

/// Three-state circuit breaker (§4.1). Transitions:
/// `closed → open` on reaching the failure threshold; `open → half-open`
/// after the timeout elapses; `half-open → closed` after the success
/// threshold consecutive successes; any failure in `half-open → open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub name: String,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
}

/// Protects a single logical dependency. State transitions are serialized
/// under a mutex; reading the current state is lock-free cheap.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(last_failure) = inner.last_failure
                && last_failure.elapsed() >= self.config.open_timeout
            {
                inner.state = BreakerState::HalfOpen;
                inner.successes = 0;
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                }
            }
            BreakerState::Closed => {
                inner.failures = 0;
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.successes = 0;
                inner.failures = 0;
            }
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.failures = 0;
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Runs `operation` through the breaker. While `open`, short-circuits
    /// with a recoverable `INTERNAL` error tagged with the breaker name.
    pub async fn call<F, Fut, T>(&self, operation: F) -> KairosResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = KairosResult<T>>,
    {
        if self.state() == BreakerState::Open {
            return Err(KairosError::internal(format!(
                "circuit breaker '{}' is open",
                self.config.name
            ))
            .recoverable(true)
            .with_attribute("breaker", self.config.name.clone()));
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..CircuitBreakerConfig::new("test")
        });

        for _ in 0..2 {
            let _: KairosResult<()> = breaker
                .call(|| async { Err(KairosError::tool_failure("boom")) })
                .await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let result: KairosResult<()> = breaker.call(|| async { Ok(()) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn half_open_failure_reopens_without_full_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            open_timeout: Duration::from_millis(1),
            name: "test".to_owned(),
        });

        let _: KairosResult<()> = breaker
            .call(|| async { Err(KairosError::tool_failure("boom")) })
            .await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let _: KairosResult<()> = breaker
            .call(|| async { Err(KairosError::tool_failure("boom again")) })
            .await;
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn closes_after_success_threshold_in_half_open() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            open_timeout: Duration::from_millis(1),
            name: "test".to_owned(),
        });

        let _: KairosResult<()> = breaker
            .call(|| async { Err(KairosError::tool_failure("boom")) })
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        for _ in 0..2 {
            let _: KairosResult<()> = breaker.call(|| async { Ok(()) }).await;
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
