use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::cancellation::CancellationToken;
use crate::error::{KairosError, KairosResult};

/// Retry configuration (§4.1). Defaults: 3 attempts, 100ms initial delay,
/// 10s max delay, 2.0 multiplier, ±10% jitter, recoverable-by-default.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.10,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `k` (1-indexed, the delay preceding that attempt),
    /// perturbed by uniform `±jitter·delay`.
    pub fn delay_for_attempt(&self, k: u32) -> Duration {
        let exp = self.multiplier.powi(k.saturating_sub(1) as i32);
        let base = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        let perturb = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let perturbed = (base * (1.0 + perturb)).max(0.0);
        Duration::from_secs_f64(perturbed)
    }
}

fn default_is_recoverable(err: &KairosError) -> bool {
    err.recoverable
}

/// Retries `operation` per `config`. `is_recoverable` overrides the default
/// (`KairosError::recoverable`) classifier. Honors `cancel`: if cancellation
/// fires before the next attempt, fails with `CONTEXT_LOST` annotated with
/// attempt and max-attempts.
///
/// **Retry bound** (§8): `operation` is invoked at most `max_attempts` times.
pub async fn retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: F,
) -> KairosResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = KairosResult<T>>,
{
    retry_with(config, cancel, default_is_recoverable, operation).await
}

/// Like [`retry`] but with an explicit recoverability classifier.
pub async fn retry_with<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    is_recoverable: impl Fn(&KairosError) -> bool,
    mut operation: F,
) -> KairosResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = KairosResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(KairosError::context_lost("cancelled before attempt")
                .with_context("attempt", attempt)
                .with_context("max_attempts", config.max_attempts));
        }

        let result = operation(attempt).await;
        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                let recoverable = is_recoverable(&err);
                if attempt >= config.max_attempts || !recoverable {
                    return Err(err);
                }
                warn!(attempt, max_attempts = config.max_attempts, kind = %err.kind, "retrying after recoverable error");
                let delay = config.delay_for_attempt(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(KairosError::context_lost("cancelled during backoff")
                            .with_context("attempt", attempt)
                            .with_context("max_attempts", config.max_attempts));
                    }
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_up_to_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.0,
            jitter: 0.0,
        };
        let cancel = CancellationToken::new();
        let result: KairosResult<()> = retry(&config, &cancel, |_attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(KairosError::tool_failure("boom"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_without_exhausting_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.0,
            jitter: 0.0,
        };
        let cancel = CancellationToken::new();
        let result = retry(&config, &cancel, |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(KairosError::tool_failure("boom"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_recoverable_errors_do_not_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::default();
        let cancel = CancellationToken::new();
        let result: KairosResult<()> = retry(&config, &cancel, |_attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(KairosError::invalid_input("nope"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
