use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::KairosResult;

/// Fallback strategies (§4.1): a static value, a wrapped error, the cached
/// last-known-good value, or an ordered chain trying each until one succeeds.
pub enum Fallback<T: Clone> {
    Static(T),
    Error(crate::error::KairosError),
    LastKnownGood(Mutex<Option<T>>),
    Chain(Vec<Fallback<T>>),
}

impl<T: Clone> Fallback<T> {
    pub fn static_value(value: T) -> Self {
        Fallback::Static(value)
    }

    pub fn last_known_good() -> Self {
        Fallback::LastKnownGood(Mutex::new(None))
    }

    pub fn chain(fallbacks: Vec<Fallback<T>>) -> Self {
        Fallback::Chain(fallbacks)
    }

    /// Records a successful value for use by a `LastKnownGood` fallback.
    pub fn observe_success(&self, value: &T) {
        match self {
            Fallback::LastKnownGood(cache) => {
                *cache.lock() = Some(value.clone());
            }
            Fallback::Chain(chain) => {
                for fallback in chain {
                    fallback.observe_success(value);
                }
            }
            _ => {}
        }
    }

    pub fn resolve(&self) -> KairosResult<T> {
        match self {
            Fallback::Static(value) => Ok(value.clone()),
            Fallback::Error(err) => Err(clone_error(err)),
            Fallback::LastKnownGood(cache) => cache
                .lock()
                .clone()
                .ok_or_else(|| crate::error::KairosError::internal("no last-known-good value cached")),
            Fallback::Chain(chain) => {
                let mut last_err = None;
                for fallback in chain {
                    match fallback.resolve() {
                        Ok(value) => return Ok(value),
                        Err(err) => last_err = Some(err),
                    }
                }
                Err(last_err
                    .unwrap_or_else(|| crate::error::KairosError::internal("empty fallback chain")))
            }
        }
    }
}

fn clone_error(err: &crate::error::KairosError) -> crate::error::KairosError {
    let mut cloned = crate::error::KairosError::new(err.kind, err.message.clone());
    cloned.context = err.context.clone();
    cloned.attributes = err.attributes.clone();
    cloned.recoverable = err.recoverable;
    cloned
}

/// Counts consecutive errors against a threshold; at or over threshold,
/// routes calls through `fallback`. A success resets the counter.
pub struct GracefulDegradation<T: Clone> {
    threshold: u32,
    consecutive_errors: AtomicU32,
    fallback: Fallback<T>,
}

impl<T: Clone> GracefulDegradation<T> {
    pub fn new(threshold: u32, fallback: Fallback<T>) -> Self {
        Self {
            threshold,
            consecutive_errors: AtomicU32::new(0),
            fallback,
        }
    }

    pub async fn call<F, Fut>(&self, operation: F) -> KairosResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = KairosResult<T>>,
    {
        if self.consecutive_errors.load(Ordering::SeqCst) >= self.threshold {
            return self.fallback.resolve();
        }

        match operation().await {
            Ok(value) => {
                self.consecutive_errors.store(0, Ordering::SeqCst);
                self.fallback.observe_success(&value);
                Ok(value)
            }
            Err(err) => {
                self.consecutive_errors.fetch_add(1, Ordering::SeqCst);
                if self.consecutive_errors.load(Ordering::SeqCst) >= self.threshold {
                    self.fallback.resolve()
                } else {
                    Err(err)
                }
            }
        }
    }
}
