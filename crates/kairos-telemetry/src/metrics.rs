use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

/// The five fixed production metrics (§4.2):
/// `errors.total{code,component,recoverable}`, `errors.recovered{code}`,
/// `errors.rate{component}`, `health.status{component}`,
/// `circuitbreaker.state{component}`.
///
/// A minimal in-process registry; record functions are no-ops cost-wise when
/// nothing ever reads them, and safe for concurrent emission (§5).
#[derive(Default)]
pub struct MetricsRegistry {
    errors_total: Mutex<HashMap<(String, String, bool), u64>>,
    errors_recovered: Mutex<HashMap<String, u64>>,
    health_status: Mutex<HashMap<String, u8>>,
    breaker_state: Mutex<HashMap<String, u8>>,
}

impl MetricsRegistry {
    pub fn record_error(&self, code: String, component: String, recoverable: bool) {
        *self
            .errors_total
            .lock()
            .entry((code, component, recoverable))
            .or_insert(0) += 1;
    }

    pub fn record_recovery(&self, code: String) {
        *self.errors_recovered.lock().entry(code).or_insert(0) += 1;
    }

    /// `errors.rate{component}` — errors observed for `component` divided by
    /// total calls observed for it since the registry was created. Callers
    /// supply `total_calls`; the gauge is derived rather than stored, since
    /// "rate" has no stable denominator to persist.
    pub fn error_rate(&self, component: &str, total_calls: u64) -> f64 {
        if total_calls == 0 {
            return 0.0;
        }
        let errors: u64 = self
            .errors_total
            .lock()
            .iter()
            .filter(|((_, c, _), _)| c == component)
            .map(|(_, count)| *count)
            .sum();
        errors as f64 / total_calls as f64
    }

    /// Health status gauge: 0 = unhealthy, 1 = degraded, 2 = healthy.
    pub fn set_health_status(&self, component: impl Into<String>, status: u8) {
        self.health_status.lock().insert(component.into(), status);
    }

    pub fn health_status(&self, component: &str) -> Option<u8> {
        self.health_status.lock().get(component).copied()
    }

    /// Circuit breaker state gauge: 0 = open, 1 = half-open, 2 = closed.
    pub fn set_breaker_state(&self, component: impl Into<String>, state: u8) {
        self.breaker_state.lock().insert(component.into(), state);
    }

    pub fn breaker_state(&self, component: &str) -> Option<u8> {
        self.breaker_state.lock().get(component).copied()
    }

    pub fn errors_total_snapshot(&self) -> HashMap<(String, String, bool), u64> {
        self.errors_total.lock().clone()
    }

    pub fn errors_recovered_snapshot(&self) -> HashMap<String, u64> {
        self.errors_recovered.lock().clone()
    }
}

static GLOBAL: OnceLock<MetricsRegistry> = OnceLock::new();

/// The process-wide metrics registry (§9: "global state is limited to the
/// telemetry provider registration and the config singleton").
pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL.get_or_init(MetricsRegistry::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_error_totals_by_code_component_recoverable() {
        let registry = MetricsRegistry::default();
        registry.record_error("TOOL_FAILURE".into(), "tool-executor".into(), true);
        registry.record_error("TOOL_FAILURE".into(), "tool-executor".into(), true);
        registry.record_error("TOOL_FAILURE".into(), "tool-executor".into(), true);

        let snapshot = registry.errors_total_snapshot();
        assert_eq!(
            snapshot[&("TOOL_FAILURE".to_owned(), "tool-executor".to_owned(), true)],
            3
        );
    }

    #[test]
    fn recovered_unchanged_when_retries_never_succeed() {
        let registry = MetricsRegistry::default();
        registry.record_error("TOOL_FAILURE".into(), "tool-executor".into(), true);
        assert!(registry.errors_recovered_snapshot().is_empty());
    }

    #[test]
    fn health_and_breaker_gauges_roundtrip() {
        let registry = MetricsRegistry::default();
        registry.set_health_status("agent", 2);
        registry.set_breaker_state("llm", 0);
        assert_eq!(registry.health_status("agent"), Some(2));
        assert_eq!(registry.breaker_state("llm"), Some(0));
    }
}
