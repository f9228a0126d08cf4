use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kairos_protocol::HealthStatus;
use parking_lot::Mutex;

use crate::metrics::global_metrics;

/// Aggregates per-component health readings with a freshness TTL, and keeps
/// the `health.status{component}` gauge in sync as readings are recorded
/// (§3 "Health status", supplemented per the ambient telemetry stack).
pub struct HealthRegistry {
    ttl: chrono::Duration,
    states: Mutex<HashMap<String, kairos_protocol::HealthState>>,
}

impl HealthRegistry {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, component: impl Into<String>, status: HealthStatus, now: DateTime<Utc>) {
        let component = component.into();
        global_metrics().set_health_status(component.clone(), status.as_gauge());
        self.states.lock().insert(
            component.clone(),
            kairos_protocol::HealthState {
                component,
                status,
                observed_at: now,
            },
        );
    }

    /// The worst fresh status across all components, or `Unhealthy` if any
    /// component's last reading has aged out of the TTL.
    pub fn overall(&self, now: DateTime<Utc>) -> HealthStatus {
        let states = self.states.lock();
        if states.is_empty() {
            return HealthStatus::Healthy;
        }
        states
            .values()
            .map(|state| {
                if state.is_fresh(self.ttl, now) {
                    state.status
                } else {
                    HealthStatus::Unhealthy
                }
            })
            .min_by_key(|status| *status as u8)
            .unwrap_or(HealthStatus::Unhealthy)
    }

    pub fn snapshot(&self) -> Vec<kairos_protocol::HealthState> {
        self.states.lock().values().cloned().collect()
    }
}
