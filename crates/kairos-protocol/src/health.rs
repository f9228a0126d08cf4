use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `healthy(2) | degraded(1) | unhealthy(0)` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unhealthy = 0,
    Degraded = 1,
    Healthy = 2,
}

impl HealthStatus {
    pub fn as_gauge(self) -> u8 {
        self as u8
    }
}

/// TTL-cached health reading for a named component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthState {
    pub component: String,
    pub status: HealthStatus,
    pub observed_at: DateTime<Utc>,
}

impl HealthState {
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.observed_at < ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerStateKind {
    Closed,
    HalfOpen,
    Open,
}

/// Serializable snapshot of a circuit breaker's state for the data model
/// (§3); the executable state machine lives in `kairos-errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub component: String,
    pub state: BreakerStateKind,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}
