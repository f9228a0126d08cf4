//! Structured logging init, the fixed attribute taxonomy, and the fixed
//! metric set (§4.2) shared across the Kairos runtime.

mod attributes;
mod health;
mod init;
mod metrics;

pub use attributes::{FREE_TEXT_TRUNCATE, PLANNER_IO_TRUNCATE, SpanAttributes, truncate};
pub use health::HealthRegistry;
pub use init::{TelemetryConfig, TelemetryExporter, init_telemetry};
pub use metrics::{MetricsRegistry, global_metrics};

use kairos_errors::KairosError;
use tracing::Span;

/// Annotates `span` with the error's code and recoverable flag, copies
/// context/attribute entries onto the span, records the error metric, and
/// emits a structured log line. Mirrors the teacher's informal
/// `info!(event = %rendered, ...)` logging idiom, generalized into a single
/// entry point used at every span boundary (§7: "every error crossing a span
/// boundary is recorded via RecordError").
pub fn record_error(span: &Span, component: &str, err: &KairosError) {
    span.record("error.kind", tracing::field::display(err.kind));
    span.record("error.recoverable", err.recoverable);
    span.record("error.message", tracing::field::display(&err.message));

    for (key, value) in &err.attributes {
        tracing::event!(target: "kairos::error", tracing::Level::TRACE, key = %key, value = %value, "error attribute");
    }

    global_metrics().record_error(err.kind.to_string(), component.to_owned(), err.recoverable);

    tracing::error!(
        target: "kairos::error",
        component,
        kind = %err.kind,
        recoverable = err.recoverable,
        message = %err.message,
        "operation failed"
    );
}

/// Records a successful retry/fallback recovery from a previously recorded
/// error kind (§4.2 `errors.recovered{code}`).
pub fn record_recovery(kind: kairos_errors::ErrorKind) {
    global_metrics().record_recovery(kind.to_string());
}
