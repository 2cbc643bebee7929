use crate::error::{GuardError, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
///
/// The record functions below are no-ops until a recorder is installed.
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the Prometheus recorder process-wide
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GuardError::Metrics(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_gauge!(
            "circuit_guard_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
        );
        describe_counter!(
            "circuit_guard_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );
        describe_counter!(
            "circuit_guard_calls_total",
            "Guarded calls by outcome; each finished or refused call lands in exactly one of success, failure, rejected, stale"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Get the Prometheus metrics handle
    pub fn handle(&self) -> Arc<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record circuit breaker state
/// State: 0 = Closed, 1 = Open, 2 = HalfOpen
pub fn record_circuit_breaker_state(breaker: &str, state: u8) {
    let labels = [("breaker", breaker.to_string())];
    gauge!("circuit_guard_breaker_state", &labels).set(state as f64);
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(breaker: &str, from_state: &str, to_state: &str) {
    let labels = [
        ("breaker", breaker.to_string()),
        ("from", from_state.to_string()),
        ("to", to_state.to_string()),
    ];
    counter!("circuit_guard_breaker_transitions_total", &labels).increment(1);
}

/// Record the outcome of a guarded call
pub fn record_call(breaker: &str, outcome: &str) {
    let labels = [
        ("breaker", breaker.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("circuit_guard_calls_total", &labels).increment(1);
}
