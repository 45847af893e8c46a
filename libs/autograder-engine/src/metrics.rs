// Prometheus metrics for the grading pipeline

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Once;
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Gradings by language and final execution status
    pub static ref GRADINGS: CounterVec = CounterVec::new(
        Opts::new("autograder_gradings_total", "Total number of submissions graded"),
        &["language", "status"]
    )
    .expect("metric can be created");

    // Sandbox calls by endpoint and outcome
    pub static ref SANDBOX_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("autograder_sandbox_requests_total", "Total sandbox API requests"),
        &["endpoint", "outcome"]
    )
    .expect("metric can be created");

    pub static ref SANDBOX_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "autograder_sandbox_latency_ms",
            "Sandbox request latency in milliseconds"
        )
        .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]),
        &["endpoint"]
    )
    .expect("metric can be created");

    // 1 while the circuit breaker is open
    pub static ref BREAKER_OPEN: IntGauge = IntGauge::new(
        "autograder_breaker_open",
        "Whether the sandbox circuit breaker is open"
    )
    .expect("metric can be created");
}

static INIT: Once = Once::new();

/// Register all collectors; safe to call more than once
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(GRADINGS.clone()),
            Box::new(SANDBOX_REQUESTS.clone()),
            Box::new(SANDBOX_LATENCY.clone()),
            Box::new(BREAKER_OPEN.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!(error = %e, "Failed to register metric collector");
            }
        }
    });
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    init_metrics();
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_grading(language: &str, status: &str) {
    GRADINGS.with_label_values(&[language, status]).inc();
}

pub fn record_sandbox_request(endpoint: &str, outcome: &str, latency_ms: f64) {
    SANDBOX_REQUESTS.with_label_values(&[endpoint, outcome]).inc();
    SANDBOX_LATENCY.with_label_values(&[endpoint]).observe(latency_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        init_metrics();
        init_metrics();
        record_grading("python", "completed");
        record_sandbox_request("execute", "ok", 12.0);

        let text = render_metrics();
        assert!(text.contains("autograder_gradings_total"));
        assert!(text.contains("autograder_sandbox_requests_total"));
        assert!(text.contains("autograder_sandbox_latency_ms"));
        assert!(text.contains("autograder_breaker_open"));
    }
}
