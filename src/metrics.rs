// Prometheus metrics for the diagnostics endpoint
//
// Exposed on /metrics when enabled:
// - Requests by outcome (counter)
// - Diagnostic execution latency by command (histogram)
// - Subprocess timeouts (counter)

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref DIAGNOSTIC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("diagnostic_requests_total", "Diagnostic requests by outcome"),
        &["outcome"]
    ).expect("Failed to create diagnostic requests metric");

    pub static ref DIAGNOSTIC_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("diagnostic_duration_seconds", "Diagnostic execution time in seconds"),
        &["command"]
    ).expect("Failed to create diagnostic duration metric");

    pub static ref SUBPROCESS_TIMEOUTS_TOTAL: IntCounter = IntCounter::new(
        "diagnostic_subprocess_timeouts_total",
        "Diagnostic subprocesses killed after exceeding their timeout"
    ).expect("Failed to create subprocess timeouts metric");
}

static INIT: Once = Once::new();

/// Register all metrics. Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(DIAGNOSTIC_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DIAGNOSTIC_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(SUBPROCESS_TIMEOUTS_TOTAL.clone()))?;
    Ok(())
}

/// Count one finished request
pub fn record_outcome(outcome: &str) {
    DIAGNOSTIC_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
