//! Prometheus metrics collection for the scribed agent.
//!
//! Tracks push-pull throughput and latency, snapshot accounting and watch
//! stream population, exposed on the `/metrics` HTTP endpoint.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Changes received from clients via push-pull.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref PUSHPULL_RECEIVED_CHANGES: IntCounter = IntCounter::new(
        "scribed_pushpull_received_changes_total",
        "Changes received from clients"
    ).expect("PUSHPULL_RECEIVED_CHANGES metric creation failed");

    /// Changes delivered to clients via push-pull.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref PUSHPULL_SENT_CHANGES: IntCounter = IntCounter::new(
        "scribed_pushpull_sent_changes_total",
        "Changes delivered to clients"
    ).expect("PUSHPULL_SENT_CHANGES metric creation failed");

    /// Push-pull critical-section latency.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref PUSHPULL_RESPONSE_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("scribed_pushpull_response_seconds", "Push-pull handling latency")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("PUSHPULL_RESPONSE_SECONDS metric creation failed");

    /// Snapshots taken when a document's change backlog crossed the
    /// configured threshold.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref SNAPSHOTS_CREATED: IntCounter = IntCounter::new(
        "scribed_snapshots_created_total",
        "Document snapshots taken"
    ).expect("SNAPSHOTS_CREATED metric creation failed");

    /// Currently open watch streams.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref WATCH_STREAMS: IntGauge = IntGauge::new(
        "scribed_watch_streams",
        "Open watch streams"
    ).expect("WATCH_STREAMS metric creation failed");

    /// Events dropped because a subscriber's queue was full.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref EVENTS_DROPPED: IntCounter = IntCounter::new(
        "scribed_events_dropped_total",
        "Events dropped on slow watch subscribers"
    ).expect("EVENTS_DROPPED metric creation failed");

    /// Request errors by method and error code.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref REQUEST_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("scribed_request_errors_total", "Request errors by method"),
        &["method", "error"]
    ).expect("REQUEST_ERRORS metric creation failed");
}

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at agent startup before any metrics are recorded.
pub fn init() {
    if let Err(e) = REGISTRY.register(Box::new(PUSHPULL_RECEIVED_CHANGES.clone())) {
        tracing::warn!(error = %e, "Failed to register metric scribed_pushpull_received_changes_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(PUSHPULL_SENT_CHANGES.clone())) {
        tracing::warn!(error = %e, "Failed to register metric scribed_pushpull_sent_changes_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(PUSHPULL_RESPONSE_SECONDS.clone())) {
        tracing::warn!(error = %e, "Failed to register metric scribed_pushpull_response_seconds");
    }
    if let Err(e) = REGISTRY.register(Box::new(SNAPSHOTS_CREATED.clone())) {
        tracing::warn!(error = %e, "Failed to register metric scribed_snapshots_created_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(WATCH_STREAMS.clone())) {
        tracing::warn!(error = %e, "Failed to register metric scribed_watch_streams");
    }
    if let Err(e) = REGISTRY.register(Box::new(EVENTS_DROPPED.clone())) {
        tracing::warn!(error = %e, "Failed to register metric scribed_events_dropped_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(REQUEST_ERRORS.clone())) {
        tracing::warn!(error = %e, "Failed to register metric scribed_request_errors_total");
    }
}

/// Gather all metrics and encode them in Prometheus text format.
///
/// Returns a string suitable for HTTP response on the `/metrics` endpoint.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record one push-pull exchange.
#[inline]
pub fn record_push_pull(received: usize, sent: usize, duration_secs: f64) {
    PUSHPULL_RECEIVED_CHANGES.inc_by(received as u64);
    PUSHPULL_SENT_CHANGES.inc_by(sent as u64);
    PUSHPULL_RESPONSE_SECONDS.observe(duration_secs);
}

/// Record a request error.
#[inline]
pub fn record_request_error(method: &str, error: &str) {
    REQUEST_ERRORS.with_label_values(&[method, error]).inc();
}
