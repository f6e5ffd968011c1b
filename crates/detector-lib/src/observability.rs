//! Observability infrastructure for the anomaly service
//!
//! Provides:
//! - Prometheus metrics (detection latency, fetch latency, series and anomaly counts)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, Histogram, HistogramVec, IntCounter,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::anomaly::AnomalyEvent;
use crate::models::MetricKind;

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    detection_duration_seconds: HistogramVec,
    fetch_duration_seconds: Histogram,
    series_analyzed: IntCounterVec,
    anomalies_detected: IntCounterVec,
    fetch_errors: IntCounter,
    services_discovered: IntGauge,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            detection_duration_seconds: register_histogram_vec!(
                "iforest_detection_duration_seconds",
                "Time spent scoring one series batch",
                &["metric"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_duration_seconds"),

            fetch_duration_seconds: register_histogram!(
                "iforest_fetch_duration_seconds",
                "Time spent fetching series from the metrics backend",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_duration_seconds"),

            series_analyzed: register_int_counter_vec!(
                "iforest_series_analyzed_total",
                "Total number of series scored",
                &["metric"]
            )
            .expect("Failed to register series_analyzed"),

            anomalies_detected: register_int_counter_vec!(
                "iforest_anomalies_detected_total",
                "Total number of anomaly events emitted",
                &["metric"]
            )
            .expect("Failed to register anomalies_detected"),

            fetch_errors: register_int_counter!(
                "iforest_fetch_errors_total",
                "Total number of failed metrics backend fetches"
            )
            .expect("Failed to register fetch_errors"),

            services_discovered: register_int_gauge!(
                "iforest_services_discovered",
                "Number of services found by startup discovery"
            )
            .expect("Failed to register services_discovered"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DetectorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DetectorMetrics")
    }
}

impl DetectorMetrics {
    /// Create a metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_detection_latency(&self, metric: MetricKind, duration_secs: f64) {
        self.inner()
            .detection_duration_seconds
            .with_label_values(&[metric.as_str()])
            .observe(duration_secs);
    }

    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_duration_seconds.observe(duration_secs);
    }

    pub fn inc_series_analyzed(&self, metric: MetricKind, count: u64) {
        self.inner()
            .series_analyzed
            .with_label_values(&[metric.as_str()])
            .inc_by(count);
    }

    pub fn inc_anomalies_detected(&self, metric: MetricKind) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[metric.as_str()])
            .inc();
    }

    pub fn inc_fetch_errors(&self) {
        self.inner().fetch_errors.inc();
    }

    pub fn set_services_discovered(&self, count: i64) {
        self.inner().services_discovered.set(count);
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for anomalies, detection runs
/// and lifecycle events.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log one anomaly event
    pub fn log_anomaly(&self, event: &AnomalyEvent) {
        warn!(
            event = "anomaly_detected",
            instance = %self.instance,
            service = %event.service,
            metric = %event.metric,
            index = event.index,
            score = event.score,
            threshold = event.threshold,
            "anomaly detected: service={} metric={}",
            event.service,
            event.metric
        );
    }

    /// Log a completed detection request
    pub fn log_detection(&self, metric: MetricKind, series: usize, duration_ms: u64) {
        info!(
            event = "detection_completed",
            instance = %self.instance,
            metric = %metric,
            series = series,
            duration_ms = duration_ms,
            "Scored series batch"
        );
    }

    /// Log a failed backend fetch
    pub fn log_fetch_failure(&self, metric: MetricKind, error: &str) {
        warn!(
            event = "fetch_failed",
            instance = %self.instance,
            metric = %metric,
            error = %error,
            "Failed to fetch series from metrics backend"
        );
    }

    /// Log a discovery attempt that found nothing yet
    pub fn log_discovery_waiting(&self, attempt: u32, error: Option<&str>) {
        info!(
            event = "discovery_waiting",
            instance = %self.instance,
            attempt = attempt,
            error = ?error,
            "anomaly detection startup: waiting for metrics"
        );
    }

    /// Log the services that will be analysed
    pub fn log_discovery_result(&self, services: &[String]) {
        info!(
            event = "discovery_completed",
            instance = %self.instance,
            count = services.len(),
            services = %services.join(", "),
            "anomalies will be detected on services"
        );
    }

    /// Log that discovery gave up
    pub fn log_discovery_gave_up(&self, attempts: u32, error: Option<&str>) {
        warn!(
            event = "discovery_gave_up",
            instance = %self.instance,
            attempts = attempts,
            error = ?error,
            "anomaly detection startup: could not list services yet"
        );
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            version = %version,
            listen_addr = %listen_addr,
            "isolation-forest service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "isolation-forest service shutting down"
        );
    }
}
