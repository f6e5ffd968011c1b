//! Threshold-gated anomaly events
//!
//! Handles:
//! - Filtering selected points by score threshold
//! - Emitting one event per qualifying point through a pluggable sink
//! - Structured logging and Prometheus counting for emitted events

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::MetricKind;
use crate::observability::{DetectorMetrics, StructuredLogger};

/// One anomaly above the configured threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Service the series belongs to (`"unknown"` if unlabelled)
    pub service: String,
    pub metric: MetricKind,
    /// Index of the point in the sanitized series
    pub index: usize,
    pub score: f64,
    pub threshold: f64,
}

/// Destination for anomaly events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AnomalyEvent);
}

/// Sink that writes a structured log line and bumps the anomaly counter
#[derive(Clone)]
pub struct LogSink {
    logger: StructuredLogger,
    metrics: DetectorMetrics,
}

impl LogSink {
    pub fn new(logger: StructuredLogger, metrics: DetectorMetrics) -> Self {
        Self { logger, metrics }
    }
}

impl EventSink for LogSink {
    fn emit(&self, event: &AnomalyEvent) {
        self.logger.log_anomaly(event);
        self.metrics.inc_anomalies_detected(event.metric);
    }
}

/// Emits events for selected points whose score meets the threshold
#[derive(Clone)]
pub struct EventReporter {
    sink: Arc<dyn EventSink>,
}

impl EventReporter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Emit one event per index in `top` with `scores[i] >= threshold`
    ///
    /// Indices outside `scores` are ignored. Returns the emitted events.
    pub fn report(
        &self,
        service: &str,
        metric: MetricKind,
        top: &[usize],
        scores: &[f64],
        threshold: f64,
    ) -> Vec<AnomalyEvent> {
        let events: Vec<AnomalyEvent> = top
            .iter()
            .filter_map(|&index| {
                let score = *scores.get(index)?;
                (score >= threshold).then(|| AnomalyEvent {
                    service: service.to_string(),
                    metric,
                    index,
                    score,
                    threshold,
                })
            })
            .collect();

        for event in &events {
            self.sink.emit(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AnomalyEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &AnomalyEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_only_scores_at_or_above_threshold_emit() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = EventReporter::new(sink.clone());

        let events = reporter.report("checkout", MetricKind::Rps, &[0, 2, 1], &[0.9, 0.3, 0.7], 0.6);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[1].index, 2);

        let emitted = sink.events.lock().unwrap();
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|e| e.service == "checkout"));
        assert!(emitted.iter().all(|e| e.metric == MetricKind::Rps));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = EventReporter::new(sink.clone());

        let events = reporter.report("api", MetricKind::ErrorRate, &[0], &[0.6], 0.6);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_out_of_range_indices_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = EventReporter::new(sink.clone());

        let events = reporter.report("api", MetricKind::Rps, &[5, 0], &[0.95], 0.6);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 0);
    }

    #[test]
    fn test_report_does_not_touch_scores() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = EventReporter::new(sink);
        let scores = vec![0.1, 0.2];

        let events = reporter.report("api", MetricKind::Rps, &[1, 0], &scores, 0.6);
        assert!(events.is_empty());
        assert_eq!(scores, vec![0.1, 0.2]);
    }

    fn anomalies_counted(metric: &str) -> f64 {
        prometheus::gather()
            .iter()
            .filter(|family| family.get_name() == "iforest_anomalies_detected_total")
            .flat_map(|family| family.get_metric().iter())
            .filter(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "metric" && l.get_value() == metric)
            })
            .map(|m| m.get_counter().get_value())
            .sum()
    }

    #[test]
    fn test_log_sink_counts_anomalies() {
        let sink = LogSink::new(StructuredLogger::new("test"), DetectorMetrics::new());
        let before = anomalies_counted("rps");

        sink.emit(&AnomalyEvent {
            service: "api".to_string(),
            metric: MetricKind::Rps,
            index: 3,
            score: 0.8,
            threshold: 0.6,
        });

        assert!(anomalies_counted("rps") >= before + 1.0);
    }
}
