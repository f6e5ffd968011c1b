//! Per-request detection pipeline
//!
//! sanitize → normalize → forest → top-K → events, run independently for
//! every series of a batch on tokio's blocking pool.

use chrono::SecondsFormat;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::anomaly::{
    sanitize_series, select_top_k_with_rng, z_score, EventReporter, EventSink, ForestParams,
    DEFAULT_NUM_TREES, DEFAULT_SUBSAMPLE_CAP,
};
use crate::error::{DetectError, Result};
use crate::models::{
    AnomalyPoint, AnomalyResponse, MetricKind, SanitizedSeries, SeriesBatch, SeriesLabels,
    SeriesSummary,
};
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::source::{MetricsSource, QueryWindow};

/// Default number of points reported per series
pub const DEFAULT_TOP_K: usize = 3;

/// Default minimum score for emitting an anomaly event
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.6;

/// Tunables for one detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    pub top_k: usize,
    pub num_trees: usize,
    pub subsample_cap: usize,
    pub threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            num_trees: DEFAULT_NUM_TREES,
            subsample_cap: DEFAULT_SUBSAMPLE_CAP,
            threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl DetectionConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            num_trees: self.num_trees,
            subsample_cap: self.subsample_cap,
        }
    }
}

/// Per-series scoring tasks of one `summarize` call
///
/// Dropping it (request cancelled, or an early error) stops tasks that have
/// not started and keeps running ones from emitting events.
struct AbortOnDrop<T> {
    handles: Vec<JoinHandle<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Runs the detection pipeline for series batches
#[derive(Clone)]
pub struct Detector {
    config: DetectionConfig,
    reporter: EventReporter,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
}

impl Detector {
    pub fn new(config: DetectionConfig, sink: Arc<dyn EventSink>, logger: StructuredLogger) -> Self {
        Self {
            config,
            reporter: EventReporter::new(sink),
            metrics: DetectorMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Score one sanitized series with a thread-local random source
    ///
    /// Returns `None` for a series without points.
    pub fn detect_series(&self, series: &SanitizedSeries, kind: MetricKind) -> Option<SeriesSummary> {
        self.detect_series_with_rng(series, kind, &mut rand::thread_rng())
    }

    /// Score one sanitized series with an injected random source
    pub fn detect_series_with_rng<R: Rng>(
        &self,
        series: &SanitizedSeries,
        kind: MetricKind,
        rng: &mut R,
    ) -> Option<SeriesSummary> {
        self.detect_series_unless(series, kind, rng, &AtomicBool::new(false))
    }

    /// Score one series unless `cancelled` is set
    ///
    /// The flag is checked before training and again right before events are
    /// emitted; a cancelled series yields `None` and emits nothing.
    fn detect_series_unless<R: Rng>(
        &self,
        series: &SanitizedSeries,
        kind: MetricKind,
        rng: &mut R,
        cancelled: &AtomicBool,
    ) -> Option<SeriesSummary> {
        if series.is_empty() || cancelled.load(Ordering::Acquire) {
            return None;
        }

        let normalized = z_score(&series.values);
        let result = select_top_k_with_rng(
            &normalized,
            self.config.top_k,
            self.config.forest_params(),
            rng,
        );

        if cancelled.load(Ordering::Acquire) {
            return None;
        }
        self.reporter.report(
            series.service_name(),
            kind,
            &result.top,
            &result.scores,
            self.config.threshold,
        );

        let top = result
            .ranked()
            .into_iter()
            .map(|(i, score)| AnomalyPoint {
                time: series.timestamps[i].to_rfc3339_opts(SecondsFormat::Secs, true),
                value: series.values[i],
                score,
            })
            .collect();

        Some(SeriesSummary {
            labels: SeriesLabels::from(&series.labels),
            points: series.len(),
            top,
        })
    }

    /// Score every series of a batch
    ///
    /// Fails with `NoData` for an empty batch. Series without points are
    /// skipped; results keep batch order.
    pub async fn summarize(
        &self,
        batch: SeriesBatch,
        kind: MetricKind,
        window_minutes: u32,
    ) -> Result<AnomalyResponse> {
        if batch.is_empty() {
            return Err(DetectError::NoData);
        }

        let started = Instant::now();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut tasks = AbortOnDrop {
            handles: batch
                .into_iter()
                .map(|raw| {
                    let detector = self.clone();
                    let cancelled = cancelled.clone();
                    tokio::task::spawn_blocking(move || {
                        let series = sanitize_series(&raw);
                        detector.detect_series_unless(
                            &series,
                            kind,
                            &mut rand::thread_rng(),
                            &cancelled,
                        )
                    })
                })
                .collect(),
            cancelled,
        };

        let mut results = Vec::with_capacity(tasks.handles.len());
        for handle in tasks.handles.iter_mut() {
            let summary = handle
                .await
                .map_err(|e| DetectError::Worker(e.to_string()))?;
            results.extend(summary);
        }

        let elapsed = started.elapsed();
        self.metrics
            .observe_detection_latency(kind, elapsed.as_secs_f64());
        self.metrics.inc_series_analyzed(kind, results.len() as u64);
        self.logger
            .log_detection(kind, results.len(), elapsed.as_millis() as u64);

        Ok(AnomalyResponse {
            window_minutes,
            series: results.len(),
            results,
            metric: kind,
        })
    }

    /// Fetch one batch from `source` and score it
    ///
    /// Fetch failures are returned unchanged.
    pub async fn run(
        &self,
        source: &dyn MetricsSource,
        kind: MetricKind,
        window: QueryWindow,
    ) -> Result<AnomalyResponse> {
        let batch = match source.fetch(kind, window).await {
            Ok(batch) => batch,
            Err(e) => {
                self.logger.log_fetch_failure(kind, &e.to_string());
                return Err(e);
            }
        };
        debug!(metric = %kind, series = batch.len(), "Fetched series batch");

        self.summarize(batch, kind, window.minutes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyEvent;
    use crate::models::{LabelSet, RawSeries, SERVICE_LABEL};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AnomalyEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &AnomalyEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    struct StaticSource {
        batch: Option<SeriesBatch>,
    }

    #[async_trait]
    impl MetricsSource for StaticSource {
        async fn fetch(&self, _kind: MetricKind, _window: QueryWindow) -> Result<SeriesBatch> {
            self.batch
                .clone()
                .ok_or_else(|| DetectError::Upstream("mimir query_range failed: 503".into()))
        }

        async fn list_services(&self, _window: QueryWindow) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn detector_with_sink() -> (Detector, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let detector = Detector::new(
            DetectionConfig::default(),
            sink.clone(),
            StructuredLogger::new("test"),
        );
        (detector, sink)
    }

    fn raw_series(service: &str, values: &[f64]) -> RawSeries {
        let mut labels = LabelSet::new();
        labels.insert(SERVICE_LABEL.to_string(), service.to_string());
        RawSeries {
            labels,
            values: values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![json!(1_700_000_000 + i as i64 * 60), json!(v.to_string())])
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_no_data() {
        let (detector, _) = detector_with_sink();
        let err = detector
            .summarize(Vec::new(), MetricKind::Rps, 30)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::NoData));
    }

    #[tokio::test]
    async fn test_constant_series_yields_uniform_scores() {
        let (detector, _) = detector_with_sink();
        let batch = vec![raw_series("api", &[2.0; 10])];

        let response = detector.summarize(batch, MetricKind::Rps, 30).await.unwrap();

        assert_eq!(response.series, 1);
        let summary = &response.results[0];
        assert_eq!(summary.points, 10);
        assert_eq!(summary.top.len(), DEFAULT_TOP_K);
        let first = summary.top[0].score;
        assert!(first.is_finite());
        assert!(summary.top.iter().all(|p| p.score == first));
        assert!(summary.top.iter().all(|p| p.value == 2.0));
    }

    #[tokio::test]
    async fn test_series_without_points_are_skipped() {
        let (detector, _) = detector_with_sink();
        let empty = RawSeries {
            labels: LabelSet::new(),
            values: vec![vec![json!(1_700_000_000)]],
        };
        let batch = vec![empty, raw_series("web", &[1.0, 2.0, 3.0])];

        let response = detector.summarize(batch, MetricKind::ErrorRate, 15).await.unwrap();

        assert_eq!(response.series, 1);
        assert_eq!(response.window_minutes, 15);
        assert_eq!(response.metric, MetricKind::ErrorRate);
        assert_eq!(response.results[0].labels.service_name, "web");
    }

    #[tokio::test]
    async fn test_results_keep_batch_order() {
        let (detector, _) = detector_with_sink();
        let batch = vec![
            raw_series("a", &[1.0, 2.0, 1.5]),
            raw_series("b", &[5.0, 5.5, 9.0]),
            raw_series("c", &[0.1, 0.2, 0.1]),
        ];

        let response = detector.summarize(batch, MetricKind::Rps, 30).await.unwrap();
        let names: Vec<_> = response
            .results
            .iter()
            .map(|r| r.labels.service_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_outlier_reported_with_unnormalized_value() {
        let (detector, sink) = detector_with_sink();
        let mut values = vec![10.0; 30];
        for (i, v) in values.iter_mut().enumerate() {
            *v += (i % 3) as f64 * 0.1;
        }
        values[17] = 80.0;
        let series = sanitize_series(&raw_series("checkout", &values));

        let mut rng = StdRng::seed_from_u64(9);
        let summary = detector
            .detect_series_with_rng(&series, MetricKind::Rps, &mut rng)
            .unwrap();

        assert_eq!(summary.top[0].value, 80.0);
        // 1_700_000_000 + 17 * 60
        assert_eq!(summary.top[0].time, "2023-11-14T22:30:20Z");

        let events = sink.events.lock().unwrap();
        assert!(events.iter().any(|e| e.index == 17 && e.service == "checkout"));
        assert!(events.iter().all(|e| e.score >= DEFAULT_SCORE_THRESHOLD));
    }

    #[test]
    fn test_cancelled_series_emits_nothing() {
        let (detector, sink) = detector_with_sink();
        let series = sanitize_series(&raw_series("api", &[1.0, 1.0, 50.0, 1.0]));
        let cancelled = AtomicBool::new(true);

        let summary = detector.detect_series_unless(
            &series,
            MetricKind::Rps,
            &mut StdRng::seed_from_u64(3),
            &cancelled,
        );

        assert!(summary.is_none());
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_summarize_stops_emitting_events() {
        let sink = Arc::new(RecordingSink::default());
        let config = DetectionConfig {
            num_trees: 2000,
            threshold: 0.0,
            ..DetectionConfig::default()
        };
        let detector = Detector::new(config, sink.clone(), StructuredLogger::new("test"));

        let values: Vec<f64> = (0..500)
            .map(|i| if i % 97 == 0 { 40.0 } else { (i % 7) as f64 })
            .collect();
        let batch: Vec<_> = (0..400)
            .map(|i| raw_series(&format!("svc-{i}"), &values))
            .collect();

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            detector.summarize(batch, MetricKind::Rps, 30),
        )
        .await;
        assert!(outcome.is_err(), "scoring 400 series should outlast 20ms");

        // let tasks that were mid-report at cancellation finish
        tokio::time::sleep(Duration::from_millis(200)).await;
        let at_cancel = sink.events.lock().unwrap().len();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let later = sink.events.lock().unwrap().len();

        assert_eq!(at_cancel, later);
        assert!(later < 400 * DEFAULT_TOP_K);
    }

    #[tokio::test]
    async fn test_run_propagates_fetch_failure() {
        let (detector, _) = detector_with_sink();
        let source = StaticSource { batch: None };

        let err = detector
            .run(&source, MetricKind::Rps, QueryWindow::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "mimir query_range failed: 503");
    }

    #[tokio::test]
    async fn test_run_fetches_and_scores() {
        let (detector, _) = detector_with_sink();
        let source = StaticSource {
            batch: Some(vec![raw_series("api", &[1.0, 1.1, 0.9, 7.0])]),
        };

        let response = detector
            .run(&source, MetricKind::Rps, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(response.window_minutes, 30);
        assert_eq!(response.results[0].points, 4);
    }
}
