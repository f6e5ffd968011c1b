//! Core data models for anomaly detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label set identifying one series (`service_name`, `span_name`, `peer_service`, ...)
pub type LabelSet = HashMap<String, String>;

/// Label carrying the service a series belongs to
pub const SERVICE_LABEL: &str = "service_name";
/// Label carrying the span (endpoint) name
pub const SPAN_LABEL: &str = "span_name";
/// Label carrying the calling service
pub const PEER_LABEL: &str = "peer_service";

/// Metric kind analysed by a detection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Requests per second
    Rps,
    /// Error calls divided by total calls
    ErrorRate,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Rps => "rps",
            MetricKind::ErrorRate => "error_rate",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One series as delivered by the backend (Prometheus matrix entry)
///
/// Pairs are kept untyped: the timestamp is numeric seconds and the value is
/// usually a string such as `"0.25"`, `"NaN"` or `"+Inf"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSeries {
    #[serde(rename = "metric", default)]
    pub labels: LabelSet,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl RawSeries {
    /// Service label, or `"unknown"` if the series has none
    pub fn service_name(&self) -> &str {
        service_or_unknown(&self.labels)
    }
}

/// All series returned for one request window
pub type SeriesBatch = Vec<RawSeries>;

/// A series whose values are all finite, aligned with its timestamps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedSeries {
    pub labels: LabelSet,
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl SanitizedSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Service label, or `"unknown"` if the series has none
    pub fn service_name(&self) -> &str {
        service_or_unknown(&self.labels)
    }
}

fn service_or_unknown(labels: &LabelSet) -> &str {
    match labels.get(SERVICE_LABEL) {
        Some(name) if !name.is_empty() => name,
        _ => "unknown",
    }
}

/// Identifying labels kept in the response payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesLabels {
    pub service_name: String,
    pub span_name: String,
    pub peer_service: String,
}

impl From<&LabelSet> for SeriesLabels {
    fn from(labels: &LabelSet) -> Self {
        let get = |key: &str| labels.get(key).cloned().unwrap_or_default();
        Self {
            service_name: get(SERVICE_LABEL),
            span_name: get(SPAN_LABEL),
            peer_service: get(PEER_LABEL),
        }
    }
}

/// One selected point of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPoint {
    /// Sample time in RFC3339
    pub time: String,
    /// Sanitized (not normalized) value
    pub value: f64,
    pub score: f64,
}

/// Anomaly summary for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub labels: SeriesLabels,
    /// Number of sanitized points analysed
    pub points: usize,
    pub top: Vec<AnomalyPoint>,
}

/// Response payload for one detection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResponse {
    pub window_minutes: u32,
    /// Number of entries in `results`
    pub series: usize,
    pub results: Vec<SeriesSummary>,
    pub metric: MetricKind,
}
