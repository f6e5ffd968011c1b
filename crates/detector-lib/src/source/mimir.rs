//! HTTP client for a Prometheus-compatible query API (Mimir, Prometheus, Thanos)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use super::{promql, MetricsSource, QueryWindow};
use crate::error::{DetectError, Result};
use crate::models::{LabelSet, MetricKind, RawSeries, SeriesBatch, SERVICE_LABEL};
use crate::observability::DetectorMetrics;

/// Default request timeout for backend queries
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Envelope shared by all Prometheus API responses
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct Matrix {
    #[serde(default)]
    result: Vec<RawSeries>,
}

/// Series endpoint payload: some proxies wrap the label list in `data`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeriesPayload {
    Bare(Vec<LabelSet>),
    Wrapped { data: Vec<LabelSet> },
}

/// Client for `/api/v1/query_range` and `/api/v1/series`
#[derive(Clone)]
pub struct MimirClient {
    client: Client,
    base_url: String,
    metrics: DetectorMetrics,
}

impl MimirClient {
    /// Create a client for `base_url` (e.g. `http://mimir:9009/prometheus`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url)?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            metrics: DetectorMetrics::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    /// Run a range query and return the raw `data` field
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<serde_json::Value> {
        let mut url = self.endpoint("/api/v1/query_range")?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("start", &start.timestamp().to_string())
            .append_pair("end", &end.timestamp().to_string())
            .append_pair("step", &format!("{}s", step.as_secs()));

        self.get("query_range", url).await
    }

    /// List label sets of series matching any of `matchers`
    pub async fn series(
        &self,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<serde_json::Value> {
        let mut url = self.endpoint("/api/v1/series")?;
        {
            let mut pairs = url.query_pairs_mut();
            for matcher in matchers {
                pairs.append_pair("match[]", matcher);
            }
            pairs
                .append_pair("start", &start.timestamp().to_string())
                .append_pair("end", &end.timestamp().to_string());
        }

        self.get("series", url).await
    }

    async fn get(&self, api: &str, url: Url) -> Result<serde_json::Value> {
        debug!(api = %api, url = %url, "Querying metrics backend");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Upstream(format!(
                "mimir {} failed: {}",
                api, status
            )));
        }

        let body = response.bytes().await?;
        let envelope: ApiEnvelope = serde_json::from_slice(&body)?;
        if envelope.status != "success" {
            let message = if envelope.error.is_empty() {
                format!("{} failed", api)
            } else {
                envelope.error
            };
            return Err(DetectError::Upstream(message));
        }

        Ok(envelope.data)
    }
}

/// Decode a `query_range` matrix into a series batch
pub(crate) fn decode_matrix(data: serde_json::Value) -> Result<SeriesBatch> {
    let matrix: Matrix = serde_json::from_value(data)?;
    Ok(matrix.result)
}

/// Distinct non-empty service names from a series listing
pub(crate) fn decode_services(data: serde_json::Value) -> Result<Vec<String>> {
    let labels = match serde_json::from_value(data)? {
        SeriesPayload::Bare(labels) => labels,
        SeriesPayload::Wrapped { data } => data,
    };

    let services: BTreeSet<String> = labels
        .into_iter()
        .filter_map(|mut l| l.remove(SERVICE_LABEL))
        .filter(|name| !name.is_empty())
        .collect();

    Ok(services.into_iter().collect())
}

#[async_trait]
impl MetricsSource for MimirClient {
    async fn fetch(&self, kind: MetricKind, window: QueryWindow) -> Result<SeriesBatch> {
        let (start, end) = window.range_ending(Utc::now());
        let started = Instant::now();

        let result = self
            .query_range(&promql::query_for(kind), start, end, window.step)
            .await
            .and_then(decode_matrix);

        self.metrics
            .observe_fetch_latency(started.elapsed().as_secs_f64());
        if result.is_err() {
            self.metrics.inc_fetch_errors();
        }
        result
    }

    async fn list_services(&self, window: QueryWindow) -> Result<Vec<String>> {
        let (start, end) = window.range_ending(Utc::now());
        let data = self
            .series(&[promql::services_matcher()], start, end)
            .await?;
        decode_services(data)
    }
}
