//! Series sources for detection requests
//!
//! This module provides the boundary to the metrics backend: a trait for
//! fetching one series batch per request, a Prometheus-compatible HTTP
//! client, PromQL builders and the startup discovery loop.

mod discovery;
mod mimir;
pub mod promql;

pub use discovery::{DiscoveryOutcome, StartupDiscovery};
pub use mimir::MimirClient;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::{MetricKind, SeriesBatch};

/// Lookback window and sampling step for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub minutes: u32,
    pub step: std::time::Duration,
}

impl QueryWindow {
    pub fn new(minutes: u32, step: std::time::Duration) -> Self {
        Self { minutes, step }
    }

    /// `(start, end)` of the window ending at `end`
    pub fn range_ending(&self, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (end - Duration::minutes(i64::from(self.minutes)), end)
    }
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            minutes: 30,
            step: std::time::Duration::from_secs(60),
        }
    }
}

/// Trait for metrics backend implementations
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch all series of `kind` over `window`
    ///
    /// An empty batch is a valid answer; the caller decides what it means.
    async fn fetch(&self, kind: MetricKind, window: QueryWindow) -> Result<SeriesBatch>;

    /// Distinct, sorted service names seen in `window`
    async fn list_services(&self, window: QueryWindow) -> Result<Vec<String>>;
}
