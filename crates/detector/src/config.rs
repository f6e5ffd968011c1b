//! Service configuration

use anyhow::{Context, Result};
use detector_lib::{pipeline::DEFAULT_SCORE_THRESHOLD, source::QueryWindow, DetectionConfig};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable prefix (`IFOREST_MIMIR_URL`, `IFOREST_WINDOW_MINUTES`, ...)
pub const ENV_PREFIX: &str = "IFOREST";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the Prometheus-compatible API
    #[serde(default = "default_mimir_url")]
    pub mimir_url: String,

    /// Lookback window in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Sampling step in seconds
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,

    /// Minimum score for emitting an anomaly event
    #[serde(default = "default_threshold")]
    pub anomaly_score_threshold: f64,

    /// Points reported per series
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Trees per forest
    #[serde(default = "default_num_trees")]
    pub num_trees: usize,

    /// Cap on the per-tree subsample size
    #[serde(default = "default_subsample_cap")]
    pub subsample_cap: usize,

    /// Address the HTTP server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Backend request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Startup discovery attempts
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,

    /// Delay between discovery attempts in seconds
    #[serde(default = "default_discovery_delay_secs")]
    pub discovery_delay_secs: u64,

    /// Timeout per discovery attempt in seconds
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
}

fn default_mimir_url() -> String {
    "http://mimir:9009/prometheus".to_string()
}

fn default_window_minutes() -> u32 {
    30
}

fn default_step_secs() -> u64 {
    60
}

fn default_threshold() -> f64 {
    DEFAULT_SCORE_THRESHOLD
}

fn default_top_k() -> usize {
    3
}

fn default_num_trees() -> usize {
    100
}

fn default_subsample_cap() -> usize {
    64
}

fn default_listen_addr() -> String {
    "0.0.0.0:9030".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_discovery_attempts() -> u32 {
    30
}

fn default_discovery_delay_secs() -> u64 {
    2
}

fn default_discovery_timeout_secs() -> u64 {
    5
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mimir_url: default_mimir_url(),
            window_minutes: default_window_minutes(),
            step_secs: default_step_secs(),
            anomaly_score_threshold: default_threshold(),
            top_k: default_top_k(),
            num_trees: default_num_trees(),
            subsample_cap: default_subsample_cap(),
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
            discovery_attempts: default_discovery_attempts(),
            discovery_delay_secs: default_discovery_delay_secs(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `IFOREST_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load configuration from an arbitrary `config` source
    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.window_minutes > 0, "window_minutes must be positive");
        anyhow::ensure!(self.step_secs > 0, "step_secs must be positive");
        anyhow::ensure!(self.num_trees > 0, "num_trees must be positive");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.anomaly_score_threshold),
            "anomaly_score_threshold must be within [0, 1]"
        );
        Ok(())
    }

    pub fn detection(&self) -> DetectionConfig {
        DetectionConfig {
            top_k: self.top_k,
            num_trees: self.num_trees,
            subsample_cap: self.subsample_cap,
            threshold: self.anomaly_score_threshold,
        }
    }

    pub fn window(&self) -> QueryWindow {
        QueryWindow::new(self.window_minutes, Duration::from_secs(self.step_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_source(env(&[])).unwrap();

        assert_eq!(config.mimir_url, "http://mimir:9009/prometheus");
        assert_eq!(config.window_minutes, 30);
        assert_eq!(config.anomaly_score_threshold, 0.6);
        assert_eq!(config.listen_addr, "0.0.0.0:9030");
        assert_eq!(config.detection(), DetectionConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = ServiceConfig::from_source(env(&[
            ("IFOREST_MIMIR_URL", "http://localhost:9090"),
            ("IFOREST_WINDOW_MINUTES", "60"),
            ("IFOREST_ANOMALY_SCORE_THRESHOLD", "0.75"),
            ("IFOREST_TOP_K", "5"),
        ]))
        .unwrap();

        assert_eq!(config.mimir_url, "http://localhost:9090");
        assert_eq!(config.window().minutes, 60);
        assert_eq!(config.detection().threshold, 0.75);
        assert_eq!(config.detection().top_k, 5);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let result = ServiceConfig::from_source(env(&[("IFOREST_ANOMALY_SCORE_THRESHOLD", "1.5")]));
        assert!(result.is_err());
    }
}
