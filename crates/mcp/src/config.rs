//! Tool server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable prefix (`MCP_MIMIR_URL`, `MCP_LISTEN_ADDR`, ...)
pub const ENV_PREFIX: &str = "MCP";

#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    /// Base URL of the Prometheus-compatible API
    #[serde(default = "default_mimir_url")]
    pub mimir_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Backend request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_mimir_url() -> String {
    "http://mimir:9009/prometheus".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:9020".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl McpConfig {
    /// Load configuration from `MCP_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

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
        anyhow::ensure!(
            parsed.request_timeout_secs > 0,
            "request_timeout_secs must be positive"
        );
        Ok(parsed)
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
        let config = McpConfig::from_source(env(&[])).unwrap();

        assert_eq!(config.mimir_url, "http://mimir:9009/prometheus");
        assert_eq!(config.listen_addr, "0.0.0.0:9020");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_environment_overrides() {
        let config = McpConfig::from_source(env(&[
            ("MCP_MIMIR_URL", "http://localhost:9090"),
            ("MCP_LISTEN_ADDR", "127.0.0.1:7000"),
        ]))
        .unwrap();

        assert_eq!(config.mimir_url, "http://localhost:9090");
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(McpConfig::from_source(env(&[("MCP_REQUEST_TIMEOUT_SECS", "0")])).is_err());
    }
}
