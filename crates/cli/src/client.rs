//! API client for communicating with the isolation-forest service

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the isolation-forest service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Fetch `/healthz`; an unhealthy service answers 503 with the same body
    pub async fn health(&self) -> Result<HealthReport> {
        let url = self.base_url.join("healthz").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub window_minutes: u32,
    pub series: usize,
    pub results: Vec<SeriesReport>,
    pub metric: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesReport {
    pub labels: SeriesLabels,
    pub points: usize,
    pub top: Vec<AnomalyPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesLabels {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub span_name: String,
    #[serde(default)]
    pub peer_service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyPoint {
    pub time: String,
    pub value: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: HashMap<String, ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_decodes_anomaly_report() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/anomalies/all")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"windowMinutes":30,"series":1,"metric":"rps","results":[
                    {"labels":{"service_name":"checkout","span_name":"GET /cart","peer_service":""},
                     "points":30,
                     "top":[{"time":"2023-11-14T22:13:20Z","value":1000.0,"score":0.82}]}]}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let report: AnomalyReport = client.get("anomalies/all").await.unwrap();

        mock.assert_async().await;
        assert_eq!(report.window_minutes, 30);
        assert_eq!(report.results[0].labels.service_name, "checkout");
        assert_eq!(report.results[0].top[0].score, 0.82);
    }

    #[tokio::test]
    async fn test_get_surfaces_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/anomalies/all_error")
            .with_status(500)
            .with_body("no data")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<AnomalyReport>("anomalies/all_error")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no data"));
    }

    #[tokio::test]
    async fn test_health_accepts_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                r#"{"status":"unhealthy","components":{
                    "detector":{"status":"unhealthy","message":"boom","last_check_timestamp":1}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let report = client.health().await.unwrap();

        assert_eq!(report.status, "unhealthy");
        assert_eq!(
            report.components["detector"].message.as_deref(),
            Some("boom")
        );
    }
}
