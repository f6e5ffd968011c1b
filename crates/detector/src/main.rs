//! Isolation-forest service - span-metrics anomaly detection
//!
//! Scores request-rate and error-rate series from a Prometheus-compatible
//! backend on demand and logs an event for every anomaly above threshold.

use anyhow::{Context, Result};
use detector_lib::{
    anomaly::LogSink,
    health::{components, HealthRegistry},
    observability::{DetectorMetrics, StructuredLogger},
    source::{DiscoveryOutcome, MetricsSource, MimirClient, StartupDiscovery},
    Detector,
};
use iforest_service::{api, config::ServiceConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServiceConfig::load()?;
    info!(mimir_url = %config.mimir_url, window_minutes = config.window_minutes, "Service configured");

    let logger = StructuredLogger::new("iforest-service");
    let metrics = DetectorMetrics::new();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_SOURCE).await;
    health_registry.register(components::DETECTOR).await;

    let source: Arc<dyn MetricsSource> = Arc::new(
        MimirClient::new(&config.mimir_url, config.request_timeout())
            .context("Failed to create metrics backend client")?,
    );

    let sink = Arc::new(LogSink::new(logger.clone(), metrics.clone()));
    let detector = Detector::new(config.detection(), sink, logger.clone());

    let app_state = Arc::new(api::AppState::new(
        detector,
        source.clone(),
        health_registry.clone(),
        config.window(),
    ));

    logger.log_startup(SERVICE_VERSION, &config.listen_addr);
    let api_handle = tokio::spawn(api::serve(config.listen_addr.clone(), app_state));

    // Discover services in the background; readiness flips once it is done
    let discovery = StartupDiscovery::new(
        config.discovery_attempts,
        Duration::from_secs(config.discovery_delay_secs),
        Duration::from_secs(config.discovery_timeout_secs),
    );
    let window = config.window();
    let discovery_logger = logger.clone();
    let discovery_health = health_registry.clone();
    tokio::spawn(async move {
        match discovery
            .run(source.as_ref(), window, &discovery_logger)
            .await
        {
            DiscoveryOutcome::Found(services) => {
                metrics.set_services_discovered(services.len() as i64);
            }
            DiscoveryOutcome::GaveUp { last_error, .. } => {
                let reason = last_error.unwrap_or_else(|| "no services reported yet".to_string());
                discovery_health
                    .set_degraded(components::METRICS_SOURCE, reason)
                    .await;
            }
        }
        discovery_health.set_ready(true).await;
    });

    tokio::select! {
        result = api_handle => {
            result.context("API server task failed")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    Ok(())
}
