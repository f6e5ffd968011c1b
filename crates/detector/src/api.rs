//! HTTP API: anomaly endpoints, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use detector_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    source::{MetricsSource, QueryWindow},
    DetectError, Detector, MetricKind,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub detector: Detector,
    pub source: Arc<dyn MetricsSource>,
    pub health_registry: HealthRegistry,
    pub window: QueryWindow,
}

impl AppState {
    pub fn new(
        detector: Detector,
        source: Arc<dyn MetricsSource>,
        health_registry: HealthRegistry,
        window: QueryWindow,
    ) -> Self {
        Self {
            detector,
            source,
            health_registry,
            window,
        }
    }
}

/// Run one detection request and render it
async fn detect(state: &AppState, kind: MetricKind) -> Response {
    let result = state
        .detector
        .run(state.source.as_ref(), kind, state.window)
        .await;

    let health = &state.health_registry;
    match result {
        Ok(response) => {
            health.set_healthy(components::METRICS_SOURCE).await;
            health.set_healthy(components::DETECTOR).await;
            Json(response).into_response()
        }
        Err(e) => {
            match &e {
                // the backend answered, the window is just empty
                DetectError::NoData => health.set_healthy(components::METRICS_SOURCE).await,
                DetectError::Worker(message) => {
                    health.set_degraded(components::DETECTOR, message.clone()).await;
                }
                _ => {
                    health
                        .set_degraded(components::METRICS_SOURCE, e.to_string())
                        .await;
                }
            }
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Anomalies in request rate for every server span
async fn anomalies_rps(State(state): State<Arc<AppState>>) -> Response {
    detect(&state, MetricKind::Rps).await
}

/// Anomalies in error rate for every server span
async fn anomalies_error_rate(State(state): State<Arc<AppState>>) -> Response {
    detect(&state, MetricKind::ErrorRate).await
}

/// Health check response - 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/anomalies/all", get(anomalies_rps))
        .route("/anomalies/all_error", get(anomalies_error_rate))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "isolation-forest service listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
