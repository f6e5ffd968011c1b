//! Anomaly detection library for span-metric time series
//!
//! This crate provides the core functionality for:
//! - Sanitizing and z-score normalizing raw metric series
//! - Isolation Forest scoring and top-K anomaly selection
//! - Threshold-gated anomaly events
//! - Fetching series from a Prometheus-compatible backend
//! - Health checks and observability

pub mod anomaly;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod source;

pub use error::{DetectError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
pub use pipeline::{DetectionConfig, Detector};
