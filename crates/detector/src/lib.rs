//! Isolation-forest anomaly service
//!
//! HTTP surface and configuration around `detector-lib`.

pub mod api;
pub mod config;
