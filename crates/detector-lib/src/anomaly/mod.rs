//! Anomaly detection for span-metric series
//!
//! This module provides:
//! - Sanitizing raw backend samples into finite values
//! - Z-score normalization
//! - A univariate Isolation Forest
//! - Top-K selection and threshold-gated anomaly events

mod forest;
mod normalize;
mod reporter;
mod sanitize;
mod selector;

pub use forest::{average_path_length, IsolationForest, IsolationTree};
pub use normalize::{mean_std, z_score, NORMALIZE_EPSILON};
pub use reporter::{AnomalyEvent, EventReporter, EventSink, LogSink};
pub use sanitize::{parse_sample, sane, sanitize_series};
pub use selector::{
    select_top_k, select_top_k_with_rng, AnomalyResult, ForestParams, DEFAULT_NUM_TREES,
    DEFAULT_SUBSAMPLE_CAP,
};
