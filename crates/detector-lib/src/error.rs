//! Error types for detection requests

use thiserror::Error;

/// Errors surfaced by a detection request
///
/// Only fetch failures and an empty batch abort a request. Bad samples and
/// degenerate series are handled inside the pipeline and never show up here.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Transport failure talking to the metrics backend
    #[error("metrics backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered but reported a failure
    #[error("{0}")]
    Upstream(String),

    /// The backend payload could not be decoded
    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured backend URL is not usable
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The backend returned zero series for the window
    #[error("no data")]
    NoData,

    /// A per-series detection task was cancelled or panicked
    #[error("detection task failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, DetectError>;
