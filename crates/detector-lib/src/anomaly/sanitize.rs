//! Conversion of raw backend samples into finite values
//!
//! Invalid magnitudes are zeroed rather than dropped so the series keeps its
//! alignment with the sampling grid. Only pairs with the wrong arity are
//! skipped.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{RawSeries, SanitizedSeries};

/// Replace NaN and infinities with zero
///
/// Returns the usable value and whether the input was valid.
pub fn sane(v: f64) -> (f64, bool) {
    if v.is_nan() || v.is_infinite() {
        (0.0, false)
    } else {
        (v, true)
    }
}

/// Decode one `[timestamp, value]` pair
///
/// Returns `None` when the pair does not have exactly two elements.
pub fn parse_sample(pair: &[Value]) -> Option<(DateTime<Utc>, f64)> {
    if pair.len() != 2 {
        return None;
    }

    let secs = pair[0].as_f64().unwrap_or(0.0) as i64;
    let timestamp = DateTime::from_timestamp(secs, 0).unwrap_or_default();

    let raw = match &pair[1] {
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    };
    let (value, _) = sane(raw);

    Some((timestamp, value))
}

/// Sanitize a whole series, keeping labels and point order
pub fn sanitize_series(raw: &RawSeries) -> SanitizedSeries {
    let mut timestamps = Vec::with_capacity(raw.values.len());
    let mut values = Vec::with_capacity(raw.values.len());

    for (timestamp, value) in raw.values.iter().filter_map(|pair| parse_sample(pair)) {
        timestamps.push(timestamp);
        values.push(value);
    }

    SanitizedSeries {
        labels: raw.labels.clone(),
        timestamps,
        values,
    }
}
