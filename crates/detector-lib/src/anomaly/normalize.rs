//! Z-score normalization

/// Added to the standard deviation so constant series do not divide by zero
pub const NORMALIZE_EPSILON: f64 = 1e-9;

/// Mean and population standard deviation
///
/// The standard deviation is zero for series of length 0 or 1.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    if values.len() <= 1 {
        return (mean, 0.0);
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Standardize a series to zero mean and unit variance
pub fn z_score(values: &[f64]) -> Vec<f64> {
    let (mean, std_dev) = mean_std(values);
    values
        .iter()
        .map(|v| (v - mean) / (std_dev + NORMALIZE_EPSILON))
        .collect()
}
