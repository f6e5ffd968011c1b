//! Top-K anomaly selection
//!
//! Trains one forest per call on the normalized series and scores the same
//! series in-sample.

use rand::Rng;
use std::cmp::Ordering;

use super::IsolationForest;

/// Default number of trees per forest
pub const DEFAULT_NUM_TREES: usize = 100;

/// Default cap on the per-tree subsample size
pub const DEFAULT_SUBSAMPLE_CAP: usize = 64;

/// Ensemble parameters for one forest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    pub num_trees: usize,
    pub subsample_cap: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: DEFAULT_NUM_TREES,
            subsample_cap: DEFAULT_SUBSAMPLE_CAP,
        }
    }
}

/// Selected indices plus the full score vector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyResult {
    /// Indices ranked by descending score, at most K of them
    pub top: Vec<usize>,
    /// Score of every point, aligned with the input series
    pub scores: Vec<f64>,
}

impl AnomalyResult {
    /// `(index, score)` pairs in rank order
    pub fn ranked(&self) -> Vec<(usize, f64)> {
        self.top.iter().map(|&i| (i, self.scores[i])).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Select the `k` most anomalous points using a thread-local random source
pub fn select_top_k(normalized: &[f64], k: usize, params: ForestParams) -> AnomalyResult {
    select_top_k_with_rng(normalized, k, params, &mut rand::thread_rng())
}

/// Select the `k` most anomalous points with an injected random source
pub fn select_top_k_with_rng<R: Rng>(
    normalized: &[f64],
    k: usize,
    params: ForestParams,
    rng: &mut R,
) -> AnomalyResult {
    if normalized.is_empty() {
        return AnomalyResult::default();
    }

    let psi = params.subsample_cap.min(normalized.len());
    let forest = IsolationForest::build(normalized, params.num_trees, psi, rng);
    let scores: Vec<f64> = normalized.iter().map(|&v| forest.score(v)).collect();

    // stable sort: equal scores keep index order
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(k.min(scores.len()));

    AnomalyResult { top: order, scores }
}
