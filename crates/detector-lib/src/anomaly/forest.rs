//! Univariate Isolation Forest
//!
//! Points that separate from the rest of the data after few random splits
//! are more anomalous. Each tree is fitted on a bootstrap subsample drawn
//! with replacement, and a point's score is derived from the average depth
//! it reaches across the ensemble.
//!
//! Leaves store the depth at which they were produced; no extra path term is
//! added for leaves that still hold several points.

use rand::Rng;

/// Expected path length of an unsuccessful BST search over `n` points
///
/// `2·H(n−1) − 2(n−1)/n` with the exact harmonic sum, zero for `n <= 1`.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let harmonic: f64 = (1..n).map(|i| 1.0 / i as f64).sum();
    2.0 * harmonic - 2.0 * (n - 1) as f64 / n as f64
}

#[derive(Debug, Clone)]
enum Node {
    Internal {
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        depth: usize,
    },
}

/// Single isolation tree over one subsample
#[derive(Debug, Clone)]
pub struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    /// Fit a tree on `data`, stopping at `max_depth`
    pub fn fit<R: Rng>(data: &[f64], max_depth: usize, rng: &mut R) -> Self {
        Self {
            root: fit_node(data, 0, max_depth, rng),
        }
    }

    /// Depth of the leaf that `x` lands in
    pub fn path_length(&self, x: f64) -> usize {
        let mut node = &self.root;
        loop {
            match node {
                Node::Internal { split, left, right } => {
                    node = if x < *split { left } else { right };
                }
                Node::Leaf { depth } => return *depth,
            }
        }
    }

    /// Deepest leaf in the tree
    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Internal { left, right, .. } => walk(left).max(walk(right)),
                Node::Leaf { depth } => *depth,
            }
        }
        walk(&self.root)
    }
}

fn fit_node<R: Rng>(data: &[f64], depth: usize, max_depth: usize, rng: &mut R) -> Node {
    if depth >= max_depth || data.len() <= 1 {
        return Node::Leaf { depth };
    }

    let (min, max) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min >= max {
        return Node::Leaf { depth };
    }

    let split = match draw_split(min, max, rng) {
        Some(split) => split,
        None => return Node::Leaf { depth },
    };

    let (left, right): (Vec<f64>, Vec<f64>) = data.iter().partition(|&&v| v < split);

    Node::Internal {
        split,
        left: Box::new(fit_node(&left, depth + 1, max_depth, rng)),
        right: Box::new(fit_node(&right, depth + 1, max_depth, rng)),
    }
}

/// Uniform draw from the open interval `(min, max)`
///
/// Falls back to the midpoint if the draw lands on `min`, and gives up when
/// no float lies strictly between the bounds.
fn draw_split<R: Rng>(min: f64, max: f64, rng: &mut R) -> Option<f64> {
    let split = min + rng.gen::<f64>() * (max - min);
    if split > min && split < max {
        return Some(split);
    }
    let mid = min + (max - min) / 2.0;
    (mid > min && mid < max).then_some(mid)
}

/// Ensemble of isolation trees plus the path-length normalization constant
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    c: f64,
    subsample_size: usize,
}

impl IsolationForest {
    /// Build `num_trees` trees, each from `subsample_size` draws with replacement
    ///
    /// The subsample size is clamped to `data.len()`; zero means "use all".
    pub fn build<R: Rng>(
        data: &[f64],
        num_trees: usize,
        subsample_size: usize,
        rng: &mut R,
    ) -> Self {
        let psi = if subsample_size == 0 {
            data.len()
        } else {
            subsample_size.min(data.len())
        };

        if data.is_empty() {
            return Self {
                trees: Vec::new(),
                c: 0.0,
                subsample_size: 0,
            };
        }

        let max_depth = if psi <= 1 {
            0
        } else {
            (psi as f64).log2().ceil() as usize
        };

        let mut subsample = vec![0.0; psi];
        let trees = (0..num_trees)
            .map(|_| {
                for slot in subsample.iter_mut() {
                    *slot = data[rng.gen_range(0..data.len())];
                }
                IsolationTree::fit(&subsample, max_depth, rng)
            })
            .collect();

        Self {
            trees,
            c: average_path_length(psi),
            subsample_size: psi,
        }
    }

    /// Mean leaf depth reached by `x` across all trees
    pub fn path_length(&self, x: f64) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: usize = self.trees.iter().map(|t| t.path_length(x)).sum();
        total as f64 / self.trees.len() as f64
    }

    /// Anomaly score in `[0, 1]`, higher means more anomalous
    ///
    /// Zero when the normalization constant is zero (subsample of one point).
    pub fn score(&self, x: f64) -> f64 {
        if self.c == 0.0 {
            return 0.0;
        }
        2f64.powf(-self.path_length(x) / self.c)
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    /// Normalization constant `C(ψ)`
    pub fn normalization(&self) -> f64 {
        self.c
    }

    /// Effective subsample size after clamping
    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }
}
