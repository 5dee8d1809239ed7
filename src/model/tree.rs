//! CART regression tree for forests grown without bootstrapping
//!
//! Squared-error criterion, grown until a node is pure or holds a single
//! distinct sample. At each split `max_features` non-constant candidate
//! features are examined in random order; constant features do not count
//! toward that budget.

use super::FeatureMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Tree node; children are indices into the node arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Terminal node predicting the mean label of its samples
    Leaf {
        /// Predicted value
        value: f64,
    },
    /// Internal node: `x[feature] <= threshold` goes left
    Split {
        /// Feature index
        feature: usize,
        /// Split threshold
        threshold: f64,
        /// Left child index
        left: usize,
        /// Right child index
        right: usize,
    },
}

/// Fitted regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl DecisionTreeRegressor {
    /// Grow a tree over `samples` (row indices, duplicates allowed).
    ///
    /// Callers guarantee `samples` is non-empty and `y.len() == x.n_rows()`.
    #[must_use]
    pub fn fit(
        x: &FeatureMatrix,
        y: &[f64],
        samples: Vec<usize>,
        max_features: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut pending = vec![(0usize, samples)];

        while let Some((slot, samples)) = pending.pop() {
            let value = mean(y, &samples);
            let split = if is_pure(y, &samples) {
                None
            } else {
                best_split(x, y, &samples, max_features, rng)
            };

            let Some(split) = split else {
                nodes[slot] = Node::Leaf { value };
                continue;
            };

            let (left, right): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .partition(|&&row| x.get(row, split.feature) <= split.threshold);
            if left.is_empty() || right.is_empty() {
                nodes[slot] = Node::Leaf { value };
                continue;
            }

            let left_slot = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            let right_slot = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: left_slot,
                right: right_slot,
            };
            pending.push((right_slot, right));
            pending.push((left_slot, left));
        }

        Self { nodes }
    }

    /// Predict one row
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Longest root-to-leaf path (a single leaf has depth 0)
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[index] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(y: &[f64], samples: &[usize]) -> f64 {
    samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len() as f64
}

fn is_pure(y: &[f64], samples: &[usize]) -> bool {
    let first = y[samples[0]];
    samples.iter().all(|&i| y[i] == first)
}

/// Numeric order with every `NaN` after every number, whatever its sign bit
fn nan_last(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Best threshold over a random subset of features.
///
/// Maximizes `S_l^2 / n_l + S_r^2 / n_r`, which is equivalent to minimizing
/// the summed squared error of the two children.
#[allow(clippy::cast_precision_loss)]
fn best_split(
    x: &FeatureMatrix,
    y: &[f64],
    samples: &[usize],
    max_features: usize,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let mut features: Vec<usize> = (0..x.n_cols()).collect();
    features.shuffle(rng);

    let total: f64 = samples.iter().map(|&i| y[i]).sum();
    let n = samples.len();
    let mut visited = 0;
    let mut best: Option<SplitCandidate> = None;
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

    for feature in features {
        if visited >= max_features {
            break;
        }

        pairs.clear();
        pairs.extend(samples.iter().map(|&i| (x.get(i, feature), y[i])));
        pairs.sort_by(|a, b| nan_last(a.0, b.0));

        if nan_last(pairs[0].0, pairs[n - 1].0) == Ordering::Equal {
            continue;
        }
        visited += 1;

        let mut left_sum = 0.0;
        for i in 0..n - 1 {
            let (value, label) = pairs[i];
            let next = pairs[i + 1].0;
            left_sum += label;

            if value.is_nan() {
                break;
            }
            if nan_last(value, next) == Ordering::Equal {
                continue;
            }

            let n_left = (i + 1) as f64;
            let n_right = (n - i - 1) as f64;
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / n_left + right_sum * right_sum / n_right;

            if best.map_or(true, |b| score > b.score) {
                let mut threshold = value / 2.0 + next / 2.0;
                if !threshold.is_finite() || threshold >= next {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    score,
                });
            }
        }
    }

    best
}
