//! CART (Classification and Regression Tree) builder
//!
//! Implements deterministic exact-greedy regression tree construction on
//! weighted samples. Splits minimise the weighted squared error; candidate
//! thresholds are midpoints between consecutive distinct feature values and
//! samples with `x <= threshold` go left.

use illum_core::{FittedTree, Node};

use crate::deterministic::LcgRng;
use crate::errors::TrainerError;

/// One training sample as seen by a fitter
#[derive(Clone, Copy, Debug)]
pub struct Sample<'a> {
    pub features: &'a [f32],
    pub target: f32,
    pub weight: u32,
}

/// Fits one regression tree from weighted samples.
///
/// Implementations must be deterministic for identical samples, depth and
/// seed, and must never return a tree deeper than `max_depth`.
pub trait TreeFitter: Sync {
    fn fit(
        &self,
        samples: &[Sample<'_>],
        max_depth: usize,
        seed: u64,
    ) -> Result<FittedTree, TrainerError>;
}

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    /// Minimum total weight on each side of a split
    pub min_samples_leaf: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { min_samples_leaf: 1 }
    }
}

/// Node impurities below this are treated as pure
const MIN_IMPURITY: f64 = 1e-12;

/// Split candidate with its score
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f32,
    score: f64,
}

/// Weighted target sums over a set of samples
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    weight: f64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn add(&mut self, sample: &Sample<'_>) {
        let w = f64::from(sample.weight);
        let y = f64::from(sample.target);
        self.weight += w;
        self.sum += w * y;
        self.sum_sq += w * y * y;
    }

    fn mean(&self) -> f64 {
        if self.weight > 0.0 {
            self.sum / self.weight
        } else {
            0.0
        }
    }

    /// Weighted variance
    fn impurity(&self) -> f64 {
        if self.weight > 0.0 {
            let mean = self.mean();
            (self.sum_sq / self.weight - mean * mean).max(0.0)
        } else {
            0.0
        }
    }

    /// Proxy for the squared-error reduction: `sum^2 / weight`
    fn proxy(&self) -> f64 {
        if self.weight > 0.0 {
            self.sum * self.sum / self.weight
        } else {
            0.0
        }
    }
}

/// Deterministic weighted CART regressor
#[derive(Clone, Debug, Default)]
pub struct CartFitter {
    config: TreeConfig,
}

impl CartFitter {
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }
}

impl TreeFitter for CartFitter {
    fn fit(
        &self,
        samples: &[Sample<'_>],
        max_depth: usize,
        seed: u64,
    ) -> Result<FittedTree, TrainerError> {
        let Some(first) = samples.first() else {
            return Err(TrainerError::Fit("no samples to fit".to_string()));
        };
        let feature_count = first.features.len();
        if let Some(i) = samples.iter().position(|s| s.features.len() != feature_count) {
            return Err(TrainerError::Fit(format!(
                "sample {i} has {} features, expected {feature_count}",
                samples[i].features.len()
            )));
        }
        if samples.iter().all(|s| s.weight == 0) {
            return Err(TrainerError::Fit("all sample weights are zero".to_string()));
        }

        let builder = CartBuilder {
            config: &self.config,
            samples,
            feature_count,
            max_depth,
        };
        let mut rng = LcgRng::new(seed);
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..samples.len()).filter(|&i| samples[i].weight > 0).collect();
        builder.build_node(&indices, 0, &mut nodes, &mut rng);

        Ok(FittedTree::new(nodes))
    }
}

struct CartBuilder<'a> {
    config: &'a TreeConfig,
    samples: &'a [Sample<'a>],
    feature_count: usize,
    max_depth: usize,
}

impl CartBuilder<'_> {
    /// Recursively build tree nodes in pre-order; returns the node's index
    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut LcgRng,
    ) -> usize {
        let current_idx = nodes.len();
        let moments = self.moments(indices);
        let leaf_value = moments.mean() as f32;

        // Check stopping conditions
        if depth >= self.max_depth
            || moments.weight < 2.0 * f64::from(self.config.min_samples_leaf)
            || moments.impurity() <= MIN_IMPURITY
        {
            nodes.push(Node::leaf(leaf_value));
            return current_idx;
        }

        let Some(split) = self.find_best_split(indices, &moments, rng) else {
            nodes.push(Node::leaf(leaf_value));
            return current_idx;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.samples[i].features[split.feature_idx] <= split.threshold);

        // Reserve space for current node
        nodes.push(Node::internal(split.feature_idx, split.threshold, 0, 0));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, rng);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, rng);

        nodes[current_idx].left = Some(left_idx);
        nodes[current_idx].right = Some(right_idx);

        current_idx
    }

    /// Find best split using the exact-greedy algorithm.
    ///
    /// Features are visited in a seed-dependent order; on equal scores the
    /// first candidate found wins.
    fn find_best_split(
        &self,
        indices: &[usize],
        parent: &Moments,
        rng: &mut LcgRng,
    ) -> Option<SplitCandidate> {
        let min_leaf = f64::from(self.config.min_samples_leaf);
        let mut features: Vec<usize> = (0..self.feature_count).collect();
        rng.shuffle(&mut features);

        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature_idx in features {
            sorted.sort_by(|&a, &b| {
                self.samples[a].features[feature_idx].total_cmp(&self.samples[b].features[feature_idx])
            });

            let mut left = Moments::default();
            for pair in sorted.windows(2) {
                left.add(&self.samples[pair[0]]);

                let lo = self.samples[pair[0]].features[feature_idx];
                let hi = self.samples[pair[1]].features[feature_idx];
                if lo == hi {
                    continue;
                }

                let right = Moments {
                    weight: parent.weight - left.weight,
                    sum: parent.sum - left.sum,
                    sum_sq: parent.sum_sq - left.sum_sq,
                };
                if left.weight < min_leaf || right.weight < min_leaf {
                    continue;
                }

                let score = left.proxy() + right.proxy();
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: midpoint(lo, hi),
                        score,
                    });
                }
            }
        }

        best.filter(|b| b.score > parent.proxy())
    }

    fn moments(&self, indices: &[usize]) -> Moments {
        let mut moments = Moments::default();
        for &i in indices {
            moments.add(&self.samples[i]);
        }
        moments
    }
}

/// Threshold between two distinct sorted values that keeps `lo` on the left
/// and `hi` on the right even after f32 rounding.
fn midpoint(lo: f32, hi: f32) -> f32 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi || mid < lo {
        lo
    } else {
        mid
    }
}
