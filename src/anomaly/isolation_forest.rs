//! Isolation Forest anomaly detection

use crate::anomaly::AnomalyDetector;
use crate::config::MaxSamples;
use crate::error::{ForestError, Result};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Euler-Mascheroni constant
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation Tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IsolationTree {
    /// Internal node with split
    Internal {
        /// Feature index for split
        feature: usize,
        /// Split threshold
        threshold: f64,
        /// Left subtree (values < threshold)
        left: Box<IsolationTree>,
        /// Right subtree (values >= threshold)
        right: Box<IsolationTree>,
    },
    /// External (leaf) node
    External {
        /// Depth of the leaf, root = 0
        depth: usize,
        /// Number of training samples that reached this leaf
        size: usize,
    },
}

/// Shape statistics of a tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeStats {
    pub n_nodes: usize,
    pub n_leaves: usize,
    pub depth: usize,
}

impl IsolationTree {
    /// Build an isolation tree over the rows in `indices`.
    ///
    /// Splits pick a feature uniformly among those whose values are not all
    /// equal, then a threshold uniformly in [min, max). Building stops at
    /// `max_depth`, at one sample, or when every row is identical.
    pub fn build(
        x: &Array2<f64>,
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let n_samples = indices.len();
        if depth >= max_depth || n_samples <= 1 {
            return IsolationTree::External { depth, size: n_samples };
        }

        let ranges: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|feature| {
                let (min, max) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| {
                        let v = x[[i, feature]];
                        (lo.min(v), hi.max(v))
                    },
                );
                (max > min).then_some((feature, min, max))
            })
            .collect();

        // All rows identical
        if ranges.is_empty() {
            return IsolationTree::External { depth, size: n_samples };
        }

        let (feature, min_val, max_val) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(min_val..max_val);

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] < threshold);

        // threshold == min leaves the left side empty
        if left_indices.is_empty() || right_indices.is_empty() {
            return IsolationTree::External { depth, size: n_samples };
        }

        let left = Box::new(Self::build(x, &left_indices, depth + 1, max_depth, rng));
        let right = Box::new(Self::build(x, &right_indices, depth + 1, max_depth, rng));

        IsolationTree::Internal {
            feature,
            threshold,
            left,
            right,
        }
    }

    /// Path length for a sample: leaf depth plus c(leaf size)
    pub fn path_length(&self, sample: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                IsolationTree::External { depth, size } => {
                    return *depth as f64 + average_path_length(*size);
                }
                IsolationTree::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    pub fn stats(&self) -> TreeStats {
        match self {
            IsolationTree::External { depth, .. } => TreeStats {
                n_nodes: 1,
                n_leaves: 1,
                depth: *depth,
            },
            IsolationTree::Internal { left, right, .. } => {
                let l = left.stats();
                let r = right.stats();
                TreeStats {
                    n_nodes: 1 + l.n_nodes + r.n_nodes,
                    n_leaves: l.n_leaves + r.n_leaves,
                    depth: l.depth.max(r.depth),
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points:
/// c(n) = 2(ln(n-1) + γ) - 2(n-1)/n for n > 1, else 0
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n_f = n as f64;
    2.0 * ((n_f - 1.0).ln() + EULER_GAMMA) - 2.0 * (n_f - 1.0) / n_f
}

/// Isolation Forest anomaly detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    /// Number of trees
    n_estimators: usize,
    /// Subsample size policy
    max_samples: MaxSamples,
    /// Sample with replacement
    bootstrap: bool,
    /// Depth limit, default ceil(log2(subsample size))
    max_depth: Option<usize>,
    /// Contamination ratio (expected proportion of outliers)
    contamination: f64,
    /// Base seed, tree t uses seed + t
    seed: u64,
    /// Worker threads, `None` = rayon global pool
    n_jobs: Option<usize>,
    /// Fitted trees
    trees: Option<Vec<IsolationTree>>,
    /// Resolved subsample size
    subsample_size: Option<usize>,
    /// Number of features seen during fit
    n_features: Option<usize>,
    /// Calibrated decision offset
    offset: Option<f64>,
}

impl IsolationForest {
    /// Create new Isolation Forest
    pub fn new() -> Self {
        Self {
            n_estimators: 100,
            max_samples: MaxSamples::Auto,
            bootstrap: false,
            max_depth: None,
            contamination: 0.1,
            seed: 42,
            n_jobs: None,
            trees: None,
            subsample_size: None,
            n_features: None,
            offset: None,
        }
    }

    /// Set number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    /// Set subsample size policy
    pub fn with_max_samples(mut self, max_samples: MaxSamples) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set contamination ratio
    pub fn with_contamination(mut self, c: f64) -> Self {
        self.contamination = c;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Fix the decision offset found by calibration
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }

    pub fn max_samples(&self) -> MaxSamples {
        self.max_samples
    }

    /// Fitted trees, if any
    pub fn trees(&self) -> Option<&[IsolationTree]> {
        self.trees.as_deref()
    }

    /// Subsample size S resolved during fit
    pub fn subsample_size(&self) -> Option<usize> {
        self.subsample_size
    }

    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    /// Depth limit used during fit
    pub fn effective_max_depth(&self, subsample_size: usize) -> usize {
        self.max_depth
            .unwrap_or_else(|| (subsample_size as f64).log2().ceil() as usize)
    }

    /// Normalizer c(S); 1 when S <= 1 so scores stay finite
    pub fn normalizer(&self) -> Result<f64> {
        let s = self.subsample_size.ok_or(ForestError::ModelNotFitted)?;
        let c = average_path_length(s);
        Ok(if c > 0.0 { c } else { 1.0 })
    }

    fn with_pool<R: Send>(&self, op: impl FnOnce() -> R + Send) -> Result<R> {
        match self.n_jobs {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n.max(1))
                    .build()
                    .map_err(|e| ForestError::InvalidParameter {
                        name: "n_jobs".to_string(),
                        value: n.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(pool.install(op))
            }
            None => Ok(op()),
        }
    }

    fn draw_subsample(&self, n_samples: usize, size: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        if self.bootstrap {
            (0..size).map(|_| rng.gen_range(0..n_samples)).collect()
        } else {
            rand::seq::index::sample(rng, n_samples, size).into_vec()
        }
    }

    /// Mean path length over all trees, one value per row
    pub fn mean_path_lengths(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let trees = self.trees.as_ref().ok_or(ForestError::ModelNotFitted)?;
        let n_features = self.n_features.ok_or(ForestError::ModelNotFitted)?;
        if x.ncols() != n_features {
            return Err(ForestError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let n_trees = trees.len() as f64;
        let lengths: Vec<f64> = self.with_pool(|| {
            (0..x.nrows())
                .into_par_iter()
                .map(|i| {
                    let sample = x.row(i).to_vec();
                    trees.iter().map(|tree| tree.path_length(&sample)).sum::<f64>() / n_trees
                })
                .collect()
        })?;

        Ok(Array1::from_vec(lengths))
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyDetector for IsolationForest {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(ForestError::EmptyInput);
        }

        let subsample_size = self.max_samples.resolve(n_samples);
        let max_depth = self.effective_max_depth(subsample_size);
        let base_seed = self.seed;

        debug!(
            n_estimators = self.n_estimators,
            subsample_size,
            max_depth,
            bootstrap = self.bootstrap,
            "Building isolation trees"
        );

        let trees: Vec<IsolationTree> = self.with_pool(|| {
            (0..self.n_estimators)
                .into_par_iter()
                .map(|tree_idx| {
                    let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                    let indices = self.draw_subsample(n_samples, subsample_size, &mut rng);
                    IsolationTree::build(x, &indices, 0, max_depth, &mut rng)
                })
                .collect()
        })?;

        self.trees = Some(trees);
        self.subsample_size = Some(subsample_size);
        self.n_features = Some(x.ncols());
        self.offset = None;
        Ok(())
    }

    /// s(x) = 2^(-E[h(x)] / c(S))
    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let c = self.normalizer()?;
        Ok(self.mean_path_lengths(x)?.mapv(|h| 2.0_f64.powf(-h / c)))
    }

    /// 0.5 - s(x)
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.score_samples(x)?.mapv(|s| 0.5 - s))
    }

    fn offset(&self) -> Option<f64> {
        self.offset
    }
}
