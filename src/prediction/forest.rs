//! Isolation forest outlier model
//!
//! Random partitioning trees isolate anomalous rows in fewer splits than
//! normal rows. Scores follow the usual convention: `score_samples`
//! returns the negated anomaly score in [-1, 0], lower is more abnormal, and
//! rows scoring below the contamination percentile of the training set are
//! flagged as outliers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{EngineError, Result};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Forest hyper-parameters
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Rows drawn (without replacement) per tree
    pub max_samples: usize,
    /// Expected share of outliers in the training set
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Trained forest
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    n_features: usize,
    offset: f64,
}

impl IsolationForest {
    /// Train on `rows`; every row must have the same width
    pub fn fit(rows: &[Vec<f64>], config: &ForestConfig) -> Result<Self> {
        let n_features = match rows.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => return Err(EngineError::Generic("cannot train on an empty feature set".to_string())),
        };
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(EngineError::DimensionMismatch {
                expected: n_features,
                actual: bad.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let sample_size = config.max_samples.clamp(1, rows.len());
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..config.n_trees.max(1))
            .map(|_| {
                let sample: Vec<&[f64]> = rand::seq::index::sample(&mut rng, rows.len(), sample_size)
                    .into_iter()
                    .map(|i| rows[i].as_slice())
                    .collect();
                build_tree(&sample, 0, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            n_features,
            offset: 0.0,
        };

        let mut training_scores = forest.score_samples(rows)?;
        forest.offset = percentile(&mut training_scores, config.contamination * 100.0);
        Ok(forest)
    }

    /// Width of the rows the forest was trained on
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Decision threshold; rows scoring below it are outliers
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Negated anomaly score of each row, in [-1, 0]
    pub fn score_samples(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let normalizer = match average_path_length(self.sample_size) {
            c if c > 0.0 => c,
            _ => 1.0,
        };

        rows.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(EngineError::DimensionMismatch {
                        expected: self.n_features,
                        actual: row.len(),
                    });
                }
                let mean_depth = self
                    .trees
                    .iter()
                    .map(|tree| path_length(tree, row, 0))
                    .sum::<f64>()
                    / self.trees.len() as f64;

                Ok(-(2f64.powf(-mean_depth / normalizer)))
            })
            .collect()
    }

    /// Outlier flag per row
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<bool>> {
        Ok(self
            .score_samples(rows)?
            .into_iter()
            .map(|score| score < self.offset)
            .collect())
    }
}

fn build_tree(rows: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // only features that still vary over a finite range can split this node
    let width = rows[0].len();
    let candidates: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
                (lo.min(row[feature]), hi.max(row[feature]))
            });
            (max > min && (max - min).is_finite()).then_some((feature, min, max))
        })
        .collect();

    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) = rows.iter().copied().partition(|row| row[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile (0-100); sorts `values` in place
fn percentile(values: &mut [f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    values[lower] + (values[upper] - values[lower]) * weight
}
