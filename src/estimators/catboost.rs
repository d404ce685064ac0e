use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::estimators::params::{param_f64, param_u64, param_usize, unknown_param, Params};
use crate::estimators::{check_fit_input, check_predict_input, Regressor};

/// Depth above which the leaf table would not fit comfortably in memory.
const MAX_DEPTH: usize = 16;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObliviousTree {
    /// One `(feature, threshold)` test per level; `value > threshold` goes right.
    splits: Vec<(usize, f64)>,
    leaf_values: Vec<f64>,
}

impl ObliviousTree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let leaf = self
            .splits
            .iter()
            .fold(0usize, |idx, &(feature, threshold)| {
                idx * 2 + usize::from(row[feature] > threshold)
            });
        self.leaf_values[leaf]
    }
}

/// Per-feature split borders and the quantized training matrix.
struct Quantized {
    borders: Vec<Vec<f64>>,
    /// `bins[[row, feature]]` is the number of borders strictly below the value.
    bins: Array2<usize>,
}

impl Quantized {
    fn new(x: &Array2<f64>, border_count: usize) -> Self {
        let borders: Vec<Vec<f64>> = x
            .axis_iter(Axis(1))
            .map(|column| feature_borders(column, border_count))
            .collect();
        let bins = Array2::from_shape_fn(x.dim(), |(i, f)| {
            let v = x[[i, f]];
            borders[f].partition_point(|b| *b < v)
        });
        Self { borders, bins }
    }
}

/// Midpoints between distinct values, thinned to evenly spaced quantiles when
/// there are more than `border_count` of them.
fn feature_borders(column: ArrayView1<'_, f64>, border_count: usize) -> Vec<f64> {
    let mut values: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
    values.sort_by(f64::total_cmp);
    values.dedup();

    let midpoints: Vec<f64> = values.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
    if midpoints.len() <= border_count {
        return midpoints;
    }

    let mut borders: Vec<f64> = (1..=border_count)
        .map(|k| {
            let pos = k * midpoints.len() / (border_count + 1);
            midpoints[pos.min(midpoints.len() - 1)]
        })
        .collect();
    borders.dedup();
    borders
}

/// Boosting over oblivious trees: every level applies one `(feature, border)`
/// test to all its nodes, so a depth `d` tree indexes `2^d` leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostRegressor {
    pub iterations: usize,
    pub learning_rate: f64,
    pub depth: usize,
    pub l2_leaf_reg: f64,
    pub border_count: usize,
    /// Fraction of rows drawn (without replacement) per tree.
    pub subsample: f64,
    pub random_seed: Option<u64>,
    base_score: f64,
    trees: Vec<ObliviousTree>,
    n_features: usize,
    fitted: bool,
}

impl Default for CatBoostRegressor {
    fn default() -> Self {
        Self {
            iterations: 1000,
            learning_rate: 0.03,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 254,
            subsample: 1.0,
            random_seed: None,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: 0,
            fitted: false,
        }
    }
}

impl CatBoostRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_border_count(mut self, border_count: usize) -> Self {
        self.border_count = border_count;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> Result<()> {
        if self.depth == 0 || self.depth > MAX_DEPTH {
            return Err(TrainerError::invalid_param(
                self.name(),
                format!("depth must be in 1..={}, got {}", MAX_DEPTH, self.depth),
            ));
        }
        if self.border_count == 0 {
            return Err(TrainerError::invalid_param(
                self.name(),
                "border_count must be positive",
            ));
        }
        if self.l2_leaf_reg < 0.0 {
            return Err(TrainerError::invalid_param(
                self.name(),
                "l2_leaf_reg must be non-negative",
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(TrainerError::invalid_param(
                self.name(),
                format!("subsample must be in (0, 1], got {}", self.subsample),
            ));
        }
        Ok(())
    }

    fn grow_tree(&self, data: &Quantized, residuals: &Array1<f64>, rows: &[usize]) -> ObliviousTree {
        let lambda = self.l2_leaf_reg;
        let n_features = data.borders.len();
        let mut leaf_of = vec![0usize; rows.len()];
        let mut splits = Vec::with_capacity(self.depth);

        for level in 0..self.depth {
            let n_leaves = 1usize << level;

            let per_feature: Vec<Option<(usize, f64)>> = (0..n_features)
                .into_par_iter()
                .map(|f| {
                    let n_bins = data.borders[f].len() + 1;
                    if n_bins < 2 {
                        return None;
                    }

                    // Histogram over (leaf, bin)
                    let mut sums = vec![0.0; n_leaves * n_bins];
                    let mut counts = vec![0usize; n_leaves * n_bins];
                    for (pos, &row) in rows.iter().enumerate() {
                        let slot = leaf_of[pos] * n_bins + data.bins[[row, f]];
                        sums[slot] += residuals[row];
                        counts[slot] += 1;
                    }

                    let mut best: Option<(usize, f64)> = None;
                    let mut left_sum = vec![0.0; n_leaves];
                    let mut left_count = vec![0usize; n_leaves];
                    let totals: Vec<(f64, usize)> = (0..n_leaves)
                        .map(|leaf| {
                            let range = leaf * n_bins..(leaf + 1) * n_bins;
                            (
                                sums[range.clone()].iter().sum::<f64>(),
                                counts[range].iter().sum::<usize>(),
                            )
                        })
                        .collect();

                    // Border k sends bins 0..=k left.
                    for k in 0..n_bins - 1 {
                        let mut gain = 0.0;
                        for leaf in 0..n_leaves {
                            let slot = leaf * n_bins + k;
                            left_sum[leaf] += sums[slot];
                            left_count[leaf] += counts[slot];

                            let (total, count) = totals[leaf];
                            let right_sum = total - left_sum[leaf];
                            let right_count = count - left_count[leaf];
                            gain += left_sum[leaf].powi(2) / (left_count[leaf] as f64 + lambda)
                                + right_sum.powi(2) / (right_count as f64 + lambda)
                                - total.powi(2) / (count as f64 + lambda);
                        }
                        if gain > MIN_GAIN && best.is_none_or(|(_, g)| gain > g) {
                            best = Some((k, gain));
                        }
                    }
                    best
                })
                .collect();

            let mut chosen: Option<(usize, usize, f64)> = None;
            for (f, candidate) in per_feature.into_iter().enumerate() {
                if let Some((k, gain)) = candidate {
                    if chosen.is_none_or(|(_, _, g)| gain > g) {
                        chosen = Some((f, k, gain));
                    }
                }
            }
            let Some((feature, border, _)) = chosen else {
                break;
            };

            for (pos, &row) in rows.iter().enumerate() {
                leaf_of[pos] = leaf_of[pos] * 2 + usize::from(data.bins[[row, feature]] > border);
            }
            splits.push((feature, data.borders[feature][border]));
        }

        let n_leaves = 1usize << splits.len();
        let mut sums = vec![0.0; n_leaves];
        let mut counts = vec![0usize; n_leaves];
        for (pos, &row) in rows.iter().enumerate() {
            sums[leaf_of[pos]] += residuals[row];
            counts[leaf_of[pos]] += 1;
        }
        let leaf_values = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| {
                let denom = c as f64 + lambda;
                if denom > 0.0 { s / denom } else { 0.0 }
            })
            .collect();

        ObliviousTree {
            splits,
            leaf_values,
        }
    }
}

impl Regressor for CatBoostRegressor {
    fn name(&self) -> &'static str {
        "CatBoostRegressor"
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("iterations".into(), self.iterations.into());
        params.insert("learning_rate".into(), self.learning_rate.into());
        params.insert("depth".into(), self.depth.into());
        params.insert("l2_leaf_reg".into(), self.l2_leaf_reg.into());
        params.insert("border_count".into(), self.border_count.into());
        params.insert("subsample".into(), self.subsample.into());
        params.insert(
            "random_seed".into(),
            self.random_seed.map(|s| s as i64).into(),
        );
        params
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        let name = self.name();
        for (key, value) in params {
            match key.as_str() {
                "iterations" | "n_estimators" => self.iterations = param_usize(name, key, value)?,
                "learning_rate" => self.learning_rate = param_f64(name, key, value)?,
                "depth" | "max_depth" => self.depth = param_usize(name, key, value)?,
                "l2_leaf_reg" | "reg_lambda" => self.l2_leaf_reg = param_f64(name, key, value)?,
                "border_count" => self.border_count = param_usize(name, key, value)?,
                "subsample" => self.subsample = param_f64(name, key, value)?,
                "random_seed" | "random_state" => self.random_seed = param_u64(name, key, value)?,
                _ => return Err(unknown_param(name, key)),
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.validate()?;

        let n = x.nrows();
        // Quantize once, shared by every tree
        let data = Quantized::new(x, self.border_count);
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_seed.unwrap_or(0));
        let n_sub = ((n as f64 * self.subsample).round() as usize).clamp(1, n);

        self.base_score = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n, self.base_score);

        let mut trees = Vec::with_capacity(self.iterations);
        for _ in 0..self.iterations {
            let residuals = y - &predictions;
            let rows: Vec<usize> = if n_sub < n {
                let mut rows = index::sample(&mut rng, n, n_sub).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };

            let tree = self.grow_tree(&data, &residuals, &rows);
            for (i, row) in x.outer_iter().enumerate() {
                predictions[i] += self.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.trees = trees;
        self.n_features = x.ncols();
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(TrainerError::NotFitted);
        }
        check_predict_input(self.n_features, x)?;

        Ok(x
            .outer_iter()
            .map(|row| {
                let boost: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                self.base_score + self.learning_rate * boost
            })
            .collect())
    }
}
