use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::estimators::params::{param_f64, param_u64, param_usize, unknown_param, Params};
use crate::estimators::{check_fit_input, check_predict_input, Regressor};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum BoosterNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<BoosterNode>,
        right: Box<BoosterNode>,
    },
}

impl BoosterNode {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                BoosterNode::Leaf { weight } => return *weight,
                BoosterNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }
}

/// Second-order boosting with exact greedy splits on `G² / (H + lambda)`.
/// `gamma` is the minimum split gain and `reg_alpha` soft-thresholds `G`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Minimum hessian sum per child.
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    /// Minimum loss reduction to keep a split.
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
    base_score: f64,
    trees: Vec<BoosterNode>,
    n_features: usize,
    fitted: bool,
}

impl Default for XGBRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: None,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: 0,
            fitted: false,
        }
    }
}

impl XGBRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_reg_lambda(mut self, reg_lambda: f64) -> Self {
        self.reg_lambda = reg_lambda;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> Result<()> {
        let fraction_ok = |v: f64| v > 0.0 && v <= 1.0;
        if !fraction_ok(self.subsample) {
            return Err(TrainerError::invalid_param(
                self.name(),
                format!("subsample must be in (0, 1], got {}", self.subsample),
            ));
        }
        if !fraction_ok(self.colsample_bytree) {
            return Err(TrainerError::invalid_param(
                self.name(),
                format!("colsample_bytree must be in (0, 1], got {}", self.colsample_bytree),
            ));
        }
        if self.reg_lambda < 0.0 || self.reg_alpha < 0.0 || self.gamma < 0.0 {
            return Err(TrainerError::invalid_param(
                self.name(),
                "reg_lambda, reg_alpha and gamma must be non-negative",
            ));
        }
        Ok(())
    }
}

impl Regressor for XGBRegressor {
    fn name(&self) -> &'static str {
        "XGBRegressor"
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("n_estimators".into(), self.n_estimators.into());
        params.insert("learning_rate".into(), self.learning_rate.into());
        params.insert("max_depth".into(), self.max_depth.into());
        params.insert("min_child_weight".into(), self.min_child_weight.into());
        params.insert("reg_lambda".into(), self.reg_lambda.into());
        params.insert("reg_alpha".into(), self.reg_alpha.into());
        params.insert("gamma".into(), self.gamma.into());
        params.insert("subsample".into(), self.subsample.into());
        params.insert("colsample_bytree".into(), self.colsample_bytree.into());
        params.insert(
            "random_state".into(),
            self.random_state.map(|s| s as i64).into(),
        );
        params
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        let name = self.name();
        for (key, value) in params {
            match key.as_str() {
                "n_estimators" => self.n_estimators = param_usize(name, key, value)?,
                "learning_rate" | "eta" => self.learning_rate = param_f64(name, key, value)?,
                "max_depth" => self.max_depth = param_usize(name, key, value)?,
                "min_child_weight" => self.min_child_weight = param_f64(name, key, value)?,
                "reg_lambda" | "lambda" => self.reg_lambda = param_f64(name, key, value)?,
                "reg_alpha" | "alpha" => self.reg_alpha = param_f64(name, key, value)?,
                "gamma" => self.gamma = param_f64(name, key, value)?,
                "subsample" => self.subsample = param_f64(name, key, value)?,
                "colsample_bytree" => self.colsample_bytree = param_f64(name, key, value)?,
                "random_state" | "seed" => self.random_state = param_u64(name, key, value)?,
                _ => return Err(unknown_param(name, key)),
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.validate()?;

        let n = x.nrows();
        let n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));

        self.base_score = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n, self.base_score);
        let n_rows = ((n as f64 * self.subsample).round() as usize).clamp(1, n);
        let n_cols = ((n_features as f64 * self.colsample_bytree).round() as usize).clamp(1, n_features.max(1));

        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let gradients = &predictions - y;

            // Row and column subsamples for this round
            let rows = if n_rows < n {
                let mut rows = index::sample(&mut rng, n, n_rows).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };
            let features = if n_cols < n_features {
                let mut features = index::sample(&mut rng, n_features, n_cols).into_vec();
                features.sort_unstable();
                features
            } else {
                (0..n_features).collect()
            };

            let grower = BoosterGrower {
                x,
                gradients: &gradients,
                features: &features,
                config: self,
            };
            let tree = grower.grow(rows, 0);

            // Shrink and accumulate
            let update: Array1<f64> = x.outer_iter().map(|row| tree.predict_row(row)).collect();
            predictions.scaled_add(self.learning_rate, &update);
            trees.push(tree);
        }

        self.trees = trees;
        self.n_features = n_features;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(TrainerError::NotFitted);
        }
        check_predict_input(self.n_features, x)?;

        Ok(x
            .axis_iter(Axis(0))
            .map(|row| {
                let boost: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                self.base_score + self.learning_rate * boost
            })
            .collect())
    }
}

/// L1 soft threshold applied to a gradient sum.
fn threshold_l1(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

struct BoosterGrower<'a> {
    x: &'a Array2<f64>,
    gradients: &'a Array1<f64>,
    features: &'a [usize],
    config: &'a XGBRegressor,
}

impl BoosterGrower<'_> {
    fn structure_score(&self, g: f64, h: f64) -> f64 {
        let g = threshold_l1(g, self.config.reg_alpha);
        g * g / (h + self.config.reg_lambda)
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.config.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -threshold_l1(g, self.config.reg_alpha) / denom
    }

    fn grow(&self, rows: Vec<usize>, depth: usize) -> BoosterNode {
        let g_total: f64 = rows.iter().map(|&i| self.gradients[i]).sum();
        // Unit hessian: H is the row count.
        let h_total = rows.len() as f64;
        let leaf = BoosterNode::Leaf {
            weight: self.leaf_weight(g_total, h_total),
        };

        if depth >= self.config.max_depth || rows.len() < 2 {
            return leaf;
        }

        let Some((feature, threshold)) = self.best_split(&rows, g_total, h_total) else {
            return leaf;
        };

        let x = self.x;
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&i| x[[i, feature]] <= threshold);
        if left.is_empty() || right.is_empty() {
            return leaf;
        }

        BoosterNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<(usize, f64)> {
        let x = self.x;
        let min_child = self.config.min_child_weight;
        let parent = self.structure_score(g_total, h_total);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = rows.to_vec();

        for &feature in self.features {
            sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let mut g_left = 0.0;
            for pos in 0..sorted.len() - 1 {
                g_left += self.gradients[sorted[pos]];
                let h_left = (pos + 1) as f64;
                let h_right = h_total - h_left;
                if h_left < min_child {
                    continue;
                }
                if h_right < min_child {
                    break;
                }

                let current = x[[sorted[pos], feature]];
                let next = x[[sorted[pos + 1], feature]];
                if next <= current {
                    continue;
                }

                let g_right = g_total - g_left;
                let gain = 0.5
                    * (self.structure_score(g_left, h_left) + self.structure_score(g_right, h_right)
                        - parent)
                    - self.config.gamma;
                if gain > 0.0 && best.is_none_or(|(_, _, b)| gain > b) {
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some((feature, threshold, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}
