use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrainerError};
use crate::estimators::params::{param_f64, param_str, param_u64, param_usize, unknown_param, Params};
use crate::estimators::tree::DecisionTreeRegressor;
use crate::estimators::{check_fit_input, check_predict_input, Regressor};

/// Depth of the base trees.
const BASE_MAX_DEPTH: usize = 3;

/// Mapping from normalized absolute error to per-row loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaBoostLoss {
    Linear,
    Square,
    Exponential,
}

impl AdaBoostLoss {
    pub fn as_str(self) -> &'static str {
        match self {
            AdaBoostLoss::Linear => "linear",
            AdaBoostLoss::Square => "square",
            AdaBoostLoss::Exponential => "exponential",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "linear" => Some(AdaBoostLoss::Linear),
            "square" => Some(AdaBoostLoss::Square),
            "exponential" => Some(AdaBoostLoss::Exponential),
            _ => None,
        }
    }

    fn apply(self, normalized_error: f64) -> f64 {
        match self {
            AdaBoostLoss::Linear => normalized_error,
            AdaBoostLoss::Square => normalized_error * normalized_error,
            AdaBoostLoss::Exponential => 1.0 - (-normalized_error).exp(),
        }
    }
}

/// AdaBoost.R2 over depth-3 regression trees. Each round fits a weighted
/// bootstrap and reweights rows by their normalized error; predictions are the
/// weighted median of the ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub loss: AdaBoostLoss,
    pub random_state: Option<u64>,
    estimators: Vec<DecisionTreeRegressor>,
    estimator_weights: Vec<f64>,
    n_features: usize,
}

impl Default for AdaBoostRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            loss: AdaBoostLoss::Linear,
            random_state: None,
            estimators: Vec::new(),
            estimator_weights: Vec::new(),
            n_features: 0,
        }
    }
}

impl AdaBoostRegressor {
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

    pub fn with_loss(mut self, loss: AdaBoostLoss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Number of estimators kept after early stopping.
    pub fn n_fitted(&self) -> usize {
        self.estimators.len()
    }

    pub fn estimator_weights(&self) -> &[f64] {
        &self.estimator_weights
    }
}

/// Weighted median: the smallest prediction whose cumulative weight reaches
/// half of the total.
fn weighted_median(values: &mut [(f64, f64)]) -> f64 {
    values.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = values.iter().map(|(_, w)| w).sum();
    let mut cumulative = 0.0;
    for &(value, weight) in values.iter() {
        cumulative += weight;
        if cumulative >= 0.5 * total {
            return value;
        }
    }
    values.last().map_or(0.0, |(v, _)| *v)
}

impl Regressor for AdaBoostRegressor {
    fn name(&self) -> &'static str {
        "AdaBoostRegressor"
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("n_estimators".into(), self.n_estimators.into());
        params.insert("learning_rate".into(), self.learning_rate.into());
        params.insert("loss".into(), self.loss.as_str().into());
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
                "learning_rate" => self.learning_rate = param_f64(name, key, value)?,
                "loss" => {
                    let raw = param_str(name, key, value)?;
                    self.loss = AdaBoostLoss::parse(raw).ok_or_else(|| {
                        TrainerError::invalid_param(name, format!("unknown loss '{}'", raw))
                    })?;
                }
                "random_state" => self.random_state = param_u64(name, key, value)?,
                _ => return Err(unknown_param(name, key)),
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.n_estimators == 0 {
            return Err(TrainerError::invalid_param(
                self.name(),
                "n_estimators must be positive",
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(TrainerError::invalid_param(
                self.name(),
                format!("learning_rate must be positive, got {}", self.learning_rate),
            ));
        }

        let n = x.nrows();
        let seed = self.random_state.unwrap_or(0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut sample_weight = Array1::from_elem(n, 1.0 / n as f64);

        let mut estimators = Vec::new();
        let mut weights = Vec::new();

        for round in 0..self.n_estimators {
            let sampler = WeightedIndex::new(sample_weight.iter()).map_err(|e| {
                TrainerError::Computation(format!("invalid AdaBoost sample weights: {}", e))
            })?;
            let bootstrap: Vec<usize> = (0..n).map(|_| sampler.sample(&mut rng)).collect();

            let mut tree = DecisionTreeRegressor::new()
                .with_max_depth(Some(BASE_MAX_DEPTH))
                .with_random_state(seed.wrapping_add(round as u64));
            tree.fit(&x.select(Axis(0), &bootstrap), &y.select(Axis(0), &bootstrap))?;

            let abs_error = (&tree.predict(x)? - y).mapv(f64::abs);
            let max_error = abs_error
                .iter()
                .zip(sample_weight.iter())
                .filter(|(_, w)| **w > 0.0)
                .fold(0.0_f64, |m, (e, _)| m.max(*e));
            let losses = abs_error.mapv(|e| {
                let normalized = if max_error > 0.0 { e / max_error } else { e };
                self.loss.apply(normalized)
            });
            let estimator_error: f64 = losses
                .iter()
                .zip(sample_weight.iter())
                .map(|(l, w)| l * w)
                .sum();

            if estimator_error <= 0.0 {
                // Perfect fit: keep it at full weight and stop.
                estimators.push(tree);
                weights.push(1.0);
                break;
            }
            if estimator_error >= 0.5 {
                debug!(round, estimator_error, "AdaBoost stopped: error above 0.5");
                if estimators.is_empty() {
                    estimators.push(tree);
                    weights.push(1.0);
                }
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            estimators.push(tree);
            weights.push(self.learning_rate * (1.0 / beta).ln());

            if round + 1 < self.n_estimators {
                for (w, l) in sample_weight.iter_mut().zip(losses.iter()) {
                    *w *= beta.powf((1.0 - l) * self.learning_rate);
                }
                let total = sample_weight.sum();
                if !total.is_finite() || total <= 0.0 {
                    break;
                }
                sample_weight /= total;
            }
        }

        self.estimators = estimators;
        self.estimator_weights = weights;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.estimators.is_empty() {
            return Err(TrainerError::NotFitted);
        }
        check_predict_input(self.n_features, x)?;

        let per_estimator = self
            .estimators
            .iter()
            .map(|e| e.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut scratch = Vec::with_capacity(per_estimator.len());
        Ok((0..x.nrows())
            .map(|i| {
                scratch.clear();
                scratch.extend(
                    per_estimator
                        .iter()
                        .zip(&self.estimator_weights)
                        .map(|(p, &w)| (p[i], w)),
                );
                weighted_median(&mut scratch)
            })
            .collect())
    }
}
