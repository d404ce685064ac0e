use ndarray::{Array1, Array2, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::estimators::params::{
    param_f64, param_opt_usize, param_u64, param_usize, unknown_param, Params,
};
use crate::estimators::tree::{Criterion, DecisionTreeRegressor};
use crate::estimators::{check_fit_input, check_predict_input, Regressor};

/// Gradient boosted regression trees with squared-error loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) per stage.
    pub subsample: f64,
    pub random_state: Option<u64>,
    init: f64,
    trees: Vec<DecisionTreeRegressor>,
    n_features: usize,
    fitted: bool,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: None,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
            fitted: false,
        }
    }
}

impl GradientBoostingRegressor {
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

    pub fn with_subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostingRegressor {
    fn name(&self) -> &'static str {
        "GradientBoostingRegressor"
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("n_estimators".into(), self.n_estimators.into());
        params.insert("learning_rate".into(), self.learning_rate.into());
        params.insert("max_depth".into(), self.max_depth.into());
        params.insert("min_samples_split".into(), self.min_samples_split.into());
        params.insert("min_samples_leaf".into(), self.min_samples_leaf.into());
        params.insert("subsample".into(), self.subsample.into());
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
                "max_depth" => self.max_depth = param_opt_usize(name, key, value)?,
                "min_samples_split" => self.min_samples_split = param_usize(name, key, value)?,
                "min_samples_leaf" => self.min_samples_leaf = param_usize(name, key, value)?,
                "subsample" => self.subsample = param_f64(name, key, value)?,
                "random_state" => self.random_state = param_u64(name, key, value)?,
                _ => return Err(unknown_param(name, key)),
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(TrainerError::invalid_param(
                self.name(),
                format!("subsample must be in (0, 1], got {}", self.subsample),
            ));
        }

        let n = x.nrows();
        let seed = self.random_state.unwrap_or(0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        self.init = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n, self.init);
        let n_sub = ((n as f64 * self.subsample).round() as usize).clamp(1, n);

        let mut trees = Vec::with_capacity(self.n_estimators);
        for stage in 0..self.n_estimators {
            let residuals = y - &predictions;

            let mut tree = DecisionTreeRegressor::new()
                .with_criterion(Criterion::FriedmanMse)
                .with_max_depth(self.max_depth)
                .with_min_samples_split(self.min_samples_split)
                .with_min_samples_leaf(self.min_samples_leaf)
                .with_random_state(seed.wrapping_add(stage as u64));

            if n_sub < n {
                let mut rows = index::sample(&mut rng, n, n_sub).into_vec();
                rows.sort_unstable();
                tree.fit(&x.select(Axis(0), &rows), &residuals.select(Axis(0), &rows))?;
            } else {
                tree.fit(x, &residuals)?;
            }

            predictions.scaled_add(self.learning_rate, &tree.predict(x)?);
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

        let mut predictions = Array1::from_elem(x.nrows(), self.init);
        for tree in &self.trees {
            predictions.scaled_add(self.learning_rate, &tree.predict(x)?);
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::r2_score;

    fn regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| (i as f64 / 6.0) + j as f64 * ((i % 5) as f64));
        let y = x.outer_iter().map(|r| r[0].sin() * 3.0 + r[1]).collect();
        (x, y)
    }

    #[test]
    fn test_boosting_reduces_error() {
        let (x, y) = regression_data();
        let mut short = GradientBoostingRegressor::new().with_n_estimators(2);
        let mut long = GradientBoostingRegressor::new().with_n_estimators(80);
        short.fit(&x, &y).unwrap();
        long.fit(&x, &y).unwrap();

        let r2_short = r2_score(&y, &short.predict(&x).unwrap()).unwrap();
        let r2_long = r2_score(&y, &long.predict(&x).unwrap()).unwrap();
        assert!(r2_long > r2_short);
        assert!(r2_long > 0.95, "r2 = {}", r2_long);
        assert_eq!(long.n_stages(), 80);
    }

    #[test]
    fn test_subsample_is_seeded() {
        let (x, y) = regression_data();
        let mut a = GradientBoostingRegressor::new()
            .with_n_estimators(20)
            .with_subsample(0.5)
            .with_random_state(9);
        let mut b = a.clone();
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_invalid_subsample() {
        let (x, y) = regression_data();
        let mut model = GradientBoostingRegressor::new().with_subsample(0.0);
        assert!(matches!(
            model.fit(&x, &y).unwrap_err(),
            TrainerError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_zero_stages_predicts_mean() {
        let (x, y) = regression_data();
        let mut model = GradientBoostingRegressor::new().with_n_estimators(0);
        assert!(matches!(model.predict(&x).unwrap_err(), TrainerError::NotFitted));

        model.fit(&x, &y).unwrap();
        let mean = y.mean().unwrap();
        assert!(model.predict(&x).unwrap().iter().all(|&p| (p - mean).abs() < 1e-12));
    }
}
