use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::estimators::params::{
    param_bool, param_opt_usize, param_u64, param_usize, unknown_param, Params,
};
use crate::estimators::tree::{Criterion, DecisionTreeRegressor, Splitter};
use crate::estimators::{check_fit_input, check_predict_input, Regressor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForestKind {
    RandomForest,
    ExtraTrees,
}

/// Averages independently grown trees. A random forest bootstraps rows and
/// searches the best split; extra trees use every row with random thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestRegressor {
    pub kind: ForestKind,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split (None = all).
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    trees: Vec<DecisionTreeRegressor>,
    n_features: usize,
}

impl ForestRegressor {
    fn with_kind(kind: ForestKind) -> Self {
        Self {
            kind,
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: kind == ForestKind::RandomForest,
            random_state: None,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn random_forest() -> Self {
        Self::with_kind(ForestKind::RandomForest)
    }

    pub fn extra_trees() -> Self {
        Self::with_kind(ForestKind::ExtraTrees)
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn splitter(&self) -> Splitter {
        match self.kind {
            ForestKind::RandomForest => Splitter::Best,
            ForestKind::ExtraTrees => Splitter::Random,
        }
    }

    fn grow_tree(&self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<DecisionTreeRegressor> {
        let mut tree = DecisionTreeRegressor::new()
            .with_criterion(Criterion::SquaredError)
            .with_splitter(self.splitter())
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_random_state(seed);

        if self.bootstrap {
            let n = x.nrows();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let x_boot = x.select(Axis(0), &sample);
            let y_boot = y.select(Axis(0), &sample);
            tree.fit(&x_boot, &y_boot)?;
        } else {
            tree.fit(x, y)?;
        }
        Ok(tree)
    }
}

impl Regressor for ForestRegressor {
    fn name(&self) -> &'static str {
        match self.kind {
            ForestKind::RandomForest => "RandomForestRegressor",
            ForestKind::ExtraTrees => "ExtraTreesRegressor",
        }
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("n_estimators".into(), self.n_estimators.into());
        params.insert("max_depth".into(), self.max_depth.into());
        params.insert("min_samples_split".into(), self.min_samples_split.into());
        params.insert("min_samples_leaf".into(), self.min_samples_leaf.into());
        params.insert("max_features".into(), self.max_features.into());
        params.insert("bootstrap".into(), self.bootstrap.into());
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
                "max_depth" => self.max_depth = param_opt_usize(name, key, value)?,
                "min_samples_split" => self.min_samples_split = param_usize(name, key, value)?,
                "min_samples_leaf" => self.min_samples_leaf = param_usize(name, key, value)?,
                "max_features" => self.max_features = param_opt_usize(name, key, value)?,
                "bootstrap" => self.bootstrap = param_bool(name, key, value)?,
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

        let base_seed = self.random_state.unwrap_or(0);
        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| self.grow_tree(x, y, base_seed.wrapping_add(tree_idx as u64)))
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(TrainerError::NotFitted);
        }
        check_predict_input(self.n_features, x)?;

        let mut total = Array1::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict(x)?;
        }
        Ok(total / self.trees.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::r2_score;

    fn friedman_like() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((80, 3), |(i, j)| ((i * (j + 3) * 7919) % 97) as f64 / 97.0);
        let y = x
            .outer_iter()
            .map(|r| 10.0 * r[0] + 5.0 * r[1] * r[1] - 3.0 * r[2])
            .collect();
        (x, y)
    }

    #[test]
    fn test_random_forest_fits() {
        let (x, y) = friedman_like();
        let mut forest = ForestRegressor::random_forest()
            .with_n_estimators(20)
            .with_random_state(42);
        forest.fit(&x, &y).unwrap();

        assert_eq!(forest.n_trees(), 20);
        let r2 = r2_score(&y, &forest.predict(&x).unwrap()).unwrap();
        assert!(r2 > 0.9, "r2 = {}", r2);
    }

    #[test]
    fn test_extra_trees_fits() {
        let (x, y) = friedman_like();
        let mut forest = ForestRegressor::extra_trees()
            .with_n_estimators(20)
            .with_random_state(42);
        forest.fit(&x, &y).unwrap();

        assert!(!forest.bootstrap);
        let r2 = r2_score(&y, &forest.predict(&x).unwrap()).unwrap();
        assert!(r2 > 0.9, "r2 = {}", r2);
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let (x, y) = friedman_like();
        let mut a = ForestRegressor::random_forest()
            .with_n_estimators(10)
            .with_random_state(3);
        let mut b = a.clone();
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_names_follow_kind() {
        assert_eq!(ForestRegressor::random_forest().name(), "RandomForestRegressor");
        assert_eq!(ForestRegressor::extra_trees().name(), "ExtraTreesRegressor");
    }
}
