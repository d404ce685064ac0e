use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::estimators::params::{
    param_opt_usize, param_str, param_u64, param_usize, unknown_param, Params,
};
use crate::estimators::{check_fit_input, check_predict_input, Regressor};

/// Smallest impurity decrease accepted for a split.
const MIN_GAIN: f64 = 1e-12;

/// Split quality measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    SquaredError,
    FriedmanMse,
}

impl Criterion {
    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::SquaredError => "squared_error",
            Criterion::FriedmanMse => "friedman_mse",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "squared_error" => Some(Criterion::SquaredError),
            "friedman_mse" => Some(Criterion::FriedmanMse),
            _ => None,
        }
    }

    /// Impurity decrease of splitting a node into the given halves.
    fn gain(self, left_sum: f64, n_left: usize, right_sum: f64, n_right: usize) -> f64 {
        let nl = n_left as f64;
        let nr = n_right as f64;
        match self {
            Criterion::SquaredError => {
                let total = left_sum + right_sum;
                left_sum * left_sum / nl + right_sum * right_sum / nr - total * total / (nl + nr)
            }
            Criterion::FriedmanMse => {
                let diff = nr * left_sum - nl * right_sum;
                diff * diff / (nl * nr * (nl + nr))
            }
        }
    }
}

/// How thresholds are chosen at each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Splitter {
    /// Exhaustive scan of every midpoint.
    Best,
    /// One uniform threshold per feature (extremely randomized trees).
    Random,
}

impl Splitter {
    pub fn as_str(self) -> &'static str {
        match self {
            Splitter::Best => "best",
            Splitter::Random => "random",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
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

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Regression tree with mean-valued leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    pub criterion: Criterion,
    pub splitter: Splitter,
    /// Maximum depth (None grows until leaves are pure).
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split (None = all).
    pub max_features: Option<usize>,
    pub random_state: Option<u64>,
    root: Option<TreeNode>,
    n_features: usize,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self {
            criterion: Criterion::SquaredError,
            splitter: Splitter::Best,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            root: None,
            n_features: 0,
        }
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_splitter(mut self, splitter: Splitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Depth of the fitted tree (a lone leaf has depth 0).
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }

    fn rules(&self) -> SplitRules {
        SplitRules {
            criterion: self.criterion,
            splitter: self.splitter,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }
}

impl Regressor for DecisionTreeRegressor {
    fn name(&self) -> &'static str {
        "DecisionTreeRegressor"
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("criterion".into(), self.criterion.as_str().into());
        params.insert("splitter".into(), self.splitter.as_str().into());
        params.insert("max_depth".into(), self.max_depth.into());
        params.insert("min_samples_split".into(), self.min_samples_split.into());
        params.insert("min_samples_leaf".into(), self.min_samples_leaf.into());
        params.insert("max_features".into(), self.max_features.into());
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
                "criterion" => {
                    let raw = param_str(name, key, value)?;
                    self.criterion = Criterion::parse(raw).ok_or_else(|| {
                        TrainerError::invalid_param(name, format!("unknown criterion '{}'", raw))
                    })?;
                }
                "splitter" => {
                    self.splitter = match param_str(name, key, value)? {
                        "best" => Splitter::Best,
                        "random" => Splitter::Random,
                        other => {
                            return Err(TrainerError::invalid_param(
                                name,
                                format!("unknown splitter '{}'", other),
                            ));
                        }
                    };
                }
                "max_depth" => self.max_depth = param_opt_usize(name, key, value)?,
                "min_samples_split" => self.min_samples_split = param_usize(name, key, value)?,
                "min_samples_leaf" => self.min_samples_leaf = param_usize(name, key, value)?,
                "max_features" => self.max_features = param_opt_usize(name, key, value)?,
                "random_state" => self.random_state = param_u64(name, key, value)?,
                _ => return Err(unknown_param(name, key)),
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.min_samples_split < 2 {
            return Err(TrainerError::invalid_param(
                self.name(),
                "min_samples_split must be at least 2",
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(TrainerError::invalid_param(
                self.name(),
                "min_samples_leaf must be at least 1",
            ));
        }

        let mut builder = TreeBuilder {
            x,
            y,
            rules: self.rules(),
            n_features: x.ncols(),
            rng: ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0)),
        };
        let root = builder.build((0..x.nrows()).collect(), 0);

        self.root = Some(root);
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(TrainerError::NotFitted)?;
        check_predict_input(self.n_features, x)?;
        Ok(x.outer_iter().map(|row| root.predict_row(row)).collect())
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitRules {
    criterion: Criterion,
    splitter: Splitter,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: Option<usize>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    rules: SplitRules,
    n_features: usize,
    rng: ChaCha8Rng,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let y = self.y;
        let n_samples = indices.len();
        let total: f64 = indices.iter().map(|&i| y[i]).sum();
        let leaf = TreeNode::Leaf {
            value: total / n_samples as f64,
            n_samples,
        };

        let first = y[indices[0]];
        let is_pure = indices.iter().all(|&i| y[i] == first);
        if is_pure
            || self.rules.max_depth.is_some_and(|d| depth >= d)
            || n_samples < self.rules.min_samples_split
            || n_samples < 2 * self.rules.min_samples_leaf
        {
            return leaf;
        }

        let split = match self.rules.splitter {
            Splitter::Best => self.best_split(&indices, total),
            Splitter::Random => self.random_split(&indices, total),
        };
        let Some(split) = split else {
            return leaf;
        };

        let x = self.x;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return leaf;
        }

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
            n_samples,
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.rules.max_features {
            Some(k) if k < self.n_features => {
                let mut features = index::sample(&mut self.rng, self.n_features, k.max(1)).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn best_split(&mut self, indices: &[usize], total: f64) -> Option<SplitCandidate> {
        let x = self.x;
        let y = self.y;
        let n = indices.len();
        let min_leaf = self.rules.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature in self.candidate_features() {
            sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += y[sorted[pos]];
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf {
                    continue;
                }
                if n_right < min_leaf {
                    break;
                }

                let current = x[[sorted[pos], feature]];
                let next = x[[sorted[pos + 1], feature]];
                if next <= current {
                    continue;
                }

                let gain = self
                    .rules
                    .criterion
                    .gain(left_sum, n_left, total - left_sum, n_right);
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn random_split(&mut self, indices: &[usize], total: f64) -> Option<SplitCandidate> {
        let x = self.x;
        let y = self.y;
        let n = indices.len();
        let min_leaf = self.rules.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;

        for feature in self.candidate_features() {
            let (lo, hi) = indices
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    let v = x[[i, feature]];
                    (lo.min(v), hi.max(v))
                });
            if hi <= lo {
                continue;
            }

            let threshold = self.rng.gen_range(lo..hi);
            let (left_sum, n_left) = indices
                .iter()
                .filter(|&&i| x[[i, feature]] <= threshold)
                .fold((0.0, 0usize), |(s, c), &i| (s + y[i], c + 1));
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let gain = self
                .rules
                .criterion
                .gain(left_sum, n_left, total - left_sum, n_right);
            if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    gain,
                });
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::ParamValue;
    use crate::metrics::r2_score;
    use ndarray::array;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        (x, y)
    }

    #[test]
    fn test_learns_step_function() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict(&array![[3.4], [3.6]]).unwrap(), array![1.0, 5.0]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| v * v);

        let mut tree = DecisionTreeRegressor::new().with_max_depth(Some(2));
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn test_unbounded_tree_fits_training_data() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = x.column(0).mapv(|v| (v * 0.7).sin());

        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        let r2 = r2_score(&y, &tree.predict(&x).unwrap()).unwrap();
        assert!(r2 > 0.999, "r2 = {}", r2);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new().with_min_samples_leaf(4);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn test_criteria_agree_on_split() {
        let (x, y) = step_data();
        let mut a = DecisionTreeRegressor::new().with_criterion(Criterion::SquaredError);
        let mut b = DecisionTreeRegressor::new().with_criterion(Criterion::FriedmanMse);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_random_splitter_is_seeded() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y = x.column(1).mapv(|v| 2.0 * v);

        let mut a = DecisionTreeRegressor::new()
            .with_splitter(Splitter::Random)
            .with_random_state(7);
        let mut b = a.clone();
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_set_params() {
        let mut tree = DecisionTreeRegressor::new();
        let mut params = Params::new();
        params.insert("criterion".into(), "friedman_mse".into());
        params.insert("max_depth".into(), ParamValue::Int(5));
        params.insert("min_samples_split".into(), ParamValue::Int(10));
        tree.set_params(&params).unwrap();

        assert_eq!(tree.criterion, Criterion::FriedmanMse);
        assert_eq!(tree.max_depth, Some(5));
        assert_eq!(tree.min_samples_split, 10);

        params.insert("n_estimators".into(), ParamValue::Int(10));
        assert!(tree.set_params(&params).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTreeRegressor::new();
        let err = tree.predict(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, TrainerError::NotFitted));
    }

    #[test]
    fn test_feature_count_checked() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        assert!(matches!(
            tree.predict(&array![[1.0, 2.0]]).unwrap_err(),
            TrainerError::Shape { .. }
        ));
    }
}
