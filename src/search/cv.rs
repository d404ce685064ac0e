use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ResultExt, TrainerError};
use crate::estimators::{display_params, Params, Regressor};
use crate::search::grid::ParamGrid;
use crate::search::kfold::KFold;

/// How candidates are drawn from a grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Every combination.
    #[default]
    Exhaustive,
    /// At most `n_iter` combinations sampled without replacement.
    Randomized { n_iter: usize, seed: u64 },
}

impl SearchStrategy {
    fn candidates(&self, grid: &ParamGrid) -> Result<Vec<Params>> {
        match *self {
            SearchStrategy::Exhaustive => grid.candidates(),
            SearchStrategy::Randomized { n_iter: 0, .. } => Err(TrainerError::InvalidInput(
                "randomized search needs at least one iteration".to_string(),
            )),
            SearchStrategy::Randomized { n_iter, seed } => grid.sample(n_iter, seed),
        }
    }
}

/// Fold scores for one parameter combination.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub params: Params,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub best_params: Params,
    /// Mean validation R² of the best candidate (NaN if no candidate scored).
    pub best_score: f64,
    pub best_index: usize,
    pub candidates: Vec<CandidateScore>,
}

/// K-fold search scored by R².
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCv {
    pub folds: KFold,
    pub strategy: SearchStrategy,
}

impl Default for SearchCv {
    fn default() -> Self {
        Self::new(5)
    }
}

struct FoldData {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

impl SearchCv {
    pub fn new(n_splits: usize) -> Self {
        Self {
            folds: KFold::new(n_splits),
            strategy: SearchStrategy::Exhaustive,
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Number of parameter combinations this search will evaluate on `grid`.
    pub fn n_candidates(&self, grid: &ParamGrid) -> usize {
        let total = grid.n_candidates();
        match self.strategy {
            SearchStrategy::Exhaustive => total,
            SearchStrategy::Randomized { n_iter, .. } => total.min(n_iter),
        }
    }

    /// Score every candidate on every fold, in parallel over
    /// (candidate, fold) pairs.
    pub fn fit<R>(&self, estimator: &R, grid: &ParamGrid, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult>
    where
        R: Regressor + Clone + Send + Sync,
    {
        let candidates = self.strategy.candidates(grid)?;
        let folds: Vec<FoldData> = self
            .folds
            .split(x.nrows())?
            .into_iter()
            .map(|fold| FoldData {
                x_train: x.select(Axis(0), &fold.train),
                y_train: y.select(Axis(0), &fold.train),
                x_test: x.select(Axis(0), &fold.test),
                y_test: y.select(Axis(0), &fold.test),
            })
            .collect();

        // One job per (candidate, fold)
        let n_folds = folds.len();
        let jobs: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..n_folds).map(move |f| (c, f)))
            .collect();

        let scores = jobs
            .into_par_iter()
            .map(|(c, f)| {
                let params = &candidates[c];
                let data = &folds[f];
                let mut model = estimator.clone();
                model.set_params(params)?;
                model.fit(&data.x_train, &data.y_train)?;
                model.score(&data.x_test, &data.y_test)
            })
            .collect::<Result<Vec<f64>>>()
            .with_context(|| format!("cross-validating {}", estimator.name()))?;

        let candidates: Vec<CandidateScore> = candidates
            .into_iter()
            .zip(scores.chunks(n_folds))
            .map(|(params, fold_scores)| {
                let (mean_score, std_score) = mean_std(fold_scores);
                debug!(
                    estimator = estimator.name(),
                    params = %display_params(&params),
                    mean_score,
                    "candidate scored"
                );
                CandidateScore {
                    params,
                    fold_scores: fold_scores.to_vec(),
                    mean_score,
                    std_score,
                }
            })
            .collect();

        // No finite mean: fall back to the first candidate
        let best_index = best_index(candidates.iter().map(|c| c.mean_score));
        let (best_params, best_score) = match best_index {
            Some(i) => (candidates[i].params.clone(), candidates[i].mean_score),
            None => (candidates[0].params.clone(), f64::NAN),
        };

        Ok(SearchResult {
            best_params,
            best_score,
            best_index: best_index.unwrap_or(0),
            candidates,
        })
    }
}

/// Population mean and standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Index of the first maximum, skipping NaN.
pub(crate) fn best_index(scores: impl IntoIterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.into_iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        if best.is_none_or(|(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}
