use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::search::{SearchCv, SearchStrategy};

/// Where the winning model is written unless configured otherwise.
pub const DEFAULT_MODEL_PATH: &str = "artifacts/model.bin";

/// A best test R² below this rejects the whole run.
pub const MIN_ACCEPTABLE_SCORE: f64 = 0.6;

pub const CV_FOLDS: usize = 5;

/// Seed shared by every seeded estimator in the default pool.
pub const RANDOM_STATE: u64 = 42;

/// Configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainerConfig {
    pub trained_model_file_path: PathBuf,
    pub min_score: f64,
    pub cv_folds: usize,
    pub strategy: SearchStrategy,
    /// Worker threads for the run. None uses the global rayon pool.
    pub n_jobs: Option<usize>,
}

impl Default for ModelTrainerConfig {
    fn default() -> Self {
        Self {
            trained_model_file_path: PathBuf::from(DEFAULT_MODEL_PATH),
            min_score: MIN_ACCEPTABLE_SCORE,
            cv_folds: CV_FOLDS,
            strategy: SearchStrategy::Exhaustive,
            n_jobs: None,
        }
    }
}

impl ModelTrainerConfig {
    pub fn search(&self) -> SearchCv {
        SearchCv::new(self.cv_folds).with_strategy(self.strategy)
    }
}
