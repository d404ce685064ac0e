use std::collections::HashMap;
use std::path::PathBuf;

use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use crate::data::split_features_target;
use crate::error::{Result, ResultExt, TrainerError};
use crate::estimators::Regressor;
use crate::metrics::r2_score;
use crate::persistence::save_object;
use crate::search::ParamGrid;
use crate::trainer::candidates::{default_models, default_param_grids, ModelCandidate};
use crate::trainer::config::ModelTrainerConfig;
use crate::trainer::evaluation::{evaluate_models, ModelReport};

/// Summary of a successful training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub best_model_name: String,
    /// R² of the persisted model on the test split.
    pub test_score: f64,
    pub report: ModelReport,
    pub model_path: PathBuf,
}

/// Tunes the candidate pool and persists the best model.
///
/// The pool is a template: every run works on a fresh clone, so repeated runs
/// on the same data give the same result.
pub struct ModelTrainer {
    config: ModelTrainerConfig,
    models: Vec<ModelCandidate>,
    grids: HashMap<String, ParamGrid>,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelTrainer {
    pub fn new() -> Self {
        Self::with_config(ModelTrainerConfig::default())
    }

    pub fn with_config(config: ModelTrainerConfig) -> Self {
        Self {
            config,
            models: default_models(),
            grids: default_param_grids(),
        }
    }

    /// Replace the candidate pool and its grids.
    pub fn with_candidates(mut self, models: Vec<ModelCandidate>, grids: HashMap<String, ParamGrid>) -> Self {
        self.models = models;
        self.grids = grids;
        self
    }

    pub fn config(&self) -> &ModelTrainerConfig {
        &self.config
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.models
    }

    /// Train every candidate and return the test R² of the persisted winner.
    ///
    /// Both matrices carry the target in their last column.
    pub fn initiate_model_trainer(&self, train: &Array2<f64>, test: &Array2<f64>) -> Result<f64> {
        self.train(train, test).map(|outcome| outcome.test_score)
    }

    /// Like [`initiate_model_trainer`](Self::initiate_model_trainer), keeping
    /// the full report.
    pub fn train(&self, train: &Array2<f64>, test: &Array2<f64>) -> Result<TrainingOutcome> {
        match self.config.n_jobs {
            Some(n_jobs) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n_jobs)
                    .build()
                    .map_err(|e| TrainerError::Computation(format!("building thread pool: {}", e)))?;
                pool.install(|| self.run(train, test))
            }
            None => self.run(train, test),
        }
    }

    fn run(&self, train: &Array2<f64>, test: &Array2<f64>) -> Result<TrainingOutcome> {
        info!("Split training and test input data");
        let (x_train, y_train) = split_features_target(train).context("splitting training data")?;
        let (x_test, y_test) = split_features_target(test).context("splitting test data")?;

        let mut models = self.models.clone();
        let report = evaluate_models(
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            &mut models,
            &self.grids,
            &self.config.search(),
        )
        .context("evaluating models")?;

        let threshold = self.config.min_score;
        let (index, best) = match report.best_entry() {
            Some((index, best)) if best.test_score >= threshold => (index, best),
            Some((_, best)) => {
                return Err(TrainerError::NoSuitableModel {
                    best_name: best.name.clone(),
                    best_score: best.test_score,
                    threshold,
                });
            }
            None => {
                return Err(TrainerError::NoSuitableModel {
                    best_name: "none".to_string(),
                    best_score: f64::NAN,
                    threshold,
                });
            }
        };
        info!(
            "Best found model on both training and testing dataset: {} ({:.4})",
            best.name, best.test_score
        );

        // Report entries follow candidate order.
        let winner = &models[index];

        let path = &self.config.trained_model_file_path;
        save_object(path, &winner.model)
            .with_context(|| format!("saving {} to {}", winner.name, path.display()))?;
        info!("Saved {} to {}", winner.name, path.display());

        let predicted = winner
            .model
            .predict(&x_test)
            .with_context(|| format!("predicting with {}", winner.name))?;
        let test_score = r2_score(&y_test, &predicted).context("scoring best model")?;

        Ok(TrainingOutcome {
            best_model_name: winner.name.clone(),
            test_score,
            report,
            model_path: path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{DecisionTreeRegressor, LinearRegression, Model};
    use crate::persistence::load_object;
    use tempfile::tempdir;

    fn linear_only() -> (Vec<ModelCandidate>, HashMap<String, ParamGrid>) {
        let models = vec![ModelCandidate::new(
            "Linear Regression",
            Model::LinearRegression(LinearRegression::new()),
        )];
        let mut grids = HashMap::new();
        grids.insert("Linear Regression".to_string(), ParamGrid::new());
        (models, grids)
    }

    fn matrix(rows: usize, offset: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, 3), |(i, j)| {
            let a = ((i + offset) * 7 % 19) as f64;
            let b = ((i + offset) * 11 % 23) as f64;
            match j {
                0 => a,
                1 => b,
                _ => 3.0 * a - b + 1.0,
            }
        })
    }

    #[test]
    fn test_trains_and_saves_linear_model() {
        let dir = tempdir().unwrap();
        let config = ModelTrainerConfig {
            trained_model_file_path: dir.path().join("artifacts").join("model.bin"),
            ..ModelTrainerConfig::default()
        };
        let (models, grids) = linear_only();
        let trainer = ModelTrainer::with_config(config).with_candidates(models, grids);

        let outcome = trainer.train(&matrix(40, 0), &matrix(10, 40)).unwrap();
        assert_eq!(outcome.best_model_name, "Linear Regression");
        assert!((outcome.test_score - 1.0).abs() < 1e-9);

        let saved: Model = load_object(&outcome.model_path).unwrap();
        assert_eq!(saved.name(), "LinearRegression");
    }

    #[test]
    fn test_threshold_rejects_run() {
        let dir = tempdir().unwrap();
        let config = ModelTrainerConfig {
            trained_model_file_path: dir.path().join("model.bin"),
            min_score: 1.5,
            ..ModelTrainerConfig::default()
        };
        let (models, grids) = linear_only();
        let trainer = ModelTrainer::with_config(config.clone()).with_candidates(models, grids);

        let err = trainer.train(&matrix(40, 0), &matrix(10, 40)).unwrap_err();
        assert!(matches!(err, TrainerError::NoSuitableModel { .. }));
        assert!(err.to_string().starts_with("No best model found"));
        assert!(!config.trained_model_file_path.exists());
    }

    #[test]
    fn test_score_equal_to_threshold_passes() {
        let dir = tempdir().unwrap();
        let (models, grids) = linear_only();
        let first = ModelTrainer::with_config(ModelTrainerConfig {
            trained_model_file_path: dir.path().join("first.bin"),
            ..ModelTrainerConfig::default()
        })
        .with_candidates(models.clone(), grids.clone())
        .train(&matrix(40, 0), &matrix(10, 40))
        .unwrap();
        let achieved = first.report.best().unwrap().test_score;

        let config = ModelTrainerConfig {
            trained_model_file_path: dir.path().join("second.bin"),
            min_score: achieved,
            ..ModelTrainerConfig::default()
        };
        let trainer = ModelTrainer::with_config(config.clone()).with_candidates(models, grids);
        let score = trainer.initiate_model_trainer(&matrix(40, 0), &matrix(10, 40)).unwrap();
        assert_eq!(score, achieved);
        assert!(config.trained_model_file_path.exists());
    }

    #[test]
    fn test_duplicate_candidate_names_rejected() {
        let dir = tempdir().unwrap();
        let config = ModelTrainerConfig {
            trained_model_file_path: dir.path().join("model.bin"),
            min_score: 0.0,
            ..ModelTrainerConfig::default()
        };
        let models = vec![
            ModelCandidate::new(
                "M",
                Model::DecisionTree(DecisionTreeRegressor::new().with_max_depth(Some(1))),
            ),
            ModelCandidate::new("M", Model::LinearRegression(LinearRegression::new())),
        ];
        let mut grids = HashMap::new();
        grids.insert("M".to_string(), ParamGrid::new());
        let trainer = ModelTrainer::with_config(config.clone()).with_candidates(models, grids);

        let err = trainer.train(&matrix(40, 0), &matrix(10, 40)).unwrap_err();
        assert!(err.to_string().starts_with("evaluating models"));
        assert!(matches!(err.root_cause(), TrainerError::InvalidInput(_)));
        assert!(!config.trained_model_file_path.exists());
    }

    #[test]
    fn test_saves_the_reported_winner() {
        let dir = tempdir().unwrap();
        let config = ModelTrainerConfig {
            trained_model_file_path: dir.path().join("model.bin"),
            min_score: 0.0,
            ..ModelTrainerConfig::default()
        };
        let models = vec![
            ModelCandidate::new(
                "Stump",
                Model::DecisionTree(DecisionTreeRegressor::new().with_max_depth(Some(1))),
            ),
            ModelCandidate::new("Linear", Model::LinearRegression(LinearRegression::new())),
        ];
        let mut grids = HashMap::new();
        grids.insert("Stump".to_string(), ParamGrid::new());
        grids.insert("Linear".to_string(), ParamGrid::new());
        let trainer = ModelTrainer::with_config(config).with_candidates(models, grids);

        let outcome = trainer.train(&matrix(40, 0), &matrix(10, 40)).unwrap();
        let best = outcome.report.best().unwrap();
        assert_eq!(outcome.best_model_name, "Linear");
        assert_eq!(outcome.test_score, best.test_score);
        let saved: Model = load_object(&outcome.model_path).unwrap();
        assert_eq!(saved.name(), "LinearRegression");
    }

    #[test]
    fn test_zero_column_matrix_rejected() {
        let trainer = ModelTrainer::new();
        let empty = Array2::<f64>::zeros((5, 0));
        let err = trainer.initiate_model_trainer(&empty, &empty).unwrap_err();
        assert!(matches!(err.root_cause(), TrainerError::InvalidInput(_)));
    }

    #[test]
    fn test_dedicated_pool() {
        let dir = tempdir().unwrap();
        let config = ModelTrainerConfig {
            trained_model_file_path: dir.path().join("model.json"),
            n_jobs: Some(2),
            ..ModelTrainerConfig::default()
        };
        let (models, grids) = linear_only();
        let trainer = ModelTrainer::with_config(config).with_candidates(models, grids);
        let score = trainer.initiate_model_trainer(&matrix(40, 0), &matrix(10, 40)).unwrap();
        assert!(score > 0.99);
    }
}
