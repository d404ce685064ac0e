use std::collections::HashMap;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

use model_trainer_rs::estimators::{Model, ParamValue};
use model_trainer_rs::search::ParamGrid;
use model_trainer_rs::trainer::{
    default_models, ModelCandidate, ModelTrainer, ModelTrainerConfig, TrainingOutcome,
};
use model_trainer_rs::{load_object, Regressor, TrainerError};

/// Rows of four features plus a target that is mostly a smooth function of them.
fn synthetic(rows: usize, seed: u64, noise_only: bool) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut matrix = Array2::zeros((rows, 5));
    for i in 0..rows {
        let features: Vec<f64> = (0..4).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let noise = rng.gen_range(-0.1..0.1);
        let target = if noise_only {
            rng.gen_range(-1.0..1.0)
        } else {
            3.0 * features[0] - 2.0 * features[1] + features[2] * features[3] + noise
        };
        for (j, value) in features.iter().enumerate() {
            matrix[[i, j]] = *value;
        }
        matrix[[i, 4]] = target;
    }
    matrix
}

/// Small grids over the full pool so the run stays fast.
fn reduced_grids() -> HashMap<String, ParamGrid> {
    let mut grids = HashMap::new();
    grids.insert(
        "Random Forest".to_string(),
        ParamGrid::new()
            .with("n_estimators", [10, 20])
            .with("max_depth", [Some(5), None]),
    );
    grids.insert(
        "Extra Trees".to_string(),
        ParamGrid::new().with("n_estimators", [10]),
    );
    grids.insert(
        "Decision Tree".to_string(),
        ParamGrid::new()
            .with("criterion", ["squared_error", "friedman_mse"])
            .with("max_depth", [Some(3), None]),
    );
    grids.insert(
        "Gradient Boosting".to_string(),
        ParamGrid::new()
            .with("n_estimators", [30])
            .with("learning_rate", [0.1, 0.15]),
    );
    grids.insert("Linear Regression".to_string(), ParamGrid::new());
    grids.insert(
        "XGBRegressor".to_string(),
        ParamGrid::new()
            .with("n_estimators", [30])
            .with("max_depth", [3]),
    );
    grids.insert(
        "CatBoosting Regressor".to_string(),
        ParamGrid::new()
            .with("iterations", [30])
            .with("depth", [4])
            .with("learning_rate", [0.15]),
    );
    grids.insert(
        "AdaBoost Regressor".to_string(),
        ParamGrid::new().with("n_estimators", [10]),
    );
    grids
}

fn trainer_at(path: std::path::PathBuf) -> ModelTrainer {
    let config = ModelTrainerConfig {
        trained_model_file_path: path,
        ..ModelTrainerConfig::default()
    };
    ModelTrainer::with_config(config).with_candidates(default_models(), reduced_grids())
}

fn run(trainer: &ModelTrainer) -> TrainingOutcome {
    let train = synthetic(100, 1, false);
    let test = synthetic(20, 2, false);
    trainer.train(&train, &test).unwrap()
}

#[test]
fn test_full_pool_selects_and_saves_best_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("artifacts").join("model.bin");
    let outcome = run(&trainer_at(path.clone()));

    assert_eq!(outcome.report.len(), 8);
    let names: Vec<&str> = outcome.report.iter().map(|e| e.name.as_str()).collect();
    let pool: Vec<String> = default_models().into_iter().map(|c| c.name).collect();
    assert_eq!(names, pool);

    assert!(outcome.test_score >= 0.6, "best score {}", outcome.test_score);
    let best = outcome.report.best().unwrap();
    assert_eq!(best.name, outcome.best_model_name);
    assert!(outcome.report.iter().all(|e| e.test_score.is_nan() || e.test_score <= best.test_score));

    let metadata = std::fs::metadata(&path).unwrap();
    assert!(metadata.len() > 0);
}

#[test]
fn test_returned_score_matches_reloaded_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.bin");
    let outcome = run(&trainer_at(path.clone()));

    let model: Model = load_object(&path).unwrap();
    let test = synthetic(20, 2, false);
    let x_test = test.slice(ndarray::s![.., ..4]).to_owned();
    let y_test = test.column(4).to_owned();
    assert_eq!(model.score(&x_test, &y_test).unwrap(), outcome.test_score);
}

#[test]
fn test_runs_are_deterministic() {
    let dir = tempdir().unwrap();
    let first = run(&trainer_at(dir.path().join("a.bin")));
    let second = run(&trainer_at(dir.path().join("b.bin")));

    assert_eq!(first.best_model_name, second.best_model_name);
    assert_eq!(first.test_score, second.test_score);
    for (a, b) in first.report.iter().zip(second.report.iter()) {
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.test_score, b.test_score);
    }
}

#[test]
fn test_noise_target_has_no_suitable_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.bin");
    let trainer = trainer_at(path.clone());

    let train = synthetic(100, 3, true);
    let test = synthetic(20, 4, true);
    let err = trainer.initiate_model_trainer(&train, &test).unwrap_err();

    assert!(matches!(err, TrainerError::NoSuitableModel { .. }), "{}", err);
    assert!(err.to_string().starts_with("No best model found"));
    assert!(!path.exists());
}

#[test]
fn test_missing_grid_fails_before_tuning() {
    let dir = tempdir().unwrap();
    let mut grids = reduced_grids();
    grids.remove("CatBoosting Regressor");
    let trainer = ModelTrainer::with_config(ModelTrainerConfig {
        trained_model_file_path: dir.path().join("model.bin"),
        ..ModelTrainerConfig::default()
    })
    .with_candidates(default_models(), grids);

    let err = trainer
        .train(&synthetic(100, 1, false), &synthetic(20, 2, false))
        .unwrap_err();
    assert!(matches!(err.root_cause(), TrainerError::MissingGrid(name) if name == "CatBoosting Regressor"));
}

#[test]
fn test_custom_pool_with_grid_values() {
    let dir = tempdir().unwrap();
    let models = vec![ModelCandidate::new(
        "Shallow Tree",
        Model::DecisionTree(Default::default()),
    )];
    let mut grids = HashMap::new();
    grids.insert(
        "Shallow Tree".to_string(),
        ParamGrid::new().with("max_depth", [ParamValue::Int(1), ParamValue::Int(2)]),
    );
    let trainer = ModelTrainer::with_config(ModelTrainerConfig {
        trained_model_file_path: dir.path().join("tree.json"),
        min_score: -10.0,
        ..ModelTrainerConfig::default()
    })
    .with_candidates(models, grids);

    let outcome = run(&trainer);
    assert_eq!(outcome.best_model_name, "Shallow Tree");
    assert!(dir.path().join("tree.json").exists());
}
